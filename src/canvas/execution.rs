// Pipeline-run identity and the invalidate-or-continue decision

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque token for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub u64);

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the cache must do before a run's data is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    /// A different run than the last one observed: clear the cache.
    NewRun,
    /// Same id as the previous run: keep the cache, restore from the snapshot.
    Continuation,
}

/// Derives run ids and decides when the cache must be invalidated.
///
/// Two sources of ids exist. An orchestrator can pass an explicit monotonic
/// run id, which is always preferred. Without one the id comes from the
/// wall clock in milliseconds, which means two runs started inside the same
/// millisecond look like a single continued run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionTracker;

impl ExecutionTracker {
    /// Millisecond wall-clock id.
    pub fn current_execution_id(&self) -> ExecutionId {
        ExecutionId(chrono::Utc::now().timestamp_millis().max(0) as u64)
    }

    /// Caller-supplied id when present, clock id otherwise.
    pub fn resolve(&self, supplied: Option<ExecutionId>) -> ExecutionId {
        supplied.unwrap_or_else(|| self.current_execution_id())
    }

    pub fn should_invalidate(&self, candidate: ExecutionId, last: Option<ExecutionId>) -> bool {
        match last {
            Some(last) => candidate != last,
            None => true,
        }
    }

    pub fn verdict(&self, candidate: ExecutionId, last: Option<ExecutionId>) -> RunVerdict {
        if self.should_invalidate(candidate, last) {
            RunVerdict::NewRun
        } else {
            RunVerdict::Continuation
        }
    }
}

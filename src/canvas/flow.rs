//! Per-instance stage/status history for diagnostics.
//!
//! Each canvas node instance records events under its own flow id. History is
//! bounded twice: at most `per_flow` events per flow (oldest dropped first)
//! and at most `max_flows` flows (the least recently created flow is dropped).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Started,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowEvent {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub status: FlowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_info: Option<String>,
}

#[derive(Debug, Default)]
struct FlowLog {
    flows: HashMap<String, VecDeque<FlowEvent>>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct FlowTracker {
    per_flow: usize,
    max_flows: usize,
    log: Mutex<FlowLog>,
}

impl FlowTracker {
    pub fn new(per_flow: usize, max_flows: usize) -> Self {
        Self {
            per_flow: per_flow.max(1),
            max_flows: max_flows.max(1),
            log: Mutex::new(FlowLog::default()),
        }
    }

    pub fn record(
        &self,
        flow_id: &str,
        stage: impl Into<String>,
        status: FlowStatus,
        data_info: Option<String>,
    ) {
        let event = FlowEvent {
            timestamp: Utc::now(),
            stage: stage.into(),
            status,
            data_info,
        };
        log::debug!(
            "[FLOW] {} {} {:?}{}",
            flow_id,
            event.stage,
            event.status,
            event.data_info.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
        );

        let mut guard = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !guard.flows.contains_key(flow_id) {
            while guard.order.len() >= self.max_flows {
                if let Some(evicted) = guard.order.pop_front() {
                    guard.flows.remove(&evicted);
                }
            }
            guard.order.push_back(flow_id.to_string());
        }
        let history = guard.flows.entry(flow_id.to_string()).or_default();
        if history.len() >= self.per_flow {
            history.pop_front();
        }
        history.push_back(event);
    }

    pub fn latest(&self, flow_id: &str) -> Option<FlowEvent> {
        let guard = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.flows.get(flow_id).and_then(|h| h.back().cloned())
    }

    pub fn history(&self, flow_id: &str) -> Vec<FlowEvent> {
        let guard = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.flows
            .get(flow_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn flow_count(&self) -> usize {
        let guard = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.flows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_is_last_recorded() {
        let tracker = FlowTracker::new(8, 8);
        tracker.record("a", "start", FlowStatus::Started, None);
        tracker.record("a", "emit", FlowStatus::Completed, Some("512x512".into()));
        let latest = tracker.latest("a").unwrap();
        assert_eq!(latest.stage, "emit");
        assert_eq!(latest.status, FlowStatus::Completed);
        assert!(tracker.latest("b").is_none());
    }

    #[test]
    fn test_history_is_bounded_oldest_first() {
        let tracker = FlowTracker::new(3, 8);
        for i in 0..5 {
            tracker.record("a", format!("stage{i}"), FlowStatus::Processing, None);
        }
        let stages: Vec<String> = tracker.history("a").into_iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec!["stage2", "stage3", "stage4"]);
    }

    #[test]
    fn test_flow_count_is_bounded() {
        let tracker = FlowTracker::new(4, 2);
        tracker.record("a", "start", FlowStatus::Started, None);
        tracker.record("b", "start", FlowStatus::Started, None);
        tracker.record("c", "start", FlowStatus::Started, None);
        assert_eq!(tracker.flow_count(), 2);
        assert!(tracker.latest("a").is_none());
        assert!(tracker.latest("c").is_some());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&FlowStatus::Completed).unwrap();
        assert_eq!(json, r#""completed""#);
    }
}

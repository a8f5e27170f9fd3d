//! Canvas node: execution-scoped image/mask cache shared by every node
//! instance, plus the disk-backed canvas state the browser editor writes.

pub mod cache;
pub mod execution;
pub mod flow;
pub mod ingest;
pub mod node;
pub mod snapshot;
pub mod storage;

pub use cache::{CacheStats, CanvasCache, SharedCanvasCache};
pub use execution::{ExecutionId, ExecutionTracker, RunVerdict};
pub use flow::{FlowEvent, FlowStatus, FlowTracker};
pub use node::{CanvasNode, CanvasNodeInput, CanvasNodeOutput};
pub use storage::{CanvasLoad, CanvasStorage};

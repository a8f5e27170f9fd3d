//! Matting status side channel.
//!
//! The pipeline publishes `processing` / `completed` / `error` events; the
//! websocket handler forwards them to the browser. Publishing never blocks
//! and never fails the caller: with no subscribers the event is dropped.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MattingStatus {
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub status: MattingStatus,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatusEvent {
    /// Wire form the browser listens for.
    pub fn to_message(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "matting_status",
            "data": self,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, status: MattingStatus, model: &str, detail: Option<String>) {
        let event = StatusEvent {
            status,
            model: model.to_string(),
            detail,
        };
        if self.tx.send(event).is_err() {
            log::trace!("[STATUS] No status subscribers, event dropped");
        }
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let status = StatusBroadcaster::default();
        status.publish(MattingStatus::Processing, "BiRefNet", None);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let status = StatusBroadcaster::new(4);
        let mut rx = status.subscribe();
        status.publish(MattingStatus::Processing, "BiRefNet", None);
        status.publish(MattingStatus::Completed, "BiRefNet", None);

        assert_eq!(rx.recv().await.unwrap().status, MattingStatus::Processing);
        assert_eq!(rx.recv().await.unwrap().status, MattingStatus::Completed);
    }

    #[test]
    fn test_message_shape() {
        let event = StatusEvent {
            status: MattingStatus::Error,
            model: "BiRefNet".to_string(),
            detail: None,
        };
        let msg = event.to_message();
        assert_eq!(msg["type"], "matting_status");
        assert_eq!(msg["data"]["status"], "error");
        assert_eq!(msg["data"]["model"], "BiRefNet");
        assert!(msg["data"].get("detail").is_none());
    }
}

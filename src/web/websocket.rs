use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::{SinkExt, StreamExt};
use hyper::upgrade::Upgraded;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use crate::matting::StatusBroadcaster;

pub static ACTIVE_WS_CONNECTIONS: AtomicU32 = AtomicU32::new(0);

const WS_SEND_TIMEOUT: Duration = Duration::from_millis(250);

pub fn active_connections() -> u32 {
    ACTIVE_WS_CONNECTIONS.load(Ordering::SeqCst)
}

/// Forward every matting status event to one browser connection until
/// either side closes.
pub async fn handle_matting_status_ws(
    upgraded: Upgraded,
    status: StatusBroadcaster,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = WebSocketStream::from_raw_socket(
        upgraded,
        tokio_tungstenite::tungstenite::protocol::Role::Server,
        None,
    )
    .await;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    // subscribe before announcing ourselves so no event is missed
    let mut status_rx = status.subscribe();

    let connections = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    log::info!("[WS_STATUS] Client connected ({} active)", connections);

    loop {
        tokio::select! {
            event = status_rx.recv() => {
                match event {
                    Ok(event) => {
                        let message = event.to_message().to_string();
                        let send_result = tokio::time::timeout(
                            WS_SEND_TIMEOUT,
                            ws_sender.send(WsMessage::Text(message)),
                        )
                        .await;

                        match send_result {
                            Ok(Ok(())) => {
                                log::debug!("[WS_STATUS] Sent {:?} for {}", event.status, event.model);
                            }
                            Ok(Err(_)) => {
                                log::warn!("[WS_STATUS] Failed to send status - connection closed");
                                break;
                            }
                            Err(_) => {
                                log::warn!("[WS_STATUS] Status send timed out - skipping this event");
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("[WS_STATUS] Status receiver lagged by {} events", n);
                    }
                    Err(RecvError::Closed) => {
                        log::info!("[WS_STATUS] Status channel closed");
                        break;
                    }
                }
            }
            ws_msg = ws_receiver.next() => {
                match ws_msg {
                    Some(Ok(WsMessage::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Err(_)) => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let remaining = ACTIVE_WS_CONNECTIONS
        .fetch_sub(1, Ordering::SeqCst)
        .saturating_sub(1);
    log::info!("[WS_STATUS] Client disconnected ({} active)", remaining);
    Ok(())
}

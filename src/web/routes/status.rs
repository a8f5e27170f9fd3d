use std::convert::Infallible;

use hyper::{Body, Request, Response, StatusCode};

use crate::web::response_helpers::json_error;
use crate::web::state::AppState;
use crate::web::websocket::handle_matting_status_ws;
use crate::web::websocket_utils::{
    build_websocket_upgrade_response, calculate_websocket_accept_key, get_websocket_key,
    is_websocket_upgrade,
};

/// WebSocket upgrade handler for the matting status channel.
///
/// The canvas page opens this once and listens for `matting_status`
/// messages while a background-removal request is in flight.
pub async fn handle_status_websocket(
    req: Request<Body>,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    if !is_websocket_upgrade(&req) {
        return Ok(json_error(
            StatusCode::BAD_REQUEST,
            "WebSocket upgrade required",
        ));
    }

    let Some(key) = get_websocket_key(&req) else {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key"));
    };
    let accept_key = calculate_websocket_accept_key(&key);

    let status = state.status().clone();
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                if let Err(e) = handle_matting_status_ws(upgraded, status).await {
                    log::error!("[WS_STATUS ERROR] {}", e);
                }
            }
            Err(e) => {
                log::error!("[WS_STATUS UPGRADE ERROR] {}", e);
            }
        }
    });

    Ok(build_websocket_upgrade_response(&accept_key))
}

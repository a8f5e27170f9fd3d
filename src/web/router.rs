// Request dispatch for the canvas/matting server

use std::convert::Infallible;

use hyper::{Body, Method, Request, Response, StatusCode};

use super::request_parsing::path_param;
use super::response_helpers::{cors_preflight, json_error};
use super::routes;
use super::state::AppState;

const CANVAS_DATA_PREFIX: &str = "/ycnode/get_canvas_data/";
const EXECUTE_PREFIX: &str = "/ycnode/execute/";
const FLOW_STATUS_PREFIX: &str = "/ycnode/flow_status/";

pub async fn handle_request(req: Request<Body>, state: AppState) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    log::debug!("[HTTP] {} {}", method, path);

    if method == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    match (&method, path.as_str()) {
        (&Method::GET, "/health") => routes::health::handle().await,
        (&Method::POST, "/matting") => routes::matting::handle_matting(req, &state).await,
        (&Method::GET, "/ycnode/cache_status") => routes::canvas::handle_cache_status(&state).await,
        (&Method::GET, "/api/model/status") => routes::model::handle_model_status(&state).await,
        (&Method::GET, "/ws") => routes::status::handle_status_websocket(req, &state).await,

        (&Method::GET, p) if p.starts_with(CANVAS_DATA_PREFIX) => match path_param(p, CANVAS_DATA_PREFIX) {
            Some(node_id) => routes::canvas::handle_get_canvas_data(&node_id, &state).await,
            None => Ok(not_found(p)),
        },
        (&Method::POST, p) if p.starts_with(EXECUTE_PREFIX) => match path_param(p, EXECUTE_PREFIX) {
            Some(node_id) => routes::canvas::handle_execute(req, &node_id, &state).await,
            None => Ok(not_found(p)),
        },
        (&Method::GET, p) if p.starts_with(FLOW_STATUS_PREFIX) => match path_param(p, FLOW_STATUS_PREFIX) {
            Some(node_id) => routes::canvas::handle_flow_status(&node_id, &state).await,
            None => Ok(not_found(p)),
        },

        (_, p) => Ok(not_found(p)),
    }
}

fn not_found(path: &str) -> Response<Body> {
    log::debug!("[HTTP] No route for {}", path);
    json_error(StatusCode::NOT_FOUND, "Not found")
}

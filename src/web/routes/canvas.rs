// Canvas node route handlers
//
// GET  /ycnode/get_canvas_data/{node_id}
// POST /ycnode/execute/{node_id}
// GET  /ycnode/flow_status/{node_id}
// GET  /ycnode/cache_status

use std::convert::Infallible;

use hyper::{Body, Request, Response, StatusCode};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::canvas::{CanvasNodeInput, ExecutionId, FlowEvent, RunVerdict};
use crate::error::CanvasError;
use crate::imaging::{encode_png_data_url, TensorPayload};
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{json_error, json_response};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    #[serde(default = "default_canvas_image")]
    canvas_image: String,
    #[serde(default)]
    execution_id: Option<ExecutionId>,
    #[serde(default)]
    cache_enabled: bool,
    #[serde(default)]
    input_image: Option<TensorPayload>,
    #[serde(default)]
    input_mask: Option<TensorPayload>,
}

fn default_canvas_image() -> String {
    "canvas_image.png".to_string()
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    image: TensorPayload,
    mask: TensorPayload,
    execution_id: ExecutionId,
    verdict: RunVerdict,
    fallback: Option<String>,
}

#[derive(Debug, Serialize)]
struct CanvasData {
    image: Option<String>,
    mask: Option<String>,
}

#[derive(Debug, Serialize)]
struct FlowStatusResponse<'a> {
    node_id: &'a str,
    flow_id: &'a str,
    events: Vec<FlowEvent>,
}

/// Current cached image/mask as PNG data URLs. The cache is process-wide;
/// `node_id` is only logged.
pub async fn handle_get_canvas_data(node_id: &str, state: &AppState) -> Result<Response<Body>, Infallible> {
    log::debug!("[CANVAS] Canvas data requested for node {}", node_id);

    match encode_canvas_data(state) {
        Ok(data) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "success": true, "data": data }),
        )),
        Err(e) => {
            log::error!("[CANVAS] Failed to encode canvas data: {}", e);
            Ok(json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({ "success": false, "error": e.to_string() }),
            ))
        }
    }
}

fn encode_canvas_data(state: &AppState) -> Result<CanvasData, CanvasError> {
    let image = state
        .cache
        .image()
        .map(|img| encode_png_data_url(&DynamicImage::ImageRgb8(img)))
        .transpose()?;
    let mask = state
        .cache
        .mask()
        .map(|mask| encode_png_data_url(&DynamicImage::ImageLuma8(mask)))
        .transpose()?;
    Ok(CanvasData { image, mask })
}

/// Run the canvas node once, the way a pipeline run would.
pub async fn handle_execute(
    req: Request<Body>,
    node_id: &str,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    let body: ExecuteBody = match parse_json_body(req.into_body()).await {
        Ok(body) => body,
        Err(error_response) => return Ok(error_response),
    };

    let input_image = match body.input_image.map(TensorPayload::into_array).transpose() {
        Ok(tensor) => tensor,
        Err(e) => return Ok(json_error(StatusCode::BAD_REQUEST, &format!("input_image: {e}"))),
    };
    let input_mask = match body.input_mask.map(TensorPayload::into_array).transpose() {
        Ok(tensor) => tensor,
        Err(e) => return Ok(json_error(StatusCode::BAD_REQUEST, &format!("input_mask: {e}"))),
    };

    let node = state.node(node_id);
    let input = CanvasNodeInput {
        canvas_image: body.canvas_image,
        execution_id: body.execution_id,
        cache_enabled: body.cache_enabled,
        input_image,
        input_mask,
    };

    // canvas files are read from disk
    let output = match tokio::task::spawn_blocking(move || node.process(input)).await {
        Ok(output) => output,
        Err(e) => {
            log::error!("[CANVAS] Node task failed: {}", e);
            return Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Canvas node task failed"));
        }
    };

    Ok(json_response(
        StatusCode::OK,
        &ExecuteResponse {
            image: TensorPayload::from_array(&output.image),
            mask: TensorPayload::from_array(&output.mask),
            execution_id: output.execution_id,
            verdict: output.verdict,
            fallback: output.fallback,
        },
    ))
}

pub async fn handle_flow_status(node_id: &str, state: &AppState) -> Result<Response<Body>, Infallible> {
    let Some(node) = state.find_node(node_id) else {
        return Ok(json_error(
            StatusCode::NOT_FOUND,
            &format!("No canvas node {node_id} has run yet"),
        ));
    };
    let events = state.cache.flows().history(node.flow_id());
    Ok(json_response(
        StatusCode::OK,
        &FlowStatusResponse {
            node_id,
            flow_id: node.flow_id(),
            events,
        },
    ))
}

pub async fn handle_cache_status(state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(json_response(StatusCode::OK, &state.cache.stats()))
}

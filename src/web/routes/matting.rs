// Background removal route handler
//
// POST /matting  { image, threshold?, refinement?, model? }
// 200 { matted_image, alpha_mask } | 500 { error, details }

use std::convert::Infallible;

use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;

use crate::error::MattingError;
use crate::imaging::decode_data_url;
use crate::matting::pipeline::{DEFAULT_REFINEMENT, DEFAULT_THRESHOLD};
use crate::matting::{encode_matting_response, split_alpha, MattingRequest, MattingResponse, MattingStatus};
use crate::web::response_helpers::{json_error_details, json_response};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
struct MattingBody {
    image: String,
    #[serde(default = "default_threshold")]
    threshold: f32,
    #[serde(default = "default_refinement")]
    refinement: f32,
    #[serde(default)]
    model: Option<String>,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_refinement() -> f32 {
    DEFAULT_REFINEMENT
}

pub async fn handle_matting(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let result = match read_body(req.into_body(), state).await {
        Ok(body) => run_matting(body, state).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => Ok(json_response(StatusCode::OK, &response)),
        Err(e) => {
            log::error!("[MATTING] Request failed: {}", e);
            Ok(json_error_details(
                StatusCode::INTERNAL_SERVER_ERROR,
                &e.to_string(),
                &format!("{e:?}"),
            ))
        }
    }
}

/// A body that cannot be read as a matting request fails like any other
/// matting error: 500 with details, and an error event for the waiting page.
async fn read_body(body: Body, state: &AppState) -> Result<MattingBody, MattingError> {
    let parsed = match hyper::body::to_bytes(body).await {
        Ok(bytes) => {
            log::debug!("[MATTING] Body: {} bytes", bytes.len());
            serde_json::from_slice::<MattingBody>(&bytes)
                .map_err(|e| MattingError::InvalidRequest(format!("malformed request body: {e}")))
        }
        Err(e) => Err(MattingError::InvalidRequest(format!("failed to read request body: {e}"))),
    };
    if let Err(e) = &parsed {
        state
            .status()
            .publish(MattingStatus::Error, &state.config.default_model, Some(e.to_string()));
    }
    parsed
}

async fn run_matting(body: MattingBody, state: &AppState) -> Result<MattingResponse, MattingError> {
    let model_key = body
        .model
        .unwrap_or_else(|| state.config.default_model.clone());

    let decoded = match decode_data_url(&body.image) {
        Ok(image) => image,
        Err(e) => {
            // the page is waiting on the status channel
            state
                .status()
                .publish(MattingStatus::Error, &model_key, Some(e.to_string()));
            return Err(e.into());
        }
    };
    let (image, source_alpha) = split_alpha(&decoded);

    let result = state
        .pipeline
        .execute(MattingRequest {
            image,
            model_key,
            threshold: body.threshold,
            refinement: body.refinement,
        })
        .await?;

    encode_matting_response(&result, source_alpha.as_ref())
}

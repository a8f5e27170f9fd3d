// Model route handlers

use hyper::{Body, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;

use crate::web::response_helpers::json_response;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
struct ModelStatusResponse {
    default_model: String,
    default_loaded: bool,
    loaded: Vec<String>,
    model_dir: String,
    use_gpu: bool,
}

pub async fn handle_model_status(state: &AppState) -> Result<Response<Body>, Infallible> {
    let registry = state.pipeline.registry();
    let status = ModelStatusResponse {
        default_model: state.config.default_model.clone(),
        default_loaded: registry.is_loaded(&state.config.default_model),
        loaded: registry.loaded_keys(),
        model_dir: state.config.model_dir.display().to_string(),
        use_gpu: state.config.use_gpu,
    };
    Ok(json_response(StatusCode::OK, &status))
}

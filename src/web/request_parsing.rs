// Request parsing utilities for HTTP handlers

use hyper::{Body, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::response_helpers::json_error;

/// Parse JSON request body into a typed structure.
///
/// Returns the deserialized value on success, or an error Response on failure.
/// The error Response includes proper CORS headers and error message in JSON format.
///
/// # Example
/// ```ignore
/// let body: MattingBody = match parse_json_body(req.into_body()).await {
///     Ok(body) => body,
///     Err(error_response) => return Ok(error_response),
/// };
/// ```
pub async fn parse_json_body<T: DeserializeOwned>(body: Body) -> Result<T, Response<Body>> {
    let body_bytes = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("[REQUEST] Failed to read body: {}", e);
            return Err(json_error(StatusCode::BAD_REQUEST, "Failed to read request body"));
        }
    };

    // bodies carry base64 images, so only the size is logged
    log::debug!("[REQUEST] Body: {} bytes", body_bytes.len());

    serde_json::from_slice::<T>(&body_bytes).map_err(|e| {
        log::error!("[REQUEST] JSON parsing error: {}", e);
        json_error(StatusCode::BAD_REQUEST, &format!("Invalid JSON format: {e}"))
    })
}

/// Single trailing path segment after `prefix`, URL-decoded.
///
/// `/ycnode/get_canvas_data/12` with prefix `/ycnode/get_canvas_data/`
/// yields `12`; an empty or nested remainder yields `None`.
pub fn path_param(path: &str, prefix: &str) -> Option<String> {
    let raw = path.strip_prefix(prefix)?.trim_end_matches('/');
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        value: u32,
    }

    #[test]
    fn test_path_param_basic() {
        assert_eq!(
            path_param("/ycnode/get_canvas_data/12", "/ycnode/get_canvas_data/"),
            Some("12".to_string())
        );
        assert_eq!(
            path_param("/ycnode/flow_status/7/", "/ycnode/flow_status/"),
            Some("7".to_string())
        );
    }

    #[test]
    fn test_path_param_url_encoded() {
        assert_eq!(
            path_param("/ycnode/execute/node%201", "/ycnode/execute/"),
            Some("node 1".to_string())
        );
    }

    #[test]
    fn test_path_param_rejects_empty_and_nested() {
        assert_eq!(path_param("/ycnode/execute/", "/ycnode/execute/"), None);
        assert_eq!(path_param("/ycnode/execute/a/b", "/ycnode/execute/"), None);
        assert_eq!(path_param("/other/a", "/ycnode/execute/"), None);
    }

    #[tokio::test]
    async fn test_parse_json_body() {
        let parsed: Probe = parse_json_body(Body::from(r#"{"value": 3}"#)).await.unwrap();
        assert_eq!(parsed.value, 3);

        let err = parse_json_body::<Probe>(Body::from("nope")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

// HTTP/WebSocket surface for the canvas node and the matting service

pub mod config;
pub mod logger;
pub mod request_parsing;
pub mod response_helpers;
pub mod router;
pub mod routes;
pub mod state;
pub mod websocket;
pub mod websocket_utils;

// Re-export commonly used types
pub use config::{load_config, ServerConfig};
pub use logger::setup_logging;
pub use router::handle_request;
pub use state::AppState;

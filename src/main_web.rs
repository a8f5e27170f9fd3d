use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Context;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;

use ycnode_canvas::web::{handle_request, load_config, setup_logging, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("Failed to load server configuration")?;

    match setup_logging(&config) {
        Ok(path) => log::info!("Logging to {}", path.display()),
        Err(e) => eprintln!("Logging disabled: {e}"),
    }

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    let state = AppState::new(config);

    // Create HTTP service
    let make_svc = make_service_fn({
        let state = state.clone();
        move |_conn| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
            }
        }
    });

    // Start server
    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {addr}"))?
        .serve(make_svc);

    log::info!("Canvas node server starting on http://{}", addr);
    log::info!("Available endpoints:");
    log::info!("  GET  /health                          - Health check");
    log::info!("  POST /matting                         - Remove background from a data URL image");
    log::info!("  GET  /ws                              - Matting status websocket");
    log::info!("  GET  /api/model/status                - Loaded matting models");
    log::info!("  GET  /ycnode/get_canvas_data/{{id}}     - Cached canvas image and mask");
    log::info!("  POST /ycnode/execute/{{id}}             - Run the canvas node");
    log::info!("  GET  /ycnode/flow_status/{{id}}         - Flow history of a node instance");
    log::info!("  GET  /ycnode/cache_status             - Canvas cache state");
    log::info!(
        "Models: {} (default {})",
        state.config.model_dir.display(),
        state.config.default_model
    );

    server.await.context("Server error")?;
    Ok(())
}

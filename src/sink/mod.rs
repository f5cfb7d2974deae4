//! Stub upload backend.
//!
//! Accepts identity images and video segments, logs them and answers with
//! the acknowledgements the upload client expects. Storage is in memory
//! unless persistence is enabled.

pub mod error;
pub mod routes;
pub mod store;

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::info;

pub use store::{ReceivedChunk, ReceivedImage, RoomUploads, SinkStore};

/// Segments of a long interval at camera bitrates exceed axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn app(store: SinkStore) -> Router {
    Router::new()
        .route("/", get(status))
        .merge(routes::router(store))
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
}

pub struct SinkServer {
    port: u16,
    store: SinkStore,
}

impl SinkServer {
    pub fn new(port: u16, store: SinkStore) -> Self {
        Self { port, store }
    }

    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;
        serve(listener, self.store).await
    }
}

/// Serve on an already bound listener (port 0 in tests).
pub async fn serve(listener: TcpListener, store: SinkStore) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Upload sink listening on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /api/upload-image     - Identity still (JSON)");
    info!("  POST /api/upload-video     - Video segment (multipart)");
    info!("  GET  /api/rooms/:room_id   - Received uploads for a room");

    axum::serve(listener, app(store)).await?;
    Ok(())
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "roomcap-sink",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

//! `roomcap simulate`: drive a full interview session on synthetic devices.
//!
//! Useful for checking an upload backend end to end without a camera.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::args::SimulateCliArgs;
use crate::config::Config;
use crate::media::synthetic::{Permission, SyntheticDevices, SyntheticEncoder, SyntheticFeed};
use crate::media::{DeviceAcquisition, MediaSource};
use crate::session::{InterviewSession, SessionOptions, SessionStatusHandle};
use crate::sink::{self, SinkStore};
use crate::upload::UploadClient;

pub async fn handle_simulate_command(args: SimulateCliArgs) -> Result<()> {
    let mut config = Config::load()?;

    // Without an endpoint, upload into a sink running on this process.
    let local_store = match args.endpoint.as_deref() {
        Some(endpoint) => {
            config.upload.base_url = endpoint.to_string();
            None
        }
        None => {
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .context("Failed to bind local sink")?;
            config.upload.base_url = format!("http://{}", listener.local_addr()?);

            let store = SinkStore::new();
            let server_store = store.clone();
            tokio::spawn(async move {
                if let Err(e) = sink::serve(listener, server_store).await {
                    warn!("Local sink stopped: {}", e);
                }
            });
            Some(store)
        }
    };

    let mut options = SessionOptions::from(&config);
    if let Some(interval_ms) = args.interval_ms {
        options.interval = Duration::from_millis(interval_ms);
    }

    let devices = if args.deny_screen {
        SyntheticDevices::new().with_display(Permission::Denied)
    } else {
        SyntheticDevices::new()
    };
    let room_id = args
        .room
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut session = InterviewSession::new(
        room_id.clone(),
        args.user.as_deref(),
        DeviceAcquisition::new(Arc::new(devices)),
        Arc::new(SyntheticEncoder::default()),
        UploadClient::new(&config.upload),
        options,
        SessionStatusHandle::default(),
    );

    println!("Room: {}", room_id);
    println!("Uploading to: {}", config.upload.base_url);

    let feed = SyntheticFeed::with_test_pattern(640, 480);
    if let Err(e) = session.confirm_identity(&feed).await {
        warn!("Identity capture failed: {}", e);
    }

    session.start().await?;

    let total = Duration::from_secs(args.seconds);
    match args.switch_after.map(Duration::from_secs) {
        Some(switch_after) if switch_after < total => {
            tokio::time::sleep(switch_after).await;
            if let Err(e) = session.switch_source(MediaSource::ScreenShare).await {
                println!("Screen share unavailable, still recording camera: {}", e);
            }
            tokio::time::sleep(total - switch_after).await;
        }
        _ => tokio::time::sleep(total).await,
    }

    let state = session.status().get().await;
    let summary = session.finish().await;
    info!("Session ended after {} source switches", state.source_switches);

    if let Some(seconds) = state.duration_seconds() {
        println!("Recorded for {}s", seconds);
    }
    println!(
        "Segments: {} total, {} uploaded, {} failed",
        summary.total, summary.uploaded, summary.failed
    );
    if !summary.failed_indices.is_empty() {
        println!("Failed chunk indices: {:?}", summary.failed_indices);
    }

    if let Some(store) = local_store {
        if let Some(room) = store.room(&room_id).await {
            println!("Sink received {} image(s)", room.images.len());
            for chunk in room.ordered_chunks() {
                println!(
                    "  chunk {:>3}  {:>8} bytes  {}",
                    chunk
                        .chunk_index
                        .map(|i| i.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    chunk.size,
                    chunk.file_name.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

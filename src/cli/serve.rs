//! `roomcap serve`: run the stub upload backend in the foreground.

use anyhow::Result;
use tracing::info;

use super::args::ServeCliArgs;
use crate::config::Config;
use crate::global;
use crate::sink::{SinkServer, SinkStore};

pub async fn handle_serve_command(args: ServeCliArgs) -> Result<()> {
    let config = Config::load()?;
    let port = args.port.unwrap_or(config.sink.port);

    let store = if args.persist || config.sink.persist {
        let dir = global::uploads_dir()?;
        info!("Persisting received uploads to {:?}", dir);
        SinkStore::persisting_to(dir)
    } else {
        SinkStore::new()
    };

    SinkServer::new(port, store).start().await
}

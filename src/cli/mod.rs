pub mod args;
pub mod serve;
pub mod simulate;

pub use args::{Cli, CliCommand, ServeCliArgs, SimulateCliArgs};
pub use serve::handle_serve_command;
pub use simulate::handle_simulate_command;

use crate::config::Config;
use anyhow::{Context, Result};

pub fn handle_config_command() -> Result<()> {
    let path = Config::config_path()?;
    let config = Config::load_from(&path)?;

    println!("Config file: {}", path.display());
    println!();
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("{}", rendered);

    println!("Image endpoint: {}", config.upload.image_url());
    println!("Video endpoint: {}", config.upload.video_url());
    Ok(())
}

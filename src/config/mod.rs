use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upload: UploadConfig,
    pub recorder: RecorderConfig,
    pub capture: CaptureConfig,
    pub sink: SinkConfig,
}

/// Where finished segments and identity stills are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub base_url: String,
    pub image_path: String,
    pub video_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Length of one emitted segment, in milliseconds of recording time.
    pub interval_ms: u64,
    /// Segments the recorder may queue for the uploader before holding them back.
    pub channel_capacity: usize,
    /// Container/codec pairings in preference order; the first one the
    /// platform encoder supports wins.
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// JPEG quality (1-100) for identity stills.
    pub jpeg_quality: u8,
    /// Request a separate microphone track alongside screen shares.
    pub screen_share_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub port: u16,
    /// Write received payloads under the data directory instead of only logging them.
    pub persist: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3030".to_string(),
            image_path: "/api/upload-image".to_string(),
            video_path: "/api/upload-video".to_string(),
        }
    }
}

impl UploadConfig {
    pub fn image_url(&self) -> String {
        join_url(&self.base_url, &self.image_path)
    }

    pub fn video_url(&self) -> String {
        join_url(&self.base_url, &self.video_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            channel_capacity: 8,
            formats: crate::recorder::DEFAULT_FORMAT_PREFERENCES
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            screen_share_audio: true,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            port: 3030,
            persist: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path, writing the defaults there if the file is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_capture_pipeline() {
        let config = Config::default();
        assert_eq!(config.recorder.interval_ms, 10_000);
        assert_eq!(config.capture.jpeg_quality, 80);
        assert_eq!(
            config.recorder.formats.first().map(String::as_str),
            Some("video/webm;codecs=vp9,opus")
        );
    }

    #[test]
    fn test_upload_urls_join_cleanly() {
        let upload = UploadConfig {
            base_url: "http://localhost:3000/".to_string(),
            image_path: "api/upload-image".to_string(),
            video_path: "/api/upload-video".to_string(),
        };
        assert_eq!(upload.image_url(), "http://localhost:3000/api/upload-image");
        assert_eq!(upload.video_url(), "http://localhost:3000/api/upload-video");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.sink.port, 3030);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[recorder]\ninterval_ms = 2500\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.recorder.interval_ms, 2500);
        assert_eq!(config.recorder.channel_capacity, 8);
        assert!(config.capture.screen_share_audio);
        assert_eq!(config.upload.video_path, "/api/upload-video");
    }
}

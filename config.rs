//! Configuration loading with environment variable support.
//!
//! Settings come from a JSON file overlaid with environment variables; every
//! field has a default so a partial (or absent) file works. A fresh install
//! without a configured secret gets a random one that is printed nowhere;
//! run `shelterd init` to persist a usable config.
//!
//! ## Environment Variables
//!
//! - `SHELTER_CONFIG`: override config file path
//! - `SHELTER_PORT`: override listen port
//! - `SHELTER_UPLOAD_DIR`: override storage root directory

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::naming;

pub const ENV_CONFIG_PATH: &str = "SHELTER_CONFIG";
pub const ENV_PORT: &str = "SHELTER_PORT";
pub const ENV_UPLOAD_DIR: &str = "SHELTER_UPLOAD_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// Shared secrets accepted on upload.
    pub secrets: Vec<String>,
    /// Upload extensions accepted, compared case-insensitively.
    pub allowed_extensions: Vec<String>,
    /// Extensions whose content is gzip-compressed before storage.
    pub compressed_extensions: Vec<String>,
    /// Storage root directory.
    pub upload_folder: String,
    /// Directory receiving plaintext key backups when `backup_keys` is set.
    pub key_backup_folder: String,
    /// Encrypt stored objects under a fresh per-upload key. Must stay
    /// consistent for the lifetime of a deployment: the stored bytes carry no
    /// per-object marker for it.
    pub encrypt: bool,
    /// Write each issued key to the backup folder as a side effect.
    pub backup_keys: bool,
    /// Mount the read-only listing route.
    pub listing_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8282,
            secrets: vec![naming::random_hex(16)],
            allowed_extensions: [
                "png", "jpg", "jpeg", "bmp", "gif", "webp", "txt", "js", "css", "html", "java",
                "py", "rar", "zip", "yaml", "yml", "ini", "md", "mov", "mp4", "webm", "mkv",
                "flv", "vob", "ogg", "drc", "avi", "wmv", "yuv", "m4p", "m4v", "mpg", "mpeg",
                "m2v", "3gp", "3g2", "aa", "aac", "alac", "flac", "m4b", "mp3", "opus", "raw",
                "voc", "wav",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            compressed_extensions: [
                "bmp", "txt", "js", "css", "html", "java", "py", "yaml", "yml", "ini", "md",
                "raw",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            upload_folder: "uploads".to_string(),
            key_backup_folder: "key_backup".to_string(),
            encrypt: true,
            backup_keys: false,
            listing_enabled: false,
        }
    }
}

impl Config {
    /// Load config from a file path.
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config = serde_json::from_str(&s)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides.
    /// Priority: ENV vars > config file > defaults.
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p))?;
                serde_json::from_str(&s)?
            }
            _ => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = env::var(ENV_PORT) {
            match port.parse() {
                Ok(port) => {
                    debug!(port, "overriding port from environment");
                    self.port = port;
                }
                Err(_) => warn!(value = %port, "ignoring unparseable {}", ENV_PORT),
            }
        }

        if let Ok(upload_folder) = env::var(ENV_UPLOAD_DIR) {
            debug!(upload_folder = %upload_folder, "overriding upload_folder from environment");
            self.upload_folder = upload_folder;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.upload_folder.trim().is_empty() {
            anyhow::bail!("upload_folder cannot be empty");
        }

        if self.secrets.is_empty() || self.secrets.iter().any(|s| s.trim().is_empty()) {
            anyhow::bail!("secrets must contain at least one non-empty entry");
        }

        if self.allowed_extensions.is_empty() {
            anyhow::bail!("allowed_extensions cannot be empty");
        }

        for secret in &self.secrets {
            if secret.len() < 16 {
                warn!("a configured secret is shorter than 16 characters - it can be brute-forced");
            }
        }

        if !self.encrypt {
            warn!("encryption is disabled - stored objects are readable by anyone who learns their name");
        }

        if self.backup_keys {
            warn!(
                folder = %self.key_backup_folder,
                "key backups are enabled - plaintext keys on disk undo the encryption guarantee"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_fresh_install() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 8282);
        assert!(cfg.encrypt);
        assert!(!cfg.backup_keys);
        assert!(!cfg.listing_enabled);
        assert_eq!(cfg.secrets.len(), 1);
        assert_eq!(cfg.secrets[0].len(), 32);
        assert!(cfg.compressed_extensions.contains(&"txt".to_string()));
        cfg.validate().expect("defaults must validate");
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"port": 9000, "secrets": ["topsecretvalue123"]}"#)
            .expect("partial config parses");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.secrets, vec!["topsecretvalue123".to_string()]);
        assert_eq!(cfg.upload_folder, "uploads");
    }

    #[test]
    fn empty_secret_set_is_rejected() {
        let mut cfg = Config::default();
        cfg.secrets.clear();
        assert!(cfg.validate().is_err());
    }
}

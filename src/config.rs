use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::selector::DEFAULT_SEARCH_K;

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `<track>_<n>.<ext>` beat segments.
    pub segments_dir: Option<PathBuf>,
    /// JSON feature table (`mapping` + `features`) for the segments.
    pub features_path: Option<PathBuf>,
    /// Walk sub-directories of `segments_dir` too.
    pub recursive: bool,
    /// Candidates fetched from the similarity search per jump.
    pub search_k: usize,
    /// Fixed RNG seed for reproducible remixes.
    pub seed: Option<u64>,
    /// Threads for similarity scoring. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Required segment sample rate. Unset = whatever the first segment uses.
    pub sample_rate: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            segments_dir: None,
            features_path: None,
            recursive: false,
            search_k: DEFAULT_SEARCH_K,
            seed: None,
            workers: 0,
            sample_rate: None,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/beatremix/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path.
    /// Logs a warning and uses defaults if the file can't be read or parsed.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::analysis::evaluator::{DEPTH_CEILING, MAX_RECURSION_DEPTH};

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Kripke structure JSON (built-in structure when unset).
    pub kripke_path: Option<PathBuf>,
    /// Tonality catalog JSON (generated 24 keys when unset).
    pub tonalities_path: Option<PathBuf>,
    /// Tonalities to test when the command line names none. Empty = all.
    pub tonalities: Vec<String>,
    /// Number of parallel workers for batch analysis. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Search engine settings.
    pub engine: EngineConfig,
}

/// Satisfaction search settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recursion depth bound for the satisfaction search.
    pub max_recursion_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: MAX_RECURSION_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Depth bound, clamped to the hard ceiling.
    pub fn max_depth(&self) -> usize {
        if self.max_recursion_depth > DEPTH_CEILING {
            log::warn!(
                "max_recursion_depth {} exceeds {}, clamping",
                self.max_recursion_depth,
                DEPTH_CEILING
            );
        }
        self.max_recursion_depth.min(DEPTH_CEILING)
    }
}

impl AppConfig {
    /// Load config from `~/.config/tonalogy/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
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
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
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
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

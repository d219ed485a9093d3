//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::search::SearchConfig;

/// Name of the search armed by default.
pub const DEFAULT_SEARCH: &str = "colors";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Directory holding acoustic model and grammar resources
    pub resource_dir: PathBuf,

    /// Grammar file for the default color search, relative to the
    /// resource directory
    pub grammar_file: PathBuf,

    /// Keyphrase threshold balancing false alarms against misses
    pub keyword_threshold: f32,

    /// How long a dispatch batch waits for fixture acknowledgements
    pub dispatch_timeout: Duration,

    /// Whether voice-activity gating starts enabled
    pub vad_gating: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voxlight");

        let socket_path = data_dir.join("daemon.sock");

        let resource_dir = std::env::var("VOXLIGHT_RESOURCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("resources"));

        let dispatch_timeout = std::env::var("VOXLIGHT_DISPATCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let vad_gating = std::env::var("VOXLIGHT_VAD_GATING")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            socket_path,
            data_dir,
            resource_dir,
            grammar_file: PathBuf::from("colors.gram"),
            keyword_threshold: 1e-20,
            dispatch_timeout,
            vad_gating,
        })
    }

    /// Ensure data and resource directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.resource_dir)?;
        Ok(())
    }

    /// The searches registered for the session's lifetime.
    pub fn searches(&self) -> Vec<SearchConfig> {
        vec![SearchConfig {
            name: DEFAULT_SEARCH.to_string(),
            grammar: self.grammar_file.clone(),
            keyword_threshold: self.keyword_threshold,
        }]
    }
}

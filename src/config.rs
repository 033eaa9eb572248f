//! Application configuration
//!
//! One sub-config per pipeline component, aggregated here and loadable
//! from a TOML file. The file holds only tuning values; nothing biometric
//! is ever written to it or anywhere else on disk.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::liveness::LivenessConfig;
use crate::matching::MatchConfig;
use crate::privacy::PrivacyConfig;
use crate::session::SessionConfig;
use crate::spoof::SpoofConfig;

/// Request size and duration limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Base utterance duration expected of any phrase
    pub min_voice_ms: u64,
    /// Additional duration expected per phrase character
    pub ms_per_phrase_char: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 8 * 1024 * 1024,
            min_voice_ms: 300,
            ms_per_phrase_char: 30,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub liveness: LivenessConfig,
    pub spoof: SpoofConfig,
    pub privacy: PrivacyConfig,
    pub matching: MatchConfig,
    pub session: SessionConfig,
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Load config from file or create default
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: AppConfig = toml::from_str(&content)?;
            log::info!("Config loaded from: {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            let toml_str = toml::to_string_pretty(&config)?;
            fs::write(path, toml_str)?;
            log::info!("Default config created at: {}", path.display());
            Ok(config)
        }
    }
}

//! Configuration loading for TechScout.
//! Reads techscout.toml from the current directory or the path in TECHSCOUT_CONFIG.

use serde::{Deserialize, Serialize};
use std::path::Path;

use techscout_ingestion::{FetcherConfig, PipelineConfig, SourceEndpoints};

pub const CONFIG_ENV: &str = "TECHSCOUT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "techscout.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetcherConfig,
    #[serde(default)]
    pub sources: SourceEndpoints,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Results requested from each source.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize { 20 }

impl Default for PipelineSection {
    fn default() -> Self {
        Self { max_results: default_max_results() }
    }
}

impl Config {
    /// Load configuration from techscout.toml.
    /// Checks TECHSCOUT_CONFIG first, then the current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// A missing file yields the defaults; an unreadable or invalid one is an error.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
        Ok(config)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_results: self.pipeline.max_results,
            fetcher: self.fetch.clone(),
            endpoints: self.sources.clone(),
        }
    }
}

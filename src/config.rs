//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.demostat.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Source file settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Chart settings.
    #[serde(default)]
    pub chart: ChartConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { verbose: false }
    }
}

/// Source file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Maximum rows per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Field separator (single character).
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Year ages are computed against. Defaults to the current year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_year: Option<i32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            delimiter: default_delimiter(),
            reference_year: None,
        }
    }
}

fn default_chunk_size() -> usize {
    500_000
}

fn default_delimiter() -> String {
    ";".to_string()
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker threads. 0 means one per CPU core.
    #[serde(default)]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: 0 }
    }
}

impl PipelineConfig {
    /// The effective pool size: `workers`, or the core count when 0.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Chart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Output path of the pyramid image.
    #[serde(default = "default_chart_path")]
    pub path: String,

    /// Image width in pixels.
    #[serde(default = "default_chart_width")]
    pub width: u32,

    /// Image height in pixels.
    #[serde(default = "default_chart_height")]
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            path: default_chart_path(),
            width: default_chart_width(),
            height: default_chart_height(),
        }
    }
}

fn default_chart_path() -> String {
    "age_pyramid.png".to_string()
}

fn default_chart_width() -> u32 {
    1200
}

fn default_chart_height() -> u32 {
    800
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".demostat.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(chunk_size) = args.chunk_size {
            self.source.chunk_size = chunk_size;
        }
        if let Some(workers) = args.workers {
            self.pipeline.workers = workers;
        }
        if let Some(reference_year) = args.reference_year {
            self.source.reference_year = Some(reference_year);
        }
        if let Some(ref chart) = args.chart {
            self.chart.path = chart.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// The delimiter as a single byte.
    pub fn delimiter_byte(&self) -> u8 {
        self.source.delimiter.bytes().next().unwrap_or(b';')
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.chunk_size, 500_000);
        assert_eq!(config.source.delimiter, ";");
        assert_eq!(config.pipeline.workers, 0);
        assert_eq!(config.chart.path, "age_pyramid.png");
    }

    #[test]
    fn test_effective_workers_auto() {
        let config = PipelineConfig { workers: 0 };
        assert!(config.effective_workers() >= 1);

        let pinned = PipelineConfig { workers: 3 };
        assert_eq!(pinned.effective_workers(), 3);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[source]
chunk_size = 1000
delimiter = ","
reference_year = 2025

[pipeline]
workers = 8

[chart]
path = "pyramid.png"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.source.chunk_size, 1000);
        assert_eq!(config.delimiter_byte(), b',');
        assert_eq!(config.source.reference_year, Some(2025));
        assert_eq!(config.pipeline.workers, 8);
        assert_eq!(config.chart.path, "pyramid.png");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[source]"));
        assert!(toml_str.contains("[pipeline]"));
        assert!(toml_str.contains("[chart]"));
    }
}

//! Run settings, merged from the TOML config file and command-line flags.
//! Flags win over file values, file values win over built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use clinfhir_pipeline::ConversionConfig;

use crate::cli::Cli;

/// Optional values read from the config file. Anything absent falls back to
/// the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub patients: Option<usize>,
    pub random: Option<bool>,
    pub pool_size: Option<usize>,
    pub bundle_threshold: Option<usize>,
    pub fetch_timeout_secs: Option<u64>,
    pub output: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub server: Option<String>,
    pub token: Option<String>,
    pub timings: Option<PathBuf>,
    pub imaging: Option<bool>,
    pub seed: Option<u64>,
    pub identifier_system: Option<String>,
}

impl FileConfig {
    /// Loads the file if it exists; a missing file is not an error, a
    /// malformed one is.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub patients: usize,
    pub random: bool,
    pub output: String,
    pub output_dir: Option<PathBuf>,
    pub server: Option<String>,
    pub token: Option<String>,
    pub timings: Option<PathBuf>,
    pub seed: u64,
    pub conversion: ConversionConfig,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: FileConfig) -> Self {
        let defaults = ConversionConfig::default();
        let conversion = ConversionConfig {
            bundle_threshold: cli
                .bundle_threshold
                .or(file.bundle_threshold)
                .unwrap_or(defaults.bundle_threshold),
            pool_size: cli.pool_size.or(file.pool_size).unwrap_or(defaults.pool_size),
            fetch_timeout_secs: file
                .fetch_timeout_secs
                .unwrap_or(defaults.fetch_timeout_secs),
            include_imaging: cli.imaging || file.imaging.unwrap_or(false),
            identifier_system: file
                .identifier_system
                .unwrap_or(defaults.identifier_system),
        };
        Self {
            patients: cli.patients.or(file.patients).unwrap_or(1),
            random: cli.random || file.random.unwrap_or(false),
            output: cli
                .output
                .clone()
                .or(file.output)
                .unwrap_or_else(|| "console".to_string()),
            output_dir: cli.output_dir.clone().or(file.output_dir),
            server: cli.server.clone().or(file.server),
            token: cli.token.clone().or(file.token),
            timings: cli.timings.clone().or(file.timings),
            seed: cli.seed.or(file.seed).unwrap_or(0),
            conversion,
        }
    }
}

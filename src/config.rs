//! Pipeline configuration.
//!
//! Loaded from a JSON file: the mining strategy, its tunables, and one
//! entry per log source naming where its files live, which filenames
//! belong to it, and how its lines are laid out.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::SiftError;
use crate::miner::{MinerKind, MinerParams};

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub extractor: MinerKind,
    #[serde(default)]
    pub params: MinerParams,
    pub logs: Vec<LogSourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSourceConfig {
    /// Logical name; reports are written under it.
    pub name: String,
    /// Directory with this source's files, relative to the pipeline root.
    pub input_dir: String,
    /// Full-filename regex selecting which files belong to the source.
    pub logfile_pattern: String,
    /// Line layout, e.g. `<Date> <Time> <Level> <Content>`.
    pub logformat: String,
    /// Content patterns replaced by `*` before mining.
    #[serde(default)]
    pub scrub_patterns: Vec<String>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, SiftError> {
        let raw = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

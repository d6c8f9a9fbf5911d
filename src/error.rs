//! Error types for the mining pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiftError {
    /// A log format string or configured pattern did not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The log format is missing a header the pipeline requires.
    #[error("log format has no <{0}> field")]
    MissingHeader(&'static str),

    /// The pipeline config file could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// The append-only exception log could not be opened. Fatal to the
    /// exception index, surfaced distinctly from ordinary I/O.
    #[error("failed to open exception log: {0}")]
    ExceptionLog(std::io::Error),

    /// CSV report output failed.
    #[error("report error: {0}")]
    Report(#[from] csv::Error),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

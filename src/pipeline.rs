//! Per-source orchestration.
//!
//! One source runs end to end on the calling thread: list its files, read
//! and classify each, route attached exception blocks into the source's
//! exception index, push structured lines through the preprocessor, mine
//! the extracted records with a fresh miner instance, then write both CSV
//! reports. Sources are independent; running several in parallel is the
//! caller's business, sharing a miner across threads is not supported.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::classifier::LineClassifier;
use crate::config::LogSourceConfig;
use crate::error::SiftError;
use crate::exception_index::ExceptionIndex;
use crate::miner::{new_miner, MinerKind, MinerParams};
use crate::preprocessor::{LogFormat, Preprocessor};
use crate::report::write_reports;

/// What one source run produced.
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub files: usize,
    pub records: usize,
    pub clusters: usize,
    pub exception_signatures: usize,
}

/// Mine one configured log source.
pub fn run_source(
    root: &Path,
    out_dir: &Path,
    source: &LogSourceConfig,
    kind: MinerKind,
    params: &MinerParams,
) -> Result<SourceSummary> {
    let format = LogFormat::compile(&source.logformat)
        .with_context(|| format!("compiling log format for source {}", source.name))?;
    let file_pattern = Regex::new(&format!("^{}$", source.logfile_pattern))
        .with_context(|| format!("compiling logfile pattern for source {}", source.name))?;

    let classifier = LineClassifier::new(format.line_pattern().clone());
    let mut preprocessor = Preprocessor::new(format, &source.scrub_patterns)
        .with_context(|| format!("compiling scrub patterns for source {}", source.name))?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let mut exceptions = ExceptionIndex::create(
        &out_dir.join(format!("{}_exceptions.txt", source.name)),
        new_miner(kind, params),
    )
    .with_context(|| format!("opening exception log for source {}", source.name))?;

    let input_dir = root.join(&source.input_dir);
    let mut file_names: Vec<String> = fs::read_dir(&input_dir)
        .with_context(|| format!("listing input directory {}", input_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| file_pattern.is_match(name))
        .collect();
    file_names.sort();

    let mut files = 0;
    for name in &file_names {
        let path = input_dir.join(name);
        tracing::info!(file = %path.display(), "preprocessing");

        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let lines: Vec<String> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        for record in classifier.classify(&lines) {
            if !record.block().is_empty() {
                exceptions
                    .add(record.block())
                    .with_context(|| format!("indexing exception block in {}", name))?;
            }
            if record.is_structured() {
                preprocessor.push_structured(record.text());
            }
        }
        files += 1;
    }

    let headers = preprocessor.format().headers().to_vec();
    let content_idx = preprocessor
        .format()
        .header_index("Content")
        .ok_or(SiftError::MissingHeader("Content"))?;
    let level_idx = preprocessor.format().header_index("Level");

    let records = preprocessor.finish();
    let mut miner = new_miner(kind, params);
    let total = records.len();

    for (count, record) in records.iter().enumerate() {
        let tokens = miner.tokenize(&record.fields[content_idx]);
        let level = level_idx
            .map(|li| record.fields[li].trim())
            .unwrap_or_default();
        miner.add(record.line_id, tokens, level);

        if (count + 1) % 1000 == 0 || count + 1 == total {
            tracing::debug!(
                source = %source.name,
                processed = count + 1,
                total,
                "mining progress"
            );
        }
    }

    write_reports(out_dir, &source.name, &headers, &records, miner.clusters())
        .with_context(|| format!("writing reports for source {}", source.name))?;

    let summary = SourceSummary {
        files,
        records: total,
        clusters: miner.clusters().len(),
        exception_signatures: exceptions.signature_count(),
    };
    exceptions.finish()?;

    tracing::info!(
        source = %source.name,
        files = summary.files,
        records = summary.records,
        clusters = summary.clusters,
        exceptions = summary.exception_signatures,
        "source done"
    );
    Ok(summary)
}

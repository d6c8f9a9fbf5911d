use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use logsift::config::PipelineConfig;
use logsift::pipeline::run_source;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("usage: logsift <config.json> <root-dir> <output-dir>");
    }
    let config_path = PathBuf::from(&args[1]);
    let root = PathBuf::from(&args[2]);
    let out_dir = PathBuf::from(&args[3]);

    let config = PipelineConfig::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    tracing::info!(
        extractor = ?config.extractor,
        sources = config.logs.len(),
        "starting"
    );

    for source in &config.logs {
        tracing::info!(source = %source.name, "parsing");
        run_source(&root, &out_dir, source, config.extractor, &config.params)?;
    }

    Ok(())
}

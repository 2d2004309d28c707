use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::*;

use scsilink_core::config::LinkConfig;
use scsilink_runner::{StepResult, parse_script, run_session};

#[derive(Parser)]
struct Args {
    /// Session script (JSON)
    script: PathBuf,

    /// Adapter configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => LinkConfig::load(path)?,
        None => LinkConfig::default(),
    };
    let script = parse_script(
        &fs::read_to_string(&args.script)
            .with_context(|| format!("Cannot read {}", args.script.display()))?,
    )?;
    info!(
        "Running {} steps against SCSI/Link at ID {}, MAC {}",
        script.len(),
        config.scsi_id,
        config.mac
    );

    let report = run_session(config, &script)?;
    let failed = report
        .steps
        .iter()
        .filter(|s| matches!(s, StepResult::Failed(_)))
        .count();
    info!("{}", report.status);
    if failed > 0 {
        warn!("{} step(s) failed", failed);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cardlens::{
    AppConfig, CatalogLookup, ConcurrentCardResolver, LookupClient, OcrsRecognizer, ScanError,
    ScanPipeline,
};

#[derive(Parser)]
#[command(name = "cardlens")]
#[command(about = "Find trading cards in a photo and look up their names")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// JSON card catalog used for name lookups
    #[arg(long, value_name = "FILE", required_unless_present = "detect_only")]
    catalog: Option<PathBuf>,

    /// JSON settings file (defaults apply to anything left out)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Stop after card detection and print the corners
    #[arg(long)]
    detect_only: bool,

    /// Directory holding the ocrs detection and recognition models
    #[arg(long, value_name = "DIR")]
    ocr_models: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref(), args.verbose))
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", json!({ "error": format!("{e:#}") }));
            ExitCode::from(exit_code(&e))
        }
    }
}

/// `RUST_LOG` wins when set and valid; otherwise `debug` with `--verbose`, else `info`.
fn log_filter(rust_log: Option<&str>, verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ScanError>() {
        Some(ScanError::Decode(_)) => 2,
        Some(ScanError::NoCardsDetected) => 3,
        _ => 1,
    }
}

async fn run(args: Cli) -> anyhow::Result<serde_json::Value> {
    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let mut pipeline = ScanPipeline::new(&config.detection)?;
    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let bytes = std::fs::read(&args.image_path)
        .with_context(|| format!("reading {}", args.image_path.display()))?;

    if args.detect_only {
        let quads = tokio::task::spawn_blocking(move || {
            let img = ScanPipeline::decode(&bytes)?;
            pipeline.detect(&img)
        })
        .await??;
        return Ok(json!({ "cards_detected": quads.len(), "quadrilaterals": quads }));
    }

    let Some(catalog_path) = args.catalog else {
        anyhow::bail!("--catalog is required unless --detect-only is set");
    };
    let recognizer = match &args.ocr_models {
        Some(dir) => OcrsRecognizer::from_dir(dir, &config.resolver.allowed_chars)?,
        None => OcrsRecognizer::from_default_location(&config.resolver.allowed_chars)?,
    };
    let client = LookupClient::init(CatalogLookup::load(&catalog_path)?);
    let resolver = ConcurrentCardResolver::new(client.clone(), Arc::new(recognizer), config.resolver);

    let report = pipeline.scan(bytes, &resolver).await;
    client.shutdown();
    let report = report?;

    info!(
        cards = report.cards_detected,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "scan finished"
    );
    Ok(serde_json::to_value(&report)?)
}

mod cli;
mod config;
mod synthetic;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use clinfhir_pipeline::{
    BundleConsumer, CachedLookup, ConversionContext, ConversionScheduler, RecordSource,
    TableLookup, TimingLog, bundle_channel, queue::DEFAULT_CHANNEL_CAPACITY,
};
use clinfhir_sink::{HttpRepository, OutputDispatcher, OutputMode};

use cli::Cli;
use config::{FileConfig, Settings};
use synthetic::SyntheticSource;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let file = FileConfig::load(&cli.config)?;
    let settings = Settings::resolve(&cli, file);
    tracing::debug!(?settings, "resolved settings");

    let dispatcher = build_dispatcher(&settings)?;
    let (publisher, rx) = bundle_channel(DEFAULT_CHANNEL_CAPACITY);
    let consumer = tokio::spawn(BundleConsumer::new(rx, Arc::new(dispatcher)).run());

    let source = Arc::new(SyntheticSource::new(settings.seed));
    let terminology = Arc::new(CachedLookup::new(demo_terminology()));
    let context = Arc::new(ConversionContext::new(
        settings.conversion.clone(),
        terminology,
    ));
    let timing = Arc::new(TimingLog::new());
    let scheduler = ConversionScheduler::new(source.clone(), context, timing.clone());

    let cancel = scheduler.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing current admissions");
            cancel.cancel();
        }
    });

    let keys = source
        .list_candidate_keys(settings.patients, settings.random)
        .await?;
    let summary = scheduler.run(&keys, publisher).await?;
    let report = consumer
        .await
        .context("consumer task panicked")??;

    if let Some(path) = &settings.timings {
        timing
            .write_csv(path)
            .with_context(|| format!("writing timings to {}", path.display()))?;
        tracing::info!(path = %path.display(), "timings written");
    }

    println!("{summary}");
    for (key, error) in summary.failures() {
        println!("  failed: {key}: {error}");
    }
    if report.sink_failures > 0 {
        bail!(
            "{} of {} fragments were rejected by the sink",
            report.sink_failures,
            report.dispatched + report.sink_failures
        );
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

fn build_dispatcher(settings: &Settings) -> Result<OutputDispatcher> {
    let mode: OutputMode = settings.output.parse()?;
    match mode {
        OutputMode::Console => Ok(OutputDispatcher::console()),
        OutputMode::File | OutputMode::Both => {
            let dir = settings
                .output_dir
                .as_ref()
                .context("file output mode requires --output-dir")?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating output directory {}", dir.display()))?;
            Ok(match mode {
                OutputMode::File => OutputDispatcher::file(dir),
                _ => OutputDispatcher::both(dir),
            })
        }
        OutputMode::Server => {
            let endpoint = settings
                .server
                .as_ref()
                .context("server output mode requires --server")?;
            let mut repository = HttpRepository::new(endpoint.as_str());
            if let Some(token) = &settings.token {
                repository = repository.with_token(token.as_str());
            }
            Ok(OutputDispatcher::server(Arc::new(repository)))
        }
    }
}

/// Small built-in crosswalk so demo output carries resolved displays.
fn demo_terminology() -> TableLookup {
    let mut table = TableLookup::new();
    table.insert("4019", "Essential hypertension");
    table.insert("4280", "Congestive heart failure");
    table.insert("25000", "Diabetes mellitus type II");
    table.insert("5849", "Acute kidney failure");
    table.insert("51881", "Acute respiratory failure");
    table.insert("rx-1658", "heparin sodium");
    table.insert("rx-2321", "insulin human");
    table
}

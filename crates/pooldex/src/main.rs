use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt as _, EnvFilter,
    Layer as _,
};

use pooldex::config::load_spec;
use pooldex::db::{self, Database};
use pooldex::drive::{
    ClientSecrets, DriveClient, FolderStore, StoredTokenProvider, TokenProvider,
};
use pooldex::extract::EntryExtractor;
use pooldex::ocr::TesseractRecognizer;
use pooldex::pdf::PopplerRenderer;
use pooldex::pipeline::Pipeline;
use pooldex::run::RunCoordinator;

/// Watches a shared drive folder for scanned winter-pool bundles, OCRs
/// them, and maintains an anonymised index and summary.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opts {
    /// Path to the job spec file.
    #[arg(long, default_value = "./jobspec.yaml", value_name = "PATH")]
    spec: PathBuf,

    /// Keep running passes until interrupted.
    #[arg(long = "loop")]
    loop_mode: bool,

    /// Seconds to sleep between passes in loop mode.
    #[arg(long, value_name = "SECONDS")]
    loop_sleep: Option<u64>,

    /// Only log warnings and errors.
    #[arg(long, short)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_tracing(opts.quiet)?;

    let mut spec = load_spec(&opts.spec)?;
    if opts.loop_mode {
        spec.loop_mode = true;
    }
    if let Some(sleep) = opts.loop_sleep {
        anyhow::ensure!(sleep > 0, "--loop-sleep must be at least 1 second");
        spec.loop_sleep_seconds = sleep;
    }

    info!("pooldex {} starting", env!("CARGO_PKG_VERSION"));

    let store_dir = match &spec.store_path {
        Some(path) => path.clone(),
        None => db::default_store_path().context(
            "Cannot determine a home directory for the state store; set store_path in the job spec",
        )?,
    };
    let database = Database::open(&store_dir.join(db::DB_FILE_NAME))?;

    let secrets = ClientSecrets::load(&spec.credentials_path)?;
    let tokens = StoredTokenProvider::new(database.clone(), secrets)?;
    tokens.ensure_authorized().await?;
    let tokens: Arc<dyn TokenProvider> = Arc::new(tokens);
    let store: Arc<dyn FolderStore> = Arc::new(DriveClient::new(tokens)?);

    let renderer = Arc::new(PopplerRenderer::new(spec.ocr.dpi));
    let recognizer = Arc::new(TesseractRecognizer::new(&spec.ocr.languages));
    let extractor = EntryExtractor::new(spec.extraction.min_id_matches);
    let pipeline = Pipeline::new(Arc::clone(&store), renderer, recognizer, extractor);

    let loop_mode = spec.loop_mode;
    let coordinator = RunCoordinator::new(spec, database, store, pipeline);

    if loop_mode {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        ctrlc::set_handler(move || {
            let _ = shutdown_tx.send(());
        })
        .context("Failed to install the interrupt handler")?;

        coordinator.run_loop(shutdown_rx).await;
    } else {
        coordinator.run_once().await?;
    }

    Ok(())
}

/// Sets up the tracing subscriber and bridges `log` records into it.
fn init_tracing(quiet: bool) -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("Failed to initialize the log bridge")?;

    let level = if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(fmt_layer).init();
    Ok(())
}

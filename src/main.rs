//! bionic-epub command line
//!
//! Reads an EPUB, converts it and writes `<name>-bionic.epub` next to it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bionic_epub::config::{is_valid_tag, Config};
use bionic_epub::{CancelSignal, Converter};

#[derive(Parser, Debug)]
#[command(name = "bionic-epub", version, about = "Apply bionic reading emphasis to an EPUB")]
struct Args {
    /// EPUB file to convert
    input: PathBuf,

    /// Where to write the result (default: `<stem>-bionic.<ext>` beside the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emphasis element name
    #[arg(long)]
    tag: Option<String>,

    /// Maximum number of documents rewritten at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Print the conversion report as JSON on stdout
    #[arg(long)]
    report: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "bionic_epub=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = apply_args(Config::from_env(), &args)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = cancel_tx.send(true);
    });

    run(&args, &config, cancel_rx).await
}

fn apply_args(mut config: Config, args: &Args) -> anyhow::Result<Config> {
    if let Some(tag) = &args.tag {
        if !is_valid_tag(tag) {
            bail!("invalid emphasis tag: {:?}", tag);
        }
        config = config.with_emphasis_tag(tag.clone());
    }
    if let Some(jobs) = args.jobs {
        config = config.with_max_concurrency(jobs);
    }
    Ok(config)
}

async fn run(args: &Args, config: &Config, cancel: CancelSignal) -> anyhow::Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| output_path(&args.input, &config.output_suffix));

    let input = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    tracing::info!("Starting bionic-epub v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Input: {} ({} bytes)", args.input.display(), input.len());

    let converted = Converter::new(config)
        .convert_with_cancel(input, cancel)
        .await
        .with_context(|| format!("failed to convert {}", args.input.display()))?;

    tokio::fs::write(&output, &converted.bytes)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(
        "Wrote {} ({}, {} bytes)",
        output.display(),
        converted.content_type,
        converted.bytes.len()
    );

    if args.report {
        println!("{}", serde_json::to_string_pretty(&converted.report)?);
    }

    Ok(())
}

/// `dir/book.epub` -> `dir/book-bionic.epub`
fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "epub".to_string());
    input.with_file_name(format!("{}{}.{}", stem, suffix, ext))
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, cancelling remaining documents...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, cancelling remaining documents...");
        },
    }
}

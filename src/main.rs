use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gallery_ingest::{DeleteOutcome, FolderId, Gallery, GalleryConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Ingest photos into a gallery folder and manage their derivatives
#[derive(Parser, Debug)]
#[command(name = "gallery-ingest", version, about)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory derivative paths are relative to
    #[arg(long, global = true)]
    public_dir: Option<PathBuf>,

    /// SQLite catalog file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate derivatives for files and record them
    Upload {
        #[arg(long)]
        folder: i64,
        /// MIME type for all files (guessed from the extension otherwise)
        #[arg(long)]
        mime: Option<String>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the gallery JSON of a folder
    List {
        #[arg(long)]
        folder: i64,
    },
    /// Delete images and their derivative files
    Delete {
        /// Fail when any cleanup was incomplete
        #[arg(long)]
        strict: bool,
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => GalleryConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GalleryConfig::default(),
    };
    if let Some(dir) = cli.public_dir {
        config.public_dir = dir;
    }
    if let Some(db) = cli.database {
        config.database = Some(db);
    }

    let gallery = Gallery::from_config(&config).context("opening gallery")?;
    tracing::info!(
        images = gallery.library().image_count().unwrap_or(0),
        public_dir = %config.public_dir.display(),
        "gallery ready"
    );

    match cli.command {
        Command::Upload { folder, mime, files } => {
            let folder = FolderId::new(folder)?;
            let outcomes = gallery.upload_paths(folder, &files, mime.as_deref());

            let uploaded = outcomes.iter().filter(|o| o.is_uploaded()).count();
            tracing::info!(uploaded, skipped = outcomes.len() - uploaded, "upload finished");
            print_json(&outcomes)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List { folder } => {
            let images = gallery.list(FolderId::new(folder)?)?;
            print_json(&images)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Delete { strict, ids } => {
            let outcomes = gallery.delete_images(&ids)?;
            print_json(&outcomes)?;

            if strict {
                for outcome in &outcomes {
                    if let DeleteOutcome::Cleaned { id, report, .. } = outcome {
                        report
                            .clone()
                            .ensure_complete()
                            .with_context(|| format!("image {id}"))?;
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

//! booksync CLI
//!
//! Runs update cycles against the local archive and the remote library.

use std::path::PathBuf;
use std::sync::Arc;

use booksync::{
    error::Result,
    models::Config,
    pipeline::{Orchestrator, Target},
    services::{ContentExtractor, HtmlExtractor, HttpRemote, RemoteStore},
    storage::{ArchiveStore, LocalArchive},
    utils::CancelFlag,
};
use clap::{Parser, Subcommand};

/// booksync - incremental book archive and remote library sync
#[derive(Parser, Debug)]
#[command(name = "booksync", version, about = "Incremental chapter sync engine")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "booksync.toml")]
    config: PathBuf,

    /// Override the archive directory from the config
    #[arg(long)]
    archive_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh catalogs, fetch new chapters and sync them to the remote
    Update {
        /// Only this archived book (default: every archived book)
        #[arg(long)]
        book: Option<String>,

        /// Skip the remote entirely
        #[arg(long)]
        offline: bool,
    },

    /// Add a book by catalog URL and run a full cycle for it
    Add {
        /// Catalog page of the book
        url: String,

        /// Skip the remote entirely
        #[arg(long)]
        offline: bool,
    },

    /// Sync archived books to the remote without contacting the source
    Push {
        /// Only this archived book (default: every archived book)
        #[arg(long)]
        book: Option<String>,
    },

    /// Mark remote books as completed so future cycles skip them
    MarkCompleted {
        /// Book titles
        #[arg(required = true)]
        titles: Vec<String>,
    },

    /// List archived books with chapter counts
    Info,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Stop after the current chapter or batch on Ctrl-C.
fn install_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current chapter...");
            cancel.cancel();
        }
    });
}

fn build_orchestrator(config: &Arc<Config>, offline: bool) -> Result<Orchestrator> {
    let archive: Arc<dyn ArchiveStore> = Arc::new(LocalArchive::new(&config.archive.dir));
    let extractor: Arc<dyn ContentExtractor> = Arc::new(HtmlExtractor::new(config)?);

    let remote: Option<Arc<dyn RemoteStore>> = if offline {
        log::info!("Offline run: remote sync skipped");
        None
    } else if !config.remote.is_enabled() {
        log::warn!("remote.base_url is not set; remote sync skipped");
        None
    } else {
        Some(Arc::new(HttpRemote::new(&config.remote, &config.fetch)?))
    };

    let cancel = CancelFlag::new();
    install_interrupt_handler(cancel.clone());

    Ok(Orchestrator::new(Arc::clone(config), archive, extractor, remote)?.with_cancel(cancel))
}

fn target(book: Option<String>) -> Target {
    book.map_or(Target::All, Target::Book)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    if let Some(dir) = cli.archive_dir {
        config.archive.dir = dir;
    }
    log::info!("Archive directory: {}", config.archive.dir.display());

    let config = Arc::new(config);

    let failed = match cli.command {
        Command::Update { book, offline } => {
            config.validate()?;
            let orchestrator = build_orchestrator(&config, offline)?;
            orchestrator.update(&target(book)).await?.has_failures()
        }

        Command::Add { url, offline } => {
            config.validate()?;
            let orchestrator = build_orchestrator(&config, offline)?;
            orchestrator.add(&url).await?.has_failures()
        }

        Command::Push { book } => {
            config.validate()?;
            let orchestrator = build_orchestrator(&config, false)?;
            orchestrator.push(&target(book)).await?.has_failures()
        }

        Command::MarkCompleted { titles } => {
            config.validate()?;
            let orchestrator = build_orchestrator(&config, false)?;
            orchestrator.mark_completed(&titles).await?.has_failures()
        }

        Command::Info => {
            let archive = LocalArchive::new(&config.archive.dir);
            let books = archive.load_all().await?;
            let min = config.fetch.min_content_chars;

            log::info!("{} archived book(s)", books.len());
            for book in &books {
                log::info!(
                    "  {} by {} [{:?}]: {} chapters, {} filled, {} pending{}",
                    book.key(),
                    if book.author.is_empty() { "?" } else { book.author.as_str() },
                    book.status,
                    book.chapters.len(),
                    book.filled_count(min),
                    book.pending_count(min),
                    book.updated_at
                        .map(|t| format!(", updated {}", t.format("%Y-%m-%d %H:%M")))
                        .unwrap_or_default()
                );
            }
            false
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
            if config.remote.is_enabled() {
                config.remote.secret()?;
                log::info!("✓ Remote secret present in {}", config.remote.secret_env);
            }
            false
        }
    };

    if failed {
        log::error!("Finished with failures");
        std::process::exit(1);
    }

    log::info!("Done!");

    Ok(())
}

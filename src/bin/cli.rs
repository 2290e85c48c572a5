//! Migrator CLI
//!
//! Local execution entry point for every migration stage.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use migrator::{
    api::{BookStackClient, CmsApi, InMemoryCms, RetryPolicy, RetryingCms},
    error::{AppError, Result},
    models::{Config, ExportFormat, RemoteId, RunSummary, Topology},
    pipeline::{self, CancelToken, RunContext},
    services::{PatternExtractor, TopologyClassifier},
    storage::LocalStorage,
};

/// Migrator - wiki export to shelf/book/chapter/page CMS
#[derive(Parser, Debug)]
#[command(
    name = "migrator",
    version,
    about = "Migrates wiki space exports into a book-structured CMS"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "migrator.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Base API URL (overrides api.url)
    #[arg(long, env = "URL")]
    url: Option<String>,

    /// API token id (overrides api.token_id)
    #[arg(long, env = "ID")]
    token_id: Option<String>,

    /// API token secret (overrides api.token_secret)
    #[arg(long, env = "SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Directory holding the exports (overrides export.root)
    #[arg(long, env = "PATH_TO_HTML")]
    export_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify an HTML export without touching the remote
    Classify {
        /// Export folder name inside the export root
        export: String,
    },

    /// Import an HTML export
    Import {
        export: String,
        /// Run against an in-memory CMS instead of the remote
        #[arg(long)]
        dry_run: bool,
    },

    /// Import an entities.xml export
    XmlImport {
        export: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Upload the attachments recorded by a previous import
    Attach { export: String },

    /// Point attachment links at uploaded attachments
    FixLinks { export: String },

    /// Delete a shelf and all of its books
    RemoveShelf {
        /// Shelf id; lists shelves when omitted
        id: Option<RemoteId>,
    },

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Apply flag and environment overrides on top of the file values.
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(url) = &cli.url {
        config.api.url = url.clone();
    }
    if let Some(id) = &cli.token_id {
        config.api.token_id = id.clone();
    }
    if let Some(secret) = &cli.token_secret {
        config.api.token_secret = secret.clone();
    }
    if let Some(root) = &cli.export_root {
        config.export.root = root.clone();
    }
}

/// Real client behind the shared retry policy, or an in-memory CMS.
fn connect(config: &Config, dry_run: bool) -> Result<Arc<dyn CmsApi>> {
    if dry_run {
        log::info!("Dry run: nothing is sent to {}", config.api.url);
        return Ok(Arc::new(InMemoryCms::new()));
    }
    config.validate_remote()?;
    let client = BookStackClient::new(&config.api)?;
    Ok(Arc::new(RetryingCms::new(
        client,
        RetryPolicy::from_config(&config.retry),
    )))
}

/// Manifest store; dry runs write next to the real one.
fn manifest_store(config: &Config, dry_run: bool) -> LocalStorage {
    if dry_run {
        LocalStorage::new(config.storage.manifest_path.with_extension("dry-run.json"))
    } else {
        LocalStorage::new(&config.storage.manifest_path)
    }
}

/// Cancel the run on Ctrl-C; in-flight calls finish first.
fn cancel_on_ctrl_c() -> CancelToken {
    let token = CancelToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; finishing in-flight calls and stopping");
            handle.cancel();
        }
    });
    token
}

fn context(config: &Config, export: &str, cancel: &CancelToken) -> RunContext {
    RunContext::new(export, config.export_dir(export))
        .with_pacing(config.pacing.clone())
        .with_cancel(cancel.clone())
}

fn print_topology(topology: &Topology) {
    println!("Shelves ({}):", topology.shelves.len());
    for file in &topology.shelves {
        println!("  {file}");
    }
    println!("Books ({}):", topology.books.len());
    for file in &topology.books {
        println!("  {file}");
    }
    println!("Chapters ({}):", topology.chapters.len());
    for (file, entry) in &topology.chapters {
        println!(
            "  {file} (book {}, {} pages)",
            entry.book_previous_id,
            entry.page_filenames.len()
        );
    }
    println!("Pages in chapters: {}", topology.pages_in_chapters.len());
    println!("Pages in books: {}", topology.pages_in_books.len());
    if !topology.skipped.is_empty() {
        println!("Skipped (no breadcrumbs): {}", topology.skipped.len());
    }
    for chapter in &topology.dangling_chapters {
        println!("Missing chapter: {chapter}");
    }
}

fn print_summary(summary: &RunSummary) {
    println!("{}", summary.render());
    for (file, href) in &summary.unresolved_links {
        log::debug!("Unresolved link in {}: {}", file, href);
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    apply_overrides(&cli, &mut config);
    log::info!("Loaded configuration from {}", cli.config.display());

    match &cli.command {
        Command::Classify { export } => {
            let dir = config.export_dir(export);
            let topology = TopologyClassifier::new(&dir).classify()?;
            print_topology(&topology);
        }

        Command::Import { export, dry_run } => {
            let dir = config.export_dir(export);
            if ExportFormat::detect(&dir) == Some(ExportFormat::Xml) {
                log::warn!("{} contains entities.xml; consider xml-import", dir.display());
            }
            let api = connect(&config, *dry_run)?;
            let store = manifest_store(&config, *dry_run);
            let cancel = cancel_on_ctrl_c();
            let mut ctx = context(&config, export, &cancel);

            pipeline::run_import(api.as_ref(), &store, &mut ctx).await?;
            print_summary(&ctx.summary);
        }

        Command::XmlImport { export, dry_run } => {
            let api = connect(&config, *dry_run)?;
            let store = manifest_store(&config, *dry_run);
            let extractor = PatternExtractor::new()?;
            let cancel = cancel_on_ctrl_c();
            let mut ctx = context(&config, export, &cancel);

            pipeline::run_xml_import(
                api.as_ref(),
                &store,
                &extractor,
                config.export.xml_root_marker.as_deref(),
                &mut ctx,
            )
            .await?;
            print_summary(&ctx.summary);
        }

        Command::Attach { export } => {
            let api = connect(&config, false)?;
            let store = manifest_store(&config, false);
            let cancel = cancel_on_ctrl_c();
            let mut ctx = context(&config, export, &cancel);

            let report = pipeline::run_upload(
                api.as_ref(),
                &store,
                config.upload.max_file_bytes,
                &mut ctx,
            )
            .await?;
            println!(
                "Uploaded: {}, failed: {}, skipped: {} (no page: {}, missing: {}, too large: {})",
                report.uploaded,
                report.failed.len(),
                report.skipped(),
                report.skipped_no_page,
                report.skipped_missing,
                report.skipped_too_large
            );
            for failure in &report.failed {
                println!("  - {failure}");
            }
        }

        Command::FixLinks { export } => {
            let api = connect(&config, false)?;
            let store = manifest_store(&config, false);
            let cancel = cancel_on_ctrl_c();
            let mut ctx = context(&config, export, &cancel);

            let report = pipeline::run_fix_links(api.as_ref(), &store, &mut ctx).await?;
            println!(
                "Scanned {} pages, updated {}, fixed {} links ({} unmatched)",
                report.pages_scanned, report.pages_updated, report.links_fixed, report.unmatched
            );
        }

        Command::RemoveShelf { id } => {
            let api = connect(&config, false)?;
            let Some(id) = id else {
                for (id, name) in pipeline::list_shelves(api.as_ref()).await? {
                    println!("{id}\t{name}");
                }
                return Ok(());
            };
            let report = pipeline::remove_shelf(api.as_ref(), *id).await?;
            println!(
                "Deleted shelf {} and {} books",
                report.shelf, report.books_deleted
            );
            if !report.books_failed.is_empty() {
                return Err(AppError::validation(format!(
                    "Could not delete books {:?}",
                    report.books_failed
                )));
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            match config.validate_remote() {
                Ok(()) => log::info!("✓ Remote settings OK ({})", config.api.url),
                Err(e) => log::warn!("Remote settings incomplete: {}", e),
            }
            log::info!("Export root: {}", config.export.root.display());
        }
    }

    log::info!("Done!");

    Ok(())
}

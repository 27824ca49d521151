mod checkpoint;
mod config;
mod datapackage;
mod db;
mod extract;
mod fetch;
mod loader;
mod records;
mod sanitize;
mod scraper;
mod sources;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::Settings;
use crate::fetch::http::HttpSource;
use crate::fetch::Pagination;
use crate::scraper::{ScrapeOptions, ScrapeStats};
use crate::sources::{Fetcher, SourceConfig};

#[derive(Parser)]
#[command(name = "harvest", about = "Resumable directory scraper and CSV-to-SQLite loader")]
struct Cli {
    /// Settings file (default: $HARVEST_CONFIG or ./harvest.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a built-in source into CSV, resuming from its checkpoint
    Scrape {
        /// Source name (see `harvest sources`)
        source: String,
        /// Ignore any saved checkpoint and start at page 1
        #[arg(long)]
        fresh: bool,
        /// Page cap for numbered sources
        #[arg(short = 'n', long)]
        max_pages: Option<u32>,
        /// Output CSV (default: <data_dir>/<source>/<file>.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Sanitize a CSV and insert its rows into the database
    Load {
        csv: PathBuf,
        /// Take table and column options from this source's settings
        #[arg(short, long)]
        source: Option<String>,
        /// Destination table (default: source table or the file name)
        #[arg(short, long)]
        table: Option<String>,
        /// Column parsed as a plain integer (repeatable)
        #[arg(long)]
        numeric: Vec<String>,
        /// Column holding amounts like $2.5M or 500K (repeatable)
        #[arg(long)]
        shorthand: Vec<String>,
    },
    /// Refresh a source's datapackage.json from its CSV
    Datapackage { source: String },
    /// Check that the database can be opened
    Ping,
    /// List built-in sources
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    sources::check_overrides(&settings)?;

    let result = match cli.command {
        Commands::Scrape {
            source,
            fresh,
            max_pages,
            out,
        } => {
            let mut src = sources::resolve(&settings, &source)?;
            if let Some(n) = max_pages {
                match src.pagination {
                    Pagination::Numbered { .. } => src.pagination = Pagination::Numbered { max_pages: n.max(1) },
                    _ => warn!("--max-pages has no effect on {}", src.key),
                }
            }
            if let Some(out) = out {
                src.csv_path = out;
            }
            scrape(&settings, &src, fresh).await
        }
        Commands::Load {
            csv,
            source,
            table,
            numeric,
            shorthand,
        } => {
            let mut cfg = match source.as_deref() {
                Some(key) => sources::resolve(&settings, key)?.load,
                None => sources::load_for_file(&csv),
            };
            if let Some(table) = table {
                cfg.table = table;
            }
            if !numeric.is_empty() {
                cfg.numeric = numeric;
            }
            if !shorthand.is_empty() {
                cfg.shorthand = shorthand;
            }

            let conn = db::connect(&settings.db_path)?;
            let report = loader::load_csv(&conn, &csv, &cfg, settings.max_text_len, &settings.error_log)?;
            if report.rows_read == 0 {
                println!("No data");
            } else {
                println!(
                    "Inserted {} rows into {} ({} already present, table {}, {} rows total)",
                    report.stats.inserted,
                    cfg.table,
                    report.stats.duplicates,
                    if report.table_created { "created" } else { "existing" },
                    db::count_rows(&conn, &cfg.table)?,
                );
                if let Some(index) = report.stats.failed_at {
                    println!(
                        "Stopped at row {} of {}; see {:?}",
                        index,
                        report.rows_read,
                        settings.error_log
                    );
                }
            }
            Ok(())
        }
        Commands::Datapackage { source } => {
            let src = sources::resolve(&settings, &source)?;
            let (header, _) = loader::read_csv(&src.csv_path)?;
            datapackage::refresh(&src.datapackage_path(), &src.csv_path, &header, &src.package, &src.url)?;
            println!("Updated {:?}", src.datapackage_path());
            Ok(())
        }
        Commands::Ping => {
            let conn = db::connect(&settings.db_path)?;
            let one: i64 = conn.query_row("SELECT 1", [], |r| r.get(0))?;
            info!(result = one, "ping");
            println!("Connected to {:?}", settings.db_path);
            Ok(())
        }
        Commands::Sources => {
            println!(
                "{:<16} | {:<8} | {:<14} | {:<20} | {}",
                "Source", "Fetcher", "Pages", "Table", "URL"
            );
            println!("{}", "-".repeat(100));
            for p in sources::PRESETS {
                let src = sources::resolve(&settings, p.key)?;
                let fetcher = match src.fetcher {
                    Fetcher::Http => "http",
                    Fetcher::Browser => "browser",
                };
                let pages = match src.pagination {
                    Pagination::Single => "single".to_string(),
                    Pagination::Numbered { max_pages } => format!("1..{}", max_pages),
                    Pagination::NextControl => "follow next".to_string(),
                };
                println!(
                    "{:<16} | {:<8} | {:<14} | {:<20} | {}",
                    src.key, fetcher, pages, src.load.table, src.url
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn scrape(settings: &Settings, src: &SourceConfig, fresh: bool) -> anyhow::Result<()> {
    if let Some(dir) = src.csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    std::fs::create_dir_all(&src.dir).with_context(|| format!("Failed to create {:?}", src.dir))?;

    let store = CheckpointStore::new(src.checkpoint_path(), &src.csv_path);
    if fresh {
        store.clear()?;
    }
    let opts = ScrapeOptions {
        checkpoint_batch: settings.checkpoint_batch,
        page_delay: settings.page_delay(),
    };

    println!("Scraping {} from {}", src.key, src.url);
    let stats = match src.fetcher {
        Fetcher::Http => {
            let mut source = HttpSource::new(
                src.key,
                &src.url,
                src.paged_url.as_deref(),
                src.pagination,
                src.extractor,
                settings.request_timeout(),
                &settings.user_agent,
            )?;
            scraper::run(&mut source, &store, &opts).await?
        }
        Fetcher::Browser => scrape_in_browser(settings, src, &store, &opts).await?,
    };

    if stats.aborted {
        println!("{}: page could not be fetched, nothing written.", src.key);
        return Ok(());
    }
    println!(
        "Done: {} pages ({} failed), {} new records, {} total -> {:?}",
        stats.pages,
        stats.failed_pages,
        stats.new_records,
        stats.total_records,
        store.csv_path()
    );
    if !stats.completed {
        println!("Stopped before the last page; run again to resume from the checkpoint.");
    }

    refresh_datapackage(src, &stats);
    Ok(())
}

/// Descriptor problems never fail a scrape that already wrote its CSV.
fn refresh_datapackage(src: &SourceConfig, stats: &ScrapeStats) {
    if !src.csv_path.exists() {
        return;
    }
    if let Err(e) = datapackage::refresh(
        &src.datapackage_path(),
        &src.csv_path,
        &stats.header,
        &src.package,
        &src.url,
    ) {
        warn!("Could not update datapackage for {}: {:#}", src.key, e);
    }
}

#[cfg(feature = "browser")]
async fn scrape_in_browser(
    settings: &Settings,
    src: &SourceConfig,
    store: &CheckpointStore,
    opts: &ScrapeOptions,
) -> anyhow::Result<ScrapeStats> {
    use crate::fetch::browser::BrowserSource;

    let mut source = BrowserSource::open(
        src.key,
        &src.url,
        src.extractor,
        settings.browser_ws_url.as_deref(),
        settings.browser_settle(),
        settings.browser_wait(),
    )
    .await?;
    let result = scraper::run(&mut source, store, opts).await;
    source.close().await;
    result
}

#[cfg(not(feature = "browser"))]
async fn scrape_in_browser(
    _settings: &Settings,
    src: &SourceConfig,
    _store: &CheckpointStore,
    _opts: &ScrapeOptions,
) -> anyhow::Result<ScrapeStats> {
    anyhow::bail!("{} needs a browser; rebuild with `--features browser`", src.key)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

mod db;
mod error;
mod parser;
mod pipeline;
mod session;
mod settings;
mod urls;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use settings::Settings;

#[derive(Parser)]
#[command(name = "wishlist_scraper", about = "Wishlist scraper with price history")]
struct Cli {
    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// SQLite database path (overrides settings)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database tables
    Init,
    /// Scrape every uncommented wishlist URL (the default command)
    Run {
        /// File with one wishlist URL per line
        #[arg(short, long)]
        urls: Option<PathBuf>,
        /// Wait for Enter before extracting each wishlist
        #[arg(long)]
        pause: bool,
    },
    /// Show row counts
    Stats,
    /// Current products, optionally for one wishlist
    List {
        #[arg(short, long)]
        wishlist: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Current row and recorded history for one ASIN
    History { asin: String },
}

fn init_tracing(quiet: bool) {
    let filter = if quiet {
        tracing_subscriber::EnvFilter::new("error")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let t0 = Instant::now();
    let mut settings = Settings::load()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }

    let result = match cli.command.unwrap_or(Commands::Run {
        urls: None,
        pause: false,
    }) {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            println!("Schema ready at {:?}", settings.db_path);
            Ok(())
        }
        Commands::Run { urls, pause } => {
            if let Some(urls) = urls {
                settings.urls_file = urls;
            }
            run(&settings, pause, cli.quiet).await
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Products:    {}", s.products);
            println!("History:     {}", s.history);
            println!("Wishlists:   {}", s.wishlists);
            println!("Price drops: {}", s.price_drops);
            Ok(())
        }
        Commands::List { wishlist, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_products(&conn, wishlist.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No products found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<10} | {:<32} | {:>9} | {:>9} | {:>5} | {:<20}",
                "#", "ASIN", "Title", "Price", "Added at", "Drop", "Wishlist"
            );
            println!("{}", "-".repeat(106));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<10} | {:<32} | {:>9.2} | {:>9.2} | {:>4.0}% | {:<20}",
                    i + 1,
                    r.asin.as_deref().unwrap_or("-"),
                    truncate(&r.title, 32),
                    r.price,
                    r.price_added,
                    r.price_drop_percent * 100.0,
                    truncate(&r.wishlist_name, 20),
                );
            }
            println!("\n{} products", rows.len());
            Ok(())
        }
        Commands::History { asin } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let Some(current) = db::fetch_product(&conn, &asin)? else {
                println!("No product with ASIN {}.", asin);
                return Ok(());
            };
            println!("{} ({})", current.title, asin);
            println!("{:<24} | {:>9} | {:<22} | {:>7}", "Updated at", "Price", "Stock", "Reviews");
            println!("{}", "-".repeat(72));
            for h in db::fetch_history(&conn, &asin)? {
                println!(
                    "{:<24} | {:>9.2} | {:<22} | {:>7}",
                    h.updated_at, h.record.price, h.record.stock_status, h.record.reviews
                );
            }
            println!(
                "{:<24} | {:>9.2} | {:<22} | {:>7}",
                "current", current.price, current.stock_status, current.reviews
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 && !cli.quiet {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Scrape each pending wishlist in turn. Only an unreadable URL list is fatal.
async fn run(settings: &Settings, pause: bool, quiet: bool) -> anyhow::Result<()> {
    let pending = urls::pending_urls(&settings.urls_file)?;
    if pending.is_empty() {
        println!("No pending wishlist URLs in {:?}.", settings.urls_file);
        return Ok(());
    }

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    info!("Connected to database {:?}.", settings.db_path);
    let mut store = db::SqliteStore::new(conn);

    let mut session = session::Session::new(settings)?;
    let mut gate = session::StdinGate;
    if let Err(e) = session.load_cookies() {
        error!("Could not load cookies: {:#}", e);
    }

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(pending.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} wishlists")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );

    let mut done = 0usize;
    for address in &pending {
        info!("Processing wishlist: {}", address);
        let outcome =
            pipeline::scrape_wishlist(&mut session, &mut store, &mut gate, settings, address, pause)
                .await;
        match outcome {
            Ok(summary) => {
                info!(
                    "Finished {} ({}): {} pages, {} items, {} new, {} updated, {} skipped, {} failed",
                    address,
                    summary.name,
                    summary.pages,
                    summary.totals.items,
                    summary.totals.inserted,
                    summary.totals.updated,
                    summary.totals.skipped,
                    summary.totals.failed,
                );
                if summary.complete {
                    match urls::mark_scraped(&settings.urls_file, address) {
                        Ok(()) => done += 1,
                        Err(e) => error!("Error marking URL as scraped: {:#}", e),
                    }
                } else {
                    error!("Wishlist {} stopped early; it will be retried next run.", address);
                }
            }
            Err(e) => error!("{}. Skipping.", e),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if !quiet {
        println!("Scraped {} of {} wishlists.", done, pending.len());
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
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

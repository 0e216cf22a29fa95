//! CLI entry point for the bookdex tool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use bookdex::catalog::{CatalogCache, CatalogQuery, CatalogQueryService, HistoryLog, QueryFilters};
use bookdex::config::load_config;
use bookdex::scrape::RunStatus;
use bookdex::{HttpFetcher, RunOptions, ScrapeService};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Scrape {
            base_url,
            max_retries,
            page_delay,
        } => {
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            if let Some(max_retries) = max_retries {
                config.max_retries = u32::from(max_retries);
            }
            config.validate()?;

            info!(base_url = %config.base_url, "Bookdex scrape starting");
            let fetcher = Arc::new(HttpFetcher::with_timeout(Duration::from_secs(
                config.timeout_secs,
            )));
            let store_path = config.store_path();
            let service = ScrapeService::new(fetcher, config);
            let options = RunOptions {
                page_delay: page_delay.map(Duration::from_millis),
                store_filename: None,
            };
            let run = service.run_to_completion(options).await?;

            for error in &run.errors {
                println!("page error: {} ({})", error.page, error.reason);
            }
            println!(
                "run {}: {} - {} books across {} categories, {} page errors",
                run.id,
                run.status,
                run.books_scraped,
                run.categories_visited,
                run.errors.len()
            );
            if run.status == RunStatus::Failed {
                bail!("scrape run {} failed", run.id);
            }
            println!("store written to {}", store_path.display());
        }

        Command::History { summary } => {
            let history = HistoryLog::new(config.history_path());
            if summary {
                let totals = history.summary()?;
                println!("total runs:    {}", totals.total_runs);
                println!("completed:     {}", totals.completed_runs);
                println!("failed:        {}", totals.failed_runs);
                println!("books scraped: {}", totals.total_books_scraped);
                if let Some(latest) = totals.latest {
                    println!(
                        "latest:        {} ({}, {} books)",
                        latest.run_id, latest.status, latest.books_scraped
                    );
                }
            } else {
                let runs = history.read_all()?;
                if runs.is_empty() {
                    println!("no runs recorded in {}", history.path().display());
                    return Ok(());
                }
                for run in runs {
                    println!(
                        "{}  {}  {:>9}  {:>5} books  {:>3} categories  {:>3} errors",
                        run.run_id,
                        run.started_at.to_rfc3339(),
                        run.status,
                        run.books_scraped,
                        run.categories_visited,
                        run.error_count
                    );
                }
            }
        }

        Command::Query {
            category,
            title,
            min_price,
            max_price,
            min_rating,
            sort,
            desc,
            page,
            limit,
            json,
        } => {
            let cache = Arc::new(CatalogCache::new(config.store_path()));
            let service = CatalogQueryService::new(cache);
            let query = CatalogQuery {
                filters: QueryFilters {
                    category,
                    title_contains: title,
                    min_price,
                    max_price,
                    min_rating,
                },
                sort: sort.into(),
                order: cli::sort_order(desc),
                page: page as usize,
                limit: usize::from(limit),
            };
            let result = service.query(&query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for book in &result.items {
                    println!(
                        "{:>4}  {}  {}  {}/5  [{}]",
                        book.id, book.price_display, book.title, book.rating.as_numeric(), book.category
                    );
                }
                println!(
                    "page {} of {} matching records{}",
                    result.page,
                    result.total_count,
                    if result.has_next { " (more available)" } else { "" }
                );
            }
        }
    }

    Ok(())
}

//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use bookdex::catalog::{SortField, SortOrder};

/// Scrape a book catalog site and query the results.
///
/// Bookdex walks every category and listing page of a paginated book catalog,
/// exports the records to a CSV store with a per-run history log, and serves
/// the store back through filtered, sorted, paginated queries.
#[derive(Parser, Debug)]
#[command(name = "bookdex")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a config file (default: $XDG_CONFIG_HOME/bookdex/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full catalog scrape and export the store
    Scrape {
        /// Catalog index URL to start from (overrides config)
        #[arg(long)]
        base_url: Option<String>,

        /// Retry budget per page for transient failures (0-10)
        #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
        max_retries: Option<u8>,

        /// Delay between page fetches in milliseconds (0 to disable, max 60000)
        #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
        page_delay: Option<u64>,
    },

    /// Show past runs from the history log
    History {
        /// Print aggregate counts instead of the run list
        #[arg(long)]
        summary: bool,
    },

    /// Query the exported catalog
    Query {
        /// Only records in this category (case-insensitive exact match)
        #[arg(short = 'c', long)]
        category: Option<String>,

        /// Only records whose title contains this text (case-insensitive)
        #[arg(short = 't', long)]
        title: Option<String>,

        /// Inclusive lower price bound
        #[arg(long)]
        min_price: Option<f64>,

        /// Inclusive upper price bound
        #[arg(long)]
        max_price: Option<f64>,

        /// Minimum star rating (1-5)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        min_rating: Option<u8>,

        /// Field to sort by
        #[arg(short = 's', long, value_enum, default_value_t = SortArg::Title)]
        sort: SortArg,

        /// Sort descending instead of ascending
        #[arg(long)]
        desc: bool,

        /// Page number (1-indexed)
        #[arg(short = 'p', long, default_value_t = 1)]
        page: u32,

        /// Records per page (1-100)
        #[arg(short = 'n', long, default_value_t = 20, value_parser = clap::value_parser!(u8).range(1..=100))]
        limit: u8,

        /// Emit results as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// CLI spelling of the sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Title,
    Price,
    Rating,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Title => Self::Title,
            SortArg::Price => Self::Price,
            SortArg::Rating => Self::Rating,
        }
    }
}

/// Maps the `--desc` flag onto the query order.
#[must_use]
pub fn sort_order(desc: bool) -> SortOrder {
    if desc { SortOrder::Desc } else { SortOrder::Asc }
}

//! CLI argument definitions using clap
//!
//! Commands:
//! - manifestdb init | save | get | update | delete
//! - manifestdb list | search
//! - manifestdb usage | cleanup
//! - manifestdb backup | backups | restore | export | import
//! - manifestdb monitor

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// manifestdb - local record store for scanned flight manifests
#[derive(Parser, Debug)]
#[command(name = "manifestdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./manifestdb.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory layout
    Init,

    /// Store the JSON object read from stdin as a new record
    Save,

    /// Print one record
    Get {
        #[arg(long)]
        id: String,
    },

    /// Replace a record's payload with the JSON object read from stdin
    Update {
        #[arg(long)]
        id: String,
    },

    /// Delete one record
    Delete {
        #[arg(long)]
        id: String,
    },

    /// List records newest first, one page at a time
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        page_size: usize,

        /// Created at or after (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// Created at or before (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        to: Option<String>,
    },

    /// Filter records by payload fields
    Search {
        /// `name=substring`, repeatable; all must match
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Payload field holding a date, bounded by --from/--to
        #[arg(long)]
        date_field: Option<String>,

        #[command(flatten)]
        date_bounds: DateBounds,
    },

    /// Show usage and backup statistics
    Usage,

    /// Run one check-and-evict pass now
    Cleanup,

    /// Take a backup now
    Backup,

    /// List backups newest first
    Backups,

    /// Restore a backup into the store
    Restore {
        #[arg(long)]
        key: String,

        #[command(flatten)]
        merge: MergeArgs,
    },

    /// Print a snapshot of the whole store
    Export,

    /// Import a snapshot read from stdin
    Import {
        #[command(flatten)]
        merge: MergeArgs,
    },

    /// Run the monitor and backup timers, printing events as JSON lines
    Monitor {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct DateBounds {
    #[arg(long)]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct MergeArgs {
    /// Empty the store before importing
    #[arg(long)]
    pub clear_existing: bool,

    /// Overwrite records whose id already exists
    #[arg(long)]
    pub overwrite: bool,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, needle)) if !name.is_empty() => Ok((name.to_string(), needle.to_string())),
        _ => Err(format!("expected name=substring, got '{}'", raw)),
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

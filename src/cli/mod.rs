//! CLI module for manifestdb
//!
//! Provides command-line interface for:
//! - init: Create the data directory layout
//! - save/get/update/delete: Single-record operations
//! - list/search: Paginated and filtered reads
//! - usage/cleanup: Capacity status and on-demand eviction
//! - backup/backups/restore/export/import: Snapshots
//! - monitor: Run the background timers in the foreground

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, DateBounds, MergeArgs};
pub use commands::{run, run_command, Config};
pub use errors::{CliError, CliResult};
pub use io::{read_request, write_error, write_response};

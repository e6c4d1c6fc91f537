//! JSON I/O handling for CLI
//!
//! - Input: a JSON document on stdin
//! - Output: one JSON object per line on stdout
//! - UTF-8 only

use std::io::{self, BufRead, Read, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::events::StorageEvent;

/// Read a single-line JSON request from stdin
pub fn read_request() -> CliResult<Value> {
    let stdin = io::stdin();
    let mut line = String::new();

    stdin.lock().read_line(&mut line)?;

    if line.trim().is_empty() {
        return Err(CliError::invalid_input("Empty input"));
    }

    let value: Value = serde_json::from_str(&line)?;
    Ok(value)
}

/// Read all of stdin, e.g. a pretty-printed snapshot
pub fn read_document() -> CliResult<String> {
    let mut blob = String::new();
    io::stdin().lock().read_to_string(&mut blob)?;

    if blob.trim().is_empty() {
        return Err(CliError::invalid_input("Empty input"));
    }
    Ok(blob)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    }))
}

/// Write one storage event as a JSON line
pub fn write_event(event: &StorageEvent) -> CliResult<()> {
    write_line(&serde_json::to_value(event)?)
}

fn write_line(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

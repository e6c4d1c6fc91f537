//! CLI command implementations
//!
//! Every command loads the configuration, opens the data directory and
//! returns the JSON `data` of its response. `run` wraps that value (or the
//! error) in the `{"status": ..}` envelope on stdout.
//!
//! Only `monitor` starts the background timers; one-shot commands build the
//! manager on a scheduler that never fires.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backup::FileBackupRepository;
use crate::clock::SystemClock;
use crate::config::ManagerConfig;
use crate::events::ListenerError;
use crate::manager::StorageManager;
use crate::observability::{Logger, Severity};
use crate::query::{parse_date, DateFilter, SearchCriteria};
use crate::scheduler::{ManualScheduler, Scheduler, TokioScheduler};
use crate::store::{DateRange, FileBackend, RecordStore, RestoreOptions, StoreError};
use crate::usage::{DirectoryQuota, FixedQuota, UsageEstimator};

use super::args::{Cli, Command, DateBounds, MergeArgs};
use super::errors::{CliError, CliResult};
use super::io::{read_document, read_request, write_error, write_event, write_response};

const RECORD_DIR: &str = "records";

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (required)
    pub data_dir: String,

    /// Storage quota in bytes (optional, default 50MB)
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,

    /// Measure usage as bytes on disk instead of serialized record size
    #[serde(default)]
    pub measure_disk: bool,

    /// Minimum log severity (optional, default "error")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Capacity and backup settings
    #[serde(default)]
    pub manager: ManagerConfig,
}

fn default_quota_bytes() -> u64 {
    52_428_800
} // 50MB
fn default_log_level() -> String {
    "error".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }
        if self.quota_bytes == 0 {
            return Err(CliError::config_error("quota_bytes must be > 0"));
        }
        self.severity()?;
        self.manager.validate()?;
        Ok(())
    }

    fn severity(&self) -> CliResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            CliError::config_error(format!("Invalid log_level: '{}'", self.log_level))
        })
    }

    /// Get data directory as Path
    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }
}

/// Main CLI entry point
///
/// Parses arguments, runs the command and prints the response envelope.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    match run_command(&cli.config, cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code(), &e.to_string())?;
            Err(e)
        }
    }
}

/// Run one command; stdin is read only by commands that take a body
pub fn run_command(config_path: &Path, cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Init => init(config_path),
        Command::Save => save(config_path, read_request()?),
        Command::Get { id } => get(config_path, &id),
        Command::Update { id } => update(config_path, &id, read_request()?),
        Command::Delete { id } => delete(config_path, &id),
        Command::List {
            page,
            page_size,
            from,
            to,
        } => list(config_path, page, page_size, from.as_deref(), to.as_deref()),
        Command::Search {
            fields,
            date_field,
            date_bounds,
        } => search(config_path, fields, date_field, date_bounds),
        Command::Usage => usage(config_path),
        Command::Cleanup => cleanup(config_path),
        Command::Backup => backup(config_path),
        Command::Backups => backups(config_path),
        Command::Restore { key, merge } => restore(config_path, &key, merge),
        Command::Export => export(config_path),
        Command::Import { merge } => import(config_path, &read_document()?, merge),
        Command::Monitor { duration_secs } => {
            monitor(config_path, duration_secs.map(Duration::from_secs))
        }
    }
}

/// Create the data directory layout
pub fn init(config_path: &Path) -> CliResult<Value> {
    let config = Config::load(config_path)?;
    let data_dir = config.data_path();

    if is_initialized(data_dir) {
        return Err(CliError::AlreadyInitialized);
    }

    // Both open() calls create their directories.
    FileBackend::open(data_dir)?;
    FileBackupRepository::open(data_dir)?;

    Ok(json!({"initialized": true, "data_dir": config.data_dir}))
}

/// Store a new record
pub fn save(config_path: &Path, payload: Value) -> CliResult<Value> {
    let manager = open(config_path)?;
    let id = manager.store().save(require_object(payload)?)?;
    Ok(json!({ "id": id }))
}

pub fn get(config_path: &Path, id: &str) -> CliResult<Value> {
    let manager = open(config_path)?;
    let record = manager
        .store()
        .get(id)?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    Ok(serde_json::to_value(record)?)
}

/// Replace a record's payload
pub fn update(config_path: &Path, id: &str, payload: Value) -> CliResult<Value> {
    let manager = open(config_path)?;
    manager.store().update(id, require_object(payload)?)?;
    Ok(json!({ "updated": id }))
}

pub fn delete(config_path: &Path, id: &str) -> CliResult<Value> {
    let manager = open(config_path)?;
    manager.store().delete(id)?;
    Ok(json!({ "deleted": id }))
}

/// One page of records, newest first
pub fn list(
    config_path: &Path,
    page: usize,
    page_size: usize,
    from: Option<&str>,
    to: Option<&str>,
) -> CliResult<Value> {
    let manager = open(config_path)?;
    let range = match (from, to) {
        (None, None) => None,
        _ => Some(DateRange::new(date_arg(from, false)?, date_arg(to, true)?)),
    };
    let page = manager.query().get_paginated(page, page_size, range.as_ref())?;
    Ok(serde_json::to_value(page)?)
}

/// Records matching every field filter and the optional date range
pub fn search(
    config_path: &Path,
    fields: Vec<(String, String)>,
    date_field: Option<String>,
    bounds: DateBounds,
) -> CliResult<Value> {
    let mut criteria = SearchCriteria::new();
    for (name, needle) in fields {
        criteria = criteria.field(name, needle);
    }
    match date_field {
        Some(field) => {
            criteria = criteria.date(DateFilter::parse(
                field,
                bounds.from.as_deref(),
                bounds.to.as_deref(),
            )?);
        }
        None if bounds.from.is_some() || bounds.to.is_some() => {
            return Err(CliError::invalid_input("--from/--to need --date-field"));
        }
        None => {}
    }

    let manager = open(config_path)?;
    let records = manager.query().search(&criteria)?;
    Ok(json!({ "count": records.len(), "records": records }))
}

/// Usage, bounds and backup statistics
pub fn usage(config_path: &Path) -> CliResult<Value> {
    let manager = open(config_path)?;
    Ok(serde_json::to_value(manager.storage_stats()?)?)
}

/// One eviction pass now
pub fn cleanup(config_path: &Path) -> CliResult<Value> {
    let manager = open(config_path)?;
    Ok(serde_json::to_value(manager.force_cleanup()?)?)
}

/// Backup now (prunes expired backups too)
pub fn backup(config_path: &Path) -> CliResult<Value> {
    let manager = open(config_path)?;
    let key = manager.backups().perform_auto_backup()?;
    Ok(json!({ "key": key }))
}

pub fn backups(config_path: &Path) -> CliResult<Value> {
    let manager = open(config_path)?;
    Ok(serde_json::to_value(manager.backups().get_available_backups()?)?)
}

pub fn restore(config_path: &Path, key: &str, merge: MergeArgs) -> CliResult<Value> {
    let manager = open(config_path)?;
    let report = manager
        .backups()
        .restore_from_backup(key, restore_options(merge))?;
    Ok(serde_json::to_value(report)?)
}

/// Whole-store snapshot, in backup format
pub fn export(config_path: &Path) -> CliResult<Value> {
    let manager = open(config_path)?;
    Ok(serde_json::to_value(manager.store().export_snapshot()?)?)
}

/// Import a snapshot blob
pub fn import(config_path: &Path, blob: &str, merge: MergeArgs) -> CliResult<Value> {
    let manager = open(config_path)?;
    let report = manager.store().import_json(blob, restore_options(merge))?;
    Ok(serde_json::to_value(report)?)
}

/// Run the background timers until Ctrl-C or `duration` elapses, printing
/// every event as a JSON line. Returns the final statistics.
pub fn monitor(config_path: &Path, duration: Option<Duration>) -> CliResult<Value> {
    let config = Config::load(config_path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let scheduler = Arc::new(TokioScheduler::new(tokio::runtime::Handle::current()));
        let manager = open_manager(&config, scheduler)?;
        manager.add_listener(|event| {
            write_event(event).map_err(|e| ListenerError(e.to_string()))
        });

        manager.start()?;
        match duration {
            Some(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => tokio::signal::ctrl_c().await?,
        }
        manager.stop()?;

        Ok::<Value, CliError>(json!({ "stopped": true, "stats": manager.storage_stats()? }))
    })
}

fn open(config_path: &Path) -> CliResult<StorageManager> {
    let config = Config::load(config_path)?;
    open_manager(&config, Arc::new(ManualScheduler::new()))
}

fn open_manager(config: &Config, scheduler: Arc<dyn Scheduler>) -> CliResult<StorageManager> {
    Logger::set_min_severity(config.severity()?);

    let data_dir = config.data_path();
    if !is_initialized(data_dir) {
        return Err(CliError::NotInitialized);
    }

    let store = Arc::new(RecordStore::open(
        Box::new(FileBackend::open(data_dir)?),
        Arc::new(SystemClock),
    )?);
    let usage = UsageEstimator::new(Arc::clone(&store));
    let usage = if config.measure_disk {
        usage.with_quota_provider(DirectoryQuota::new(records_dir(data_dir), config.quota_bytes))
    } else {
        usage.with_quota_provider(FixedQuota::new(config.quota_bytes))
    };
    let repository = Arc::new(FileBackupRepository::open(data_dir)?);

    Ok(StorageManager::new(
        store,
        usage,
        repository,
        scheduler,
        config.manager.clone(),
    )?)
}

fn records_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(RECORD_DIR)
}

/// Check if data directory is initialized
fn is_initialized(data_dir: &Path) -> bool {
    records_dir(data_dir).is_dir()
}

fn require_object(payload: Value) -> CliResult<Value> {
    if payload.is_object() {
        Ok(payload)
    } else {
        Err(CliError::invalid_input("Record payload must be a JSON object"))
    }
}

fn date_arg(raw: Option<&str>, end_of_day: bool) -> CliResult<Option<chrono::DateTime<chrono::Utc>>> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_date(raw, end_of_day)
            .map(Some)
            .ok_or_else(|| CliError::invalid_input(format!("Invalid date: '{}'", raw))),
    }
}

fn restore_options(merge: MergeArgs) -> RestoreOptions {
    RestoreOptions {
        clear_existing: merge.clear_existing,
        skip_duplicates: !merge.overwrite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_config(temp_dir: &TempDir, extra: Value) -> PathBuf {
        let config_path = temp_dir.path().join("manifestdb.json");
        let data_dir = temp_dir.path().join("data");

        let mut config = json!({
            "data_dir": data_dir.to_string_lossy()
        });
        if let (Some(config), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            config.extend(extra.clone());
        }

        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    fn initialized() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, json!({}));
        init(&config_path).unwrap();
        (temp_dir, config_path)
    }

    #[test]
    fn test_init_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, json!({}));
        let data_dir = temp_dir.path().join("data");

        init(&config_path).unwrap();

        assert!(data_dir.join("records").is_dir());
        assert!(data_dir.join("backups").is_dir());
    }

    #[test]
    fn test_init_refuses_reinit() {
        let (_temp, config_path) = initialized();
        let err = init(&config_path).unwrap_err();
        assert_eq!(err.code(), "MDB_CLI_ALREADY_INITIALIZED");
    }

    #[test]
    fn test_commands_require_init() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, json!({}));

        let err = usage(&config_path).unwrap_err();
        assert_eq!(err.code(), "MDB_CLI_NOT_INITIALIZED");
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(&temp_dir, json!({}));

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.quota_bytes, 52_428_800);
        assert!(!config.measure_disk);
        assert_eq!(config.log_level, "error");
        assert_eq!(config.manager, ManagerConfig::default());
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();

        let config_path = create_config(&temp_dir, json!({"log_level": "chatty"}));
        assert!(Config::load(&config_path).is_err());

        let config_path = create_config(&temp_dir, json!({"quota_bytes": 0}));
        assert!(Config::load(&config_path).is_err());

        let config_path = create_config(
            &temp_dir,
            json!({"manager": {"capacity": {"cleanup_threshold": 50, "target_usage": 60}}}),
        );
        let err = Config::load(&config_path).unwrap_err();
        assert_eq!(err.code(), "MDB_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_record_commands() {
        let (_temp, config_path) = initialized();

        let saved = save(&config_path, json!({"flightNumber": "LX318", "passengerName": "Ada Lovelace"}))
            .unwrap();
        let id = saved["id"].as_str().unwrap().to_string();

        let record = get(&config_path, &id).unwrap();
        assert_eq!(record["data"]["flightNumber"], "LX318");

        update(&config_path, &id, json!({"flightNumber": "LX319"})).unwrap();
        let record = get(&config_path, &id).unwrap();
        assert_eq!(record["data"]["flightNumber"], "LX319");

        let page = list(&config_path, 1, 10, None, None).unwrap();
        assert_eq!(page["total_count"], 1);

        let found = search(
            &config_path,
            vec![("flightNumber".into(), "lx3".into())],
            None,
            DateBounds::default(),
        )
        .unwrap();
        assert_eq!(found["count"], 1);

        delete(&config_path, &id).unwrap();
        let err = get(&config_path, &id).unwrap_err();
        assert_eq!(err.code(), "MDB_STORE_NOT_FOUND");
    }

    #[test]
    fn test_save_rejects_non_object() {
        let (_temp, config_path) = initialized();
        let err = save(&config_path, json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.code(), "MDB_CLI_INVALID_INPUT");
    }

    #[test]
    fn test_search_bounds_need_field() {
        let (_temp, config_path) = initialized();
        let err = search(
            &config_path,
            vec![],
            None,
            DateBounds {
                from: Some("2026-01-01".into()),
                to: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "MDB_CLI_INVALID_INPUT");
    }

    #[test]
    fn test_backup_restore_commands() {
        let (_temp, config_path) = initialized();
        for flight in ["AY1", "AY2", "AY3"] {
            save(&config_path, json!({ "flightNumber": flight })).unwrap();
        }

        let key = backup(&config_path).unwrap()["key"].as_str().unwrap().to_string();
        let listed = backups(&config_path).unwrap();
        assert_eq!(listed[0]["key"], key.as_str());

        let report = restore(&config_path, &key, MergeArgs::default()).unwrap();
        assert_eq!(report["imported"], 0);
        assert_eq!(report["skipped"], 3);

        let err = restore(&config_path, "autobackup_1", MergeArgs::default()).unwrap_err();
        assert_eq!(err.code(), "MDB_BACKUP_NOT_FOUND");
    }

    #[test]
    fn test_export_import_between_directories() {
        let (_a, source) = initialized();
        save(&source, json!({"flightNumber": "TP200"})).unwrap();
        save(&source, json!({"flightNumber": "TP201"})).unwrap();
        let snapshot = export(&source).unwrap();
        assert_eq!(snapshot["count"], 2);

        let (_b, target) = initialized();
        let report = import(&target, &snapshot.to_string(), MergeArgs::default()).unwrap();
        assert_eq!(report["imported"], 2);
        assert_eq!(list(&target, 1, 10, None, None).unwrap()["total_count"], 2);
    }

    #[test]
    fn test_cleanup_command_evicts() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_config(
            &temp_dir,
            json!({
                "quota_bytes": 400,
                "manager": {"capacity": {"min_retain_count": 1}}
            }),
        );
        init(&config_path).unwrap();
        for n in 0..6 {
            save(&config_path, json!({ "seq": n, "note": "padding to make each record heavier" }))
                .unwrap();
        }

        let report = cleanup(&config_path).unwrap();
        assert_eq!(report["cleanup_performed"], true);
        assert!(report["deleted_count"].as_u64().unwrap() >= 1);
        assert!(report["new_usage_percentage"].as_f64().unwrap() <= 70.0);
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::{AppError, AppResult};
use crate::models::SubscriptionState;

const DATA_DIR: &str = ".genie_match";
const DATA_DIR_ENV: &str = "GENIE_DATA_DIR";

/// Fixed key of the single persisted subscription record
pub const STORAGE_KEY: &str = "genie_subscription";

/// Data directory, created on demand. `GENIE_DATA_DIR` overrides `~/.genie_match`.
pub fn get_data_dir() -> AppResult<PathBuf> {
    let data_dir = match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => dirs::home_dir()
            .ok_or_else(|| AppError::Config("cannot resolve home directory".to_string()))?
            .join(DATA_DIR),
    };

    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)?;
    }

    Ok(data_dir)
}

/// Persistence slot for the caller's subscription record.
///
/// A missing or malformed record loads as `None`; the quota engine then
/// falls back to free defaults. Writes are last-writer-wins.
pub trait QuotaStore: Send + Sync {
    fn load(&self) -> Option<SubscriptionState>;
    fn save(&self, state: &SubscriptionState) -> AppResult<()>;
}

fn parse_record(raw: &str, source: &str) -> Option<SubscriptionState> {
    match serde_json::from_str::<SubscriptionState>(raw) {
        Ok(state) => Some(state),
        Err(e) => {
            crate::modules::logger::log_warn(&format!(
                "Ignoring malformed subscription record in {}: {}",
                source, e
            ));
            None
        }
    }
}

/// JSON file store: `<dir>/genie_subscription.json`
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
            write_lock: Mutex::new(()),
        }
    }

    /// Store inside the application data directory
    pub fn in_data_dir() -> AppResult<Self> {
        Ok(Self::new(get_data_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QuotaStore for JsonFileStore {
    fn load(&self) -> Option<SubscriptionState> {
        if !self.path.exists() {
            return None;
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => parse_record(&content, &self.path.display().to_string()),
            Err(e) => {
                crate::modules::logger::log_warn(&format!(
                    "Failed to read subscription record {}: {}",
                    self.path.display(),
                    e
                ));
                None
            }
        }
    }

    /// Atomic write: temp file then rename
    fn save(&self, state: &SubscriptionState) -> AppResult<()> {
        let _lock = self
            .write_lock
            .lock()
            .map_err(|e| AppError::Store(format!("lock poisoned: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(state)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// In-memory store holding the raw serialized record
#[derive(Default)]
pub struct MemoryStore {
    raw: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with arbitrary text, e.g. a corrupted record
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: RwLock::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.read().ok().and_then(|guard| guard.clone())
    }
}

impl QuotaStore for MemoryStore {
    fn load(&self) -> Option<SubscriptionState> {
        let raw = self.raw()?;
        parse_record(&raw, "memory store")
    }

    fn save(&self, state: &SubscriptionState) -> AppResult<()> {
        let content = serde_json::to_string(state)?;
        let mut guard = self
            .raw
            .write()
            .map_err(|e| AppError::Store(format!("lock poisoned: {}", e)))?;
        *guard = Some(content);
        Ok(())
    }
}

//! Hour-bucketed fallback cache for the last known-good snapshot
//!
//! The cache survives network blips of seconds to minutes without serving
//! data across an hour boundary, where the upstream metric resets.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::StorageError;
use super::types::Snapshot;

/// Store key holding the JSON-serialised snapshot
pub const CACHE_KEY: &str = "cookie_data_cache";
/// Store key holding the hour bucket the snapshot was written in
pub const CACHE_HOUR_KEY: &str = "cookie_data_hour";

/// Format a wall-clock time as its hour bucket (`YYYY-MM-DD-HH`)
pub fn hour_bucket<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%Y-%m-%d-%H").to_string()
}

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// [`Clock`] backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Local> {
        (**self).now()
    }
}

/// Minimal persistent key-value capability
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;

    /// Write several entries; stores that can persist them in one step should override this
    fn set_many(&mut self, entries: Vec<(&str, String)>) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// In-memory [`KeyValueStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// [`KeyValueStore`] persisted as a single JSON object on disk
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Opened cache store at {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    /// Open the store, falling back to an empty store if the file is unreadable
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!("Cache store at {} unreadable, starting empty: {}", path.display(), e);
                Self {
                    path,
                    entries: HashMap::new(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let contents = serde_json::to_string(&self.entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn set_many(&mut self, entries: Vec<(&str, String)>) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.entries.insert(key.to_string(), value);
        }
        self.flush()
    }
}

/// Last known-good snapshot, valid only within the hour it was written
///
/// Bucket and payload are always read and written together under one lock.
pub struct HourlyCache<S, C = SystemClock> {
    store: Mutex<S>,
    clock: C,
}

impl<S: KeyValueStore> HourlyCache<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: KeyValueStore, C: Clock> HourlyCache<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store: Mutex::new(store),
            clock,
        }
    }

    /// Hour bucket for the clock's current time
    pub fn current_hour_bucket(&self) -> String {
        hour_bucket(&self.clock.now())
    }

    /// Cached snapshot, if one was written during the current hour
    pub fn get(&self) -> Option<Snapshot> {
        let current = self.current_hour_bucket();

        let read = {
            let store = self.store.lock();
            store
                .get(CACHE_HOUR_KEY)
                .and_then(|bucket| Ok((bucket, store.get(CACHE_KEY)?)))
        };

        let (bucket, payload) = match read {
            Ok((Some(bucket), Some(payload))) => (bucket, payload),
            Ok(_) => return None,
            Err(e) => {
                warn!("Error loading cached data: {}", e);
                return None;
            }
        };

        if bucket != current {
            debug!("Cached snapshot from {} expired (now {})", bucket, current);
            return None;
        }

        match serde_json::from_str(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Error decoding cached data: {}", e);
                None
            }
        }
    }

    /// Store `snapshot` tagged with the current hour bucket
    pub fn set(&self, snapshot: &Snapshot) {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Error serialising snapshot for cache: {}", e);
                return;
            }
        };
        let bucket = self.current_hour_bucket();

        let mut store = self.store.lock();
        if let Err(e) = store.set_many(vec![(CACHE_KEY, payload), (CACHE_HOUR_KEY, bucket)]) {
            warn!("Error saving cached data: {}", e);
        }
    }
}

/// Settable [`Clock`] for tests
#[cfg(test)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(local_time(year, month, day, hour, minute)),
        })
    }

    pub(crate) fn set(&self, year: i32, month: u32, day: u32, hour: u32, minute: u32) {
        *self.now.lock() = local_time(year, month, day, hour, minute);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock()
    }
}

#[cfg(test)]
fn local_time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .earliest()
        .expect("valid local time")
}

/// Durable per-market escalation state.
///
/// The escalation engine reads and writes state only through
/// `AlertStateStore`, so production uses a JSON file and tests use an
/// in-memory map.
///
/// On-disk layout:
///
/// ```json
/// {
///   "markets": {
///     "DFW": { "last_level": "plan_for_it", "episode_id": "2026-04-27-day1", "sent_at": "..." }
///   },
///   "last_run": "2026-04-27T20:00:00Z"
/// }
/// ```

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::logging::{log_state_failure, DataSource};
use crate::model::{AlertRecord, StateError};

// ---------------------------------------------------------------------------
// Store capability
// ---------------------------------------------------------------------------

pub trait AlertStateStore {
    /// Last record delivered for `market`, if any.
    fn get(&self, market: &str) -> Option<&AlertRecord>;

    /// Records a delivery for `market` and stamps the run time with the
    /// record's `sent_at`. Durable implementations persist before returning.
    fn put(&mut self, market: &str, record: AlertRecord) -> Result<(), StateError>;

    fn last_run(&self) -> Option<DateTime<Utc>>;
}

/// Serialized form shared by both stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    #[serde(default)]
    pub markets: BTreeMap<String, AlertRecord>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl AlertState {
    fn record(&mut self, market: &str, record: AlertRecord) {
        self.last_run = Some(record.sent_at);
        self.markets.insert(market.to_string(), record);
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: AlertState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }
}

impl AlertStateStore for MemoryStore {
    fn get(&self, market: &str) -> Option<&AlertRecord> {
        self.state.markets.get(market)
    }

    fn put(&mut self, market: &str, record: AlertRecord) -> Result<(), StateError> {
        self.state.record(market, record);
        Ok(())
    }

    fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state.last_run
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// State file with atomic write-replace on every `put`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: AlertState,
}

impl JsonFileStore {
    /// Loads `path`. A missing file starts empty; so does an unreadable or
    /// corrupt one, with a warning, since the next write replaces it whole.
    /// Other I/O errors are returned.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<AlertState>(&text) {
                Ok(state) => state,
                Err(e) => {
                    warn!(source = %DataSource::AlertState, path = %path.display(), "alert state is corrupt, starting empty: {}", e);
                    AlertState::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no alert state yet");
                AlertState::default()
            }
            Err(e) => return Err(StateError::Io(e)),
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    fn save(&self) -> Result<(), StateError> {
        write_atomic(&self.path, &self.state)
    }
}

impl AlertStateStore for JsonFileStore {
    fn get(&self, market: &str) -> Option<&AlertRecord> {
        self.state.markets.get(market)
    }

    fn put(&mut self, market: &str, record: AlertRecord) -> Result<(), StateError> {
        let previous = self.state.clone();
        self.state.record(market, record);
        if let Err(e) = self.save() {
            log_state_failure(&self.path, &format!("record {} alert", market), &e);
            // Memory must not claim a send the file never recorded.
            self.state = previous;
            return Err(e);
        }
        Ok(())
    }

    fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state.last_run
    }
}

/// Serializes `state` to a temp file beside `path`, syncs it, then renames
/// it over `path`. Readers see either the old file or the new one.
pub fn write_atomic(path: &Path, state: &AlertState) -> Result<(), StateError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, state)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

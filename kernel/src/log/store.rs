// Year Log Storage
//
// Durability contract for the per-year event logs. Each year is one JSON
// array of `[timestamp, rendered_text]` pairs, replaced wholesale on
// every write.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::DateTime;

use super::{canonical_timestamp, Event, YearLog};
use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt year log {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Storage backend for year logs.
///
/// Implementations MUST NOT:
/// - Reorder entries on load
/// - Fail on a year that was never written (it loads empty)
pub trait YearLogStore {
    /// Years that have a persisted log, ascending.
    fn years(&self) -> Result<Vec<i32>, LogError>;

    fn load(&self, year: i32) -> Result<YearLog, LogError>;

    /// Replace the persisted log for `log.year()` with `log`.
    fn replace(&mut self, log: &YearLog) -> Result<(), LogError>;

    /// Load every persisted year, ascending.
    fn load_all(&self) -> Result<Vec<YearLog>, LogError> {
        self.years()?.into_iter().map(|year| self.load(year)).collect()
    }
}

/// Year logs kept as `<dir>/<prefix>_<year>.json`.
#[derive(Debug, Clone)]
pub struct JsonYearLogStore {
    dir: PathBuf,
    prefix: String,
}

impl JsonYearLogStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn path_for(&self, year: i32) -> PathBuf {
        self.dir.join(format!("{}_{}.json", self.prefix, year))
    }

    fn year_of(&self, file_name: &str) -> Option<i32> {
        file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }
}

impl YearLogStore for JsonYearLogStore {
    fn years(&self) -> Result<Vec<i32>, LogError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LogError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut years = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LogError::Io {
                path: self.dir.clone(),
                source,
            })?;
            if let Some(year) = entry.file_name().to_str().and_then(|n| self.year_of(n)) {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    fn load(&self, year: i32) -> Result<YearLog, LogError> {
        let path = self.path_for(year);
        let data = fsutil::read_optional(&path).map_err(|source| LogError::Io {
            path: path.clone(),
            source,
        })?;
        let Some(data) = data else {
            return Ok(YearLog::new(year));
        };

        let corrupt = |reason: String| LogError::Corrupt {
            path: path.clone(),
            reason,
        };

        let raw: Vec<(String, String)> =
            serde_json::from_str(&data).map_err(|e| corrupt(e.to_string()))?;

        let mut entries = Vec::with_capacity(raw.len());
        for (iso, text) in raw {
            let timestamp = DateTime::parse_from_rfc3339(&iso)
                .map_err(|e| corrupt(format!("bad timestamp {iso:?}: {e}")))?;
            let event = Event::decode(timestamp, &text).map_err(|e| corrupt(e.to_string()))?;
            entries.push(event);
        }

        Ok(YearLog::from_entries(year, entries))
    }

    fn replace(&mut self, log: &YearLog) -> Result<(), LogError> {
        let path = self.path_for(log.year());
        let raw: Vec<(String, &str)> = log
            .entries()
            .iter()
            .map(|e| (canonical_timestamp(&e.timestamp), e.rendered_text.as_str()))
            .collect();

        let data = serde_json::to_vec(&raw).map_err(|e| LogError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        fsutil::atomic_write(&path, &data).map_err(|source| LogError::Io { path, source })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLogStore {
    logs: BTreeMap<i32, YearLog>,
}

impl YearLogStore for InMemoryLogStore {
    fn years(&self) -> Result<Vec<i32>, LogError> {
        Ok(self.logs.keys().copied().collect())
    }

    fn load(&self, year: i32) -> Result<YearLog, LogError> {
        Ok(self
            .logs
            .get(&year)
            .cloned()
            .unwrap_or_else(|| YearLog::new(year)))
    }

    fn replace(&mut self, log: &YearLog) -> Result<(), LogError> {
        self.logs.insert(log.year(), log.clone());
        Ok(())
    }
}

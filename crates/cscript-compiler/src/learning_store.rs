//! Durable arm-statistic storage.
//!
//! One plain-text line per arm:
//! `<armKey> <trials> <cumulativeReward> <ema> <lastReward>`.
//! The store is an explicitly owned handle injected into the driver, not
//! ambient state. It is loaded once, and every mutation rewrites the file
//! in full through an atomic temp-file-plus-rename in the same directory,
//! so a crash mid-write can never leave a torn store behind. A single
//! mutating process is assumed.
//!
//! Store failures are non-fatal to compilation: callers degrade to empty
//! statistics and keep building.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::adaptive_policy::{apply_reward, ArmStatistic};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Stable error taxonomy for store I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    Read { path: PathBuf, detail: String },
    Write { path: PathBuf, detail: String },
}

impl StoreError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "CSC-STORE-0001",
            Self::Write { .. } => "CSC-STORE-0002",
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, detail } => {
                write!(f, "cannot read learning store {}: {detail}", path.display())
            }
            Self::Write { path, detail } => {
                write!(f, "cannot write learning store {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// LearningStore
// ---------------------------------------------------------------------------

/// `armKey → ArmStatistic` with write-through persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningStore {
    path: Option<PathBuf>,
    stats: BTreeMap<String, ArmStatistic>,
}

impl LearningStore {
    /// A store with no backing file; mutations stay in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            stats: BTreeMap::new(),
        }
    }

    /// An empty store that will persist to `path` on the next mutation.
    pub fn fresh_at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            stats: BTreeMap::new(),
        }
    }

    /// Load from `path`. A missing file is a normal first run and yields
    /// an empty store; unreadable content is an error the caller may
    /// downgrade to a warning. Unparseable lines are skipped.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Self {
                stats: parse_store(&text),
                path: Some(path),
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::fresh_at(path))
            }
            Err(error) => Err(StoreError::Read {
                path,
                detail: error.to_string(),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn statistic(&self, key: &str) -> Option<&ArmStatistic> {
        self.stats.get(key)
    }

    pub fn statistics(&self) -> &BTreeMap<String, ArmStatistic> {
        &self.stats
    }

    pub fn total_trials(&self) -> u64 {
        self.stats.values().map(|stat| stat.trials).sum()
    }

    /// Apply one reward to `key` and flush. The in-memory statistic is
    /// updated even when the flush fails, so the caller can still report
    /// the outcome it recorded.
    pub fn record(&mut self, key: &str, reward: f64) -> Result<(), StoreError> {
        let current = self.stats.get(key).copied().unwrap_or_default();
        self.stats.insert(key.to_string(), apply_reward(&current, reward));
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let rendered = render_store(&self.stats);
        let mut temp = path.clone();
        temp.set_extension("tmp");
        fs::write(&temp, rendered).map_err(|error| StoreError::Write {
            path: temp.clone(),
            detail: error.to_string(),
        })?;
        fs::rename(&temp, path).map_err(|error| StoreError::Write {
            path: path.clone(),
            detail: error.to_string(),
        })
    }
}

fn parse_store(text: &str) -> BTreeMap<String, ArmStatistic> {
    let mut stats = BTreeMap::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            continue;
        }
        let (Ok(trials), Ok(cumulative_reward), Ok(ema), Ok(last_reward)) = (
            fields[1].parse::<u64>(),
            fields[2].parse::<f64>(),
            fields[3].parse::<f64>(),
            fields[4].parse::<f64>(),
        ) else {
            continue;
        };
        stats.insert(
            fields[0].to_string(),
            ArmStatistic {
                trials,
                cumulative_reward,
                ema,
                last_reward,
            },
        );
    }
    stats
}

fn render_store(stats: &BTreeMap<String, ArmStatistic>) -> String {
    let mut out = String::new();
    for (key, stat) in stats {
        out.push_str(&format!(
            "{key} {} {} {} {}\n",
            stat.trials, stat.cumulative_reward, stat.ema, stat.last_reward
        ));
    }
    out
}

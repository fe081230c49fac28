//! Append-only line-delimited JSON store.
//!
//! One record per line. Reads tolerate corrupt lines: they are skipped with
//! a warning so a damaged tail never aborts a batch.

use crate::error::WardenError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only JSONL store
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and sync it to disk
    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), WardenError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| WardenError::Store {
                path: self.path.display().to_string(),
                source,
            })?;
        }

        let json = serde_json::to_string(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| WardenError::Store {
                path: self.path.display().to_string(),
                source,
            })?;

        writeln!(file, "{}", json).map_err(|source| WardenError::Store {
            path: self.path.display().to_string(),
            source,
        })?;
        file.sync_all().map_err(|source| WardenError::Store {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }

    /// Load every parseable record. Missing file reads as empty.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>, WardenError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path).map_err(|source| WardenError::Store {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(
                        "Unreadable line {} in {}: {}",
                        lineno + 1,
                        self.path.display(),
                        e
                    );
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        "Skipping corrupt record at {}:{}: {}",
                        self.path.display(),
                        lineno + 1,
                        e
                    );
                }
            }
        }

        Ok(records)
    }

    /// Load the last `n` parseable records
    pub fn tail<T: DeserializeOwned>(&self, n: usize) -> Result<Vec<T>, WardenError> {
        let mut records = self.load::<T>()?;
        if records.len() > n {
            records.drain(..records.len() - n);
        }
        Ok(records)
    }
}

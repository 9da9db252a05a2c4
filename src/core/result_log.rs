//! Append-only result log with file-based persistence.
//!
//! Results are stored as newline-delimited JSON (JSONL) so a log can be
//! inspected with ordinary tools and replayed after the process exits.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::domain::AnalysisResult;

/// Errors that can occur with the result log
#[derive(Debug, Error)]
pub enum ResultLogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to parse line {line} of {path}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// JSONL file of completed results
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,

    /// Serializes appends so concurrent completions never interleave lines
    write_lock: Mutex<()>,
}

impl ResultLog {
    /// Open (or prepare to create) a log at `path`, creating parent directories
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ResultLogError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| ResultLogError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a result to the log
    pub async fn append<P: Serialize>(&self, result: &AnalysisResult<P>) -> Result<(), ResultLogError> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|source| self.io_error(source))?;
        file.flush().await.map_err(|source| self.io_error(source))?;

        Ok(())
    }

    /// Replay all results in order
    pub async fn replay<P: DeserializeOwned>(&self) -> Result<Vec<AnalysisResult<P>>, ResultLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut results = Vec::new();
        let mut line_no = 0;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|source| self.io_error(source))?
        {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let result = serde_json::from_str(&line).map_err(|source| ResultLogError::Parse {
                path: self.path.clone(),
                line: line_no,
                source,
            })?;
            results.push(result);
        }

        Ok(results)
    }

    /// Results completed at or after `since`
    pub async fn since<P: DeserializeOwned>(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalysisResult<P>>, ResultLogError> {
        let results = self.replay().await?;
        Ok(results
            .into_iter()
            .filter(|result| result.timestamp >= since)
            .collect())
    }

    fn io_error(&self, source: std::io::Error) -> ResultLogError {
        ResultLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

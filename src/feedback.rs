use chrono::{DateTime, Datelike, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Failed to write feedback log: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize feedback: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A user report that a generated query was wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub message_id: String,
    pub user_query: String,
    pub sql_query: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Append-only JSON-lines log, one file per month.
pub struct FeedbackSink {
    dir: PathBuf,
    /// Next line index per log file; a file is counted once, on first use.
    next_index: Mutex<HashMap<String, usize>>,
}

pub fn log_file_name<Tz: chrono::TimeZone>(at: &DateTime<Tz>) -> String {
    format!("sql_errors_{}-{:02}.jsonl", at.year(), at.month())
}

async fn count_lines(path: &Path) -> Result<usize, std::io::Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content.lines().filter(|line| !line.trim().is_empty()).count()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

impl FeedbackSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_index: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the entry id, `<file name>:<line index>`.
    pub async fn record(&self, entry: &FeedbackEntry) -> Result<String, FeedbackError> {
        self.record_at(entry, Local::now()).await
    }

    pub async fn record_at<Tz: chrono::TimeZone>(
        &self,
        entry: &FeedbackEntry,
        at: DateTime<Tz>,
    ) -> Result<String, FeedbackError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let file_name = log_file_name(&at);
        let path = self.dir.join(&file_name);

        let mut next_index = self.next_index.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let index = match next_index.get(&file_name) {
            Some(index) => *index,
            None => count_lines(&path).await?,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        next_index.insert(file_name.clone(), index + 1);

        info!(message_id = %entry.message_id, file = %file_name, index, "SQL feedback recorded");
        Ok(format!("{}:{}", file_name, index))
    }
}

//! Append-only record of finished runs

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{RunConfig, RunStatus};
use crate::error::Result;
use crate::llm::TokenUsage;

const HISTORY_FILE: &str = "history.jsonl";

/// Summary of one finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub goal: String,
    pub model: String,
    pub status: RunStatus,
    pub iterations: u32,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub reason: String,
    pub cwd: PathBuf,
}

impl RunRecord {
    pub fn new(
        run_id: impl Into<String>,
        config: &RunConfig,
        status: RunStatus,
        iterations: u32,
        usage: &TokenUsage,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        let finished_at = Utc::now();
        let duration_secs = (finished_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            run_id: run_id.into(),
            goal: config.goal.clone(),
            model: config.model.clone(),
            status,
            iterations,
            total_tokens: usage.total(),
            cost_usd: usage.cost_usd(&config.model),
            started_at,
            finished_at,
            duration_secs,
            reason: reason.into(),
            cwd: config.cwd.clone(),
        }
    }
}

/// JSONL file of [`RunRecord`]s at `<dir>/history.jsonl`
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(HISTORY_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &RunRecord) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Every record, oldest first. Malformed lines are skipped.
    pub fn list(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("{}:{}: skipping malformed record: {}", self.path.display(), idx + 1, e),
            }
        }
        Ok(records)
    }

    /// The last `limit` records, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut records = self.list()?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

//! JSONL event log
//!
//! Appends every event of a subscription to a file, one JSON object per line,
//! until the bus closes.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

use super::bus::Subscription;
use crate::error::Result;

/// Spawn a task writing `subscription` to `path`. Resolves to the number of
/// events written.
pub fn spawn_event_log(mut subscription: Subscription, path: impl Into<PathBuf>) -> JoinHandle<Result<usize>> {
    let path = path.into();
    tokio::spawn(async move {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;

        let mut written = 0;
        while let Some(event) = subscription.recv().await {
            let mut line = serde_json::to_string(&event)?;
            line.push('\n');
            file.write_all(line.as_bytes()).await?;
            written += 1;
        }
        file.flush().await?;

        if subscription.dropped() > 0 {
            log::warn!("event log {} missed {} events", path.display(), subscription.dropped());
        }
        Ok(written)
    })
}

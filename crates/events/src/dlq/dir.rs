//! One JSON file per dead letter.
//!
//! Files are named `<UTC timestamp>-<uuid>.json` so a lexical sort is a
//! chronological one. Each file is written under a dot-prefixed temporary
//! name and renamed into place, so readers never see a partial record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{DeadLetterQueue, DlqError, DlqMessage};

pub struct DirDlq {
    dir: PathBuf,
}

impl DirDlq {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stored records, newest first, at most `limit`.
    pub async fn entries(&self, limit: usize) -> Result<Vec<DlqMessage>, DlqError> {
        let mut reader = match tokio::fs::read_dir(&self.dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));

        let mut messages = Vec::with_capacity(limit.min(names.len()));
        for name in names.into_iter().take(limit) {
            let bytes = tokio::fs::read(self.dir.join(&name)).await?;
            messages.push(serde_json::from_slice(&bytes)?);
        }
        Ok(messages)
    }
}

#[async_trait]
impl DeadLetterQueue for DirDlq {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = format!(
            "{}-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ"),
            Uuid::new_v4()
        );
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let json = serde_json::to_vec_pretty(message)?;

        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, self.dir.join(&name)).await?;
        tracing::debug!(file = %name, "Dead letter written");
        Ok(())
    }
}

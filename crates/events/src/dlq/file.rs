//! Append-only mbox file of dead letters.
//!
//! Each record is one mbox message:
//!
//! ```text
//! From DLQ Mon Jan  2 15:04:05 2006
//! Date: Mon, 02 Jan 2006 15:04:05 +0000
//! Message-ID: <uuid@dlq.local>
//! Content-Length: 42
//!
//! error: ...
//! ```
//!
//! Body lines that look like a separator (`From `, optionally preceded by
//! `>` characters) get one extra `>` so the file stays parseable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DeadLetterQueue, DlqError, DlqMessage};

const SEPARATOR: &str = "From DLQ ";

pub struct FileDlq {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDlq {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bodies of the stored records, newest first, at most `limit`.
    pub async fn entries(&self, limit: usize) -> Result<Vec<String>, DlqError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = parse_mbox(&contents);
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl DeadLetterQueue for FileDlq {
    async fn record(&self, message: &DlqMessage) -> Result<(), DlqError> {
        let entry = format_entry(&message.to_text());

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn format_entry(text: &str) -> String {
    let now = Utc::now();
    let mut body = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        if is_separator_like(line) {
            body.push('>');
        }
        body.push_str(line);
        body.push('\n');
    }
    format!(
        "{SEPARATOR}{}\nDate: {}\nMessage-ID: <{}@dlq.local>\nContent-Length: {}\n\n{body}\n",
        now.format("%a %b %e %H:%M:%S %Y"),
        now.to_rfc2822(),
        Uuid::new_v4(),
        body.len(),
    )
}

fn is_separator_like(line: &str) -> bool {
    line.trim_start_matches('>').starts_with("From ")
}

fn parse_mbox(contents: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current: Option<(bool, String)> = None;

    for line in contents.lines() {
        if line.starts_with(SEPARATOR) {
            if let Some((_, body)) = current.take() {
                entries.push(finish(body));
            }
            current = Some((true, String::new()));
            continue;
        }
        let Some((in_headers, body)) = current.as_mut() else {
            continue;
        };
        if *in_headers {
            if line.is_empty() {
                *in_headers = false;
            }
            continue;
        }
        match line.strip_prefix('>') {
            Some(rest) if is_separator_like(rest) => body.push_str(rest),
            _ => body.push_str(line),
        }
        body.push('\n');
    }
    if let Some((_, body)) = current {
        entries.push(finish(body));
    }
    entries
}

/// Drop the blank line that terminates every record.
fn finish(mut body: String) -> String {
    if body.ends_with("\n\n") {
        body.pop();
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_appended_and_read_back_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let dlq = FileDlq::new(dir.path().join("dlq.log"));

        dlq.record(&DlqMessage::new("first")).await.unwrap();
        dlq.record(&DlqMessage::new("second")).await.unwrap();

        let entries = dlq.entries(10).await.unwrap();
        assert_eq!(entries, vec!["error: second\n", "error: first\n"]);
        assert_eq!(dlq.entries(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_uses_mbox_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.log");
        FileDlq::new(&path).record(&DlqMessage::new("boom")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[0].starts_with("From DLQ "));
        assert!(lines[1].starts_with("Date: "));
        assert!(lines[2].starts_with("Message-ID: <") && lines[2].ends_with("@dlq.local>"));
        assert_eq!(lines[3], "Content-Length: 12");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "error: boom");
    }

    #[tokio::test]
    async fn from_lines_in_body_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.log");
        let dlq = FileDlq::new(&path);
        dlq.record(&DlqMessage::new("bad\nFrom DLQ injected\n>From quoted"))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\n>From DLQ injected\n"));
        assert!(contents.contains("\n>>From quoted\n"));

        let entries = dlq.entries(10).await.unwrap();
        assert_eq!(entries, vec!["error: bad\nFrom DLQ injected\n>From quoted\n"]);
    }

    #[tokio::test]
    async fn missing_file_has_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let dlq = FileDlq::new(dir.path().join("absent.log"));
        assert!(dlq.entries(5).await.unwrap().is_empty());
    }
}

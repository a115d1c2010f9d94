use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::model::{BaseSnapshot, Timestamp, VersionedSnapshot};
use crate::store::traits::{BaseStore, SnapshotStore};

const HISTORY_DIR: &str = "history";
const BASE_FILE: &str = "base.json";
const DOCUMENT_EXTENSION: &str = ".json";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";

/// Directory-backed store:
///
/// ```text
/// <root>/<tag>/history/<timestamp>.json   system model, annotation and broken flag
/// <root>/<tag>/base.json                  pre-break pair
/// ```
///
/// Every document is written to a staging file in the tag directory and renamed
/// over its target, so a reader sees either the old or the new snapshot.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create storage directory {}", root.display()))?;
        Ok(Self { root })
    }

    fn tag_dir(&self, tag: &str) -> Result<PathBuf> {
        if tag.is_empty() || tag.starts_with('.') || tag.contains(|c: char| c == '/' || c == '\\') {
            bail!("Invalid tag '{}'", tag);
        }
        Ok(self.root.join(tag))
    }

    fn history_dir(&self, tag: &str) -> Result<PathBuf> {
        Ok(self.tag_dir(tag)?.join(HISTORY_DIR))
    }

    fn snapshot_file(&self, tag: &str, timestamp: Timestamp) -> Result<PathBuf> {
        Ok(self.history_dir(tag)?.join(format!(
            "{}{}",
            timestamp.format(TIMESTAMP_FORMAT),
            DOCUMENT_EXTENSION
        )))
    }

    fn base_file(&self, tag: &str) -> Result<PathBuf> {
        Ok(self.tag_dir(tag)?.join(BASE_FILE))
    }

    fn parse_timestamp(file_name: &str) -> Option<Timestamp> {
        let name = file_name.strip_suffix(DOCUMENT_EXTENSION)?;
        NaiveDateTime::parse_from_str(name, TIMESTAMP_PARSE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Writes `document` to a fresh staging file next to the history of `tag`.
    async fn stage<T: Serialize>(&self, tag: &str, document: &T) -> Result<PathBuf> {
        let dir = self.history_dir(tag)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let staged = self.tag_dir(tag)?.join(format!(".staging-{}", uuid::Uuid::new_v4()));
        let data = serde_json::to_vec_pretty(document).context("Failed to serialize document")?;
        fs::write(&staged, data)
            .await
            .with_context(|| format!("Failed to write {}", staged.display()))?;
        Ok(staged)
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(data) => {
                let document = serde_json::from_slice(&data)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                Ok(Some(document))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn remove_file(path: &Path) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for FileStore {
    async fn commit_snapshot(&self, snapshot: VersionedSnapshot) -> Result<()> {
        let target = self.snapshot_file(&snapshot.tag, snapshot.timestamp())?;
        let staged = self.stage(&snapshot.tag, &snapshot).await?;

        if let Err(err) = fs::rename(&staged, &target).await {
            Self::remove_file(&staged).await?;
            return Err(err).with_context(|| format!("Failed to publish {}", target.display()));
        }
        Ok(())
    }

    async fn get_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<Option<VersionedSnapshot>> {
        Self::read_json(&self.snapshot_file(tag, timestamp)?).await
    }

    async fn list_timestamps(&self, tag: &str) -> Result<Vec<Timestamp>> {
        let dir = self.history_dir(tag)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("Failed to list {}", dir.display())),
        };

        let mut timestamps = Vec::new();
        while let Some(entry) = entries.next_entry().await.context("Failed to read history entry")? {
            if let Some(timestamp) = entry.file_name().to_str().and_then(Self::parse_timestamp) {
                timestamps.push(timestamp);
            }
        }

        timestamps.sort_unstable_by(|a, b| b.cmp(a));
        Ok(timestamps)
    }

    async fn delete_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<bool> {
        Self::remove_file(&self.snapshot_file(tag, timestamp)?).await
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to list {}", self.root.display()))?;
        let mut tags = Vec::new();

        while let Some(entry) = entries.next_entry().await.context("Failed to read storage entry")? {
            let Some(tag) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if tag.starts_with('.') {
                continue;
            }
            if !self.list_timestamps(&tag).await?.is_empty() {
                tags.push(tag);
            }
        }

        tags.sort();
        Ok(tags)
    }
}

#[async_trait::async_trait]
impl BaseStore for FileStore {
    async fn get_base(&self, tag: &str) -> Result<Option<BaseSnapshot>> {
        Self::read_json(&self.base_file(tag)?).await
    }

    /// Publishes with a hard link, which fails instead of replacing an existing base.
    async fn save_base_if_absent(&self, tag: &str, base: BaseSnapshot) -> Result<bool> {
        let target = self.base_file(tag)?;
        let staged = self.stage(tag, &base).await?;

        let linked = fs::hard_link(&staged, &target).await;
        Self::remove_file(&staged).await?;

        match linked {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err).with_context(|| format!("Failed to publish {}", target.display())),
        }
    }

    async fn delete_base(&self, tag: &str) -> Result<bool> {
        Self::remove_file(&self.base_file(tag)?).await
    }
}

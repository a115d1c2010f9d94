use crate::model::{BaseSnapshot, Timestamp, VersionedSnapshot};
use anyhow::Result;

/// Per-tag history of (system model, annotation, broken flag) snapshots,
/// addressed by the timestamp of the system model.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Writes the whole snapshot at once, replacing a snapshot with the same timestamp.
    async fn commit_snapshot(&self, snapshot: VersionedSnapshot) -> Result<()>;
    async fn get_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<Option<VersionedSnapshot>>;
    /// Timestamps of all snapshots of a tag, newest first
    async fn list_timestamps(&self, tag: &str) -> Result<Vec<Timestamp>>;
    async fn delete_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<bool>;
    async fn list_tags(&self) -> Result<Vec<String>>;

    async fn get_latest_snapshot(&self, tag: &str) -> Result<Option<VersionedSnapshot>> {
        match self.list_timestamps(tag).await?.first() {
            Some(timestamp) => self.get_snapshot(tag, *timestamp).await,
            None => Ok(None),
        }
    }

    /// The snapshot in effect at `timestamp`: the newest one dated at or before it.
    async fn get_latest_at_or_before(&self, tag: &str, timestamp: Timestamp) -> Result<Option<VersionedSnapshot>> {
        let found = self
            .list_timestamps(tag)
            .await?
            .into_iter()
            .find(|ts| *ts <= timestamp);

        match found {
            Some(ts) => self.get_snapshot(tag, ts).await,
            None => Ok(None),
        }
    }
}

/// The pre-break (system model, annotation) pair of a tag.
#[async_trait::async_trait]
pub trait BaseStore: Send + Sync {
    async fn get_base(&self, tag: &str) -> Result<Option<BaseSnapshot>>;
    /// Returns false, without writing, when the tag already has a base.
    async fn save_base_if_absent(&self, tag: &str, base: BaseSnapshot) -> Result<bool>;
    async fn delete_base(&self, tag: &str) -> Result<bool>;
}

pub trait Store: SnapshotStore + BaseStore + Send + Sync {}
impl<T: SnapshotStore + BaseStore + Send + Sync> Store for T {}

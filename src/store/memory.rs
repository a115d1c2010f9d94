use anyhow::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::model::{BaseSnapshot, Timestamp, VersionedSnapshot};
use crate::store::traits::{BaseStore, SnapshotStore};

#[derive(Debug, Default)]
struct TagHistory {
    snapshots: BTreeMap<Timestamp, VersionedSnapshot>,
    base: Option<BaseSnapshot>,
}

/// Volatile store used by tests and the demo server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tags: RwLock<HashMap<String, TagHistory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn commit_snapshot(&self, snapshot: VersionedSnapshot) -> Result<()> {
        let mut tags = self.tags.write();
        tags.entry(snapshot.tag.clone())
            .or_default()
            .snapshots
            .insert(snapshot.timestamp(), snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<Option<VersionedSnapshot>> {
        let tags = self.tags.read();
        Ok(tags
            .get(tag)
            .and_then(|history| history.snapshots.get(&timestamp))
            .cloned())
    }

    async fn list_timestamps(&self, tag: &str) -> Result<Vec<Timestamp>> {
        let tags = self.tags.read();
        Ok(tags
            .get(tag)
            .map(|history| history.snapshots.keys().rev().copied().collect())
            .unwrap_or_default())
    }

    async fn delete_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<bool> {
        let mut tags = self.tags.write();
        Ok(tags
            .get_mut(tag)
            .and_then(|history| history.snapshots.remove(&timestamp))
            .is_some())
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let tags = self.tags.read();
        let mut names: Vec<String> = tags
            .iter()
            .filter(|(_, history)| !history.snapshots.is_empty())
            .map(|(tag, _)| tag.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[async_trait::async_trait]
impl BaseStore for MemoryStore {
    async fn get_base(&self, tag: &str) -> Result<Option<BaseSnapshot>> {
        let tags = self.tags.read();
        Ok(tags.get(tag).and_then(|history| history.base.clone()))
    }

    async fn save_base_if_absent(&self, tag: &str, base: BaseSnapshot) -> Result<bool> {
        let mut tags = self.tags.write();
        let history = tags.entry(tag.to_string()).or_default();
        if history.base.is_some() {
            return Ok(false);
        }
        history.base = Some(base);
        Ok(true)
    }

    async fn delete_base(&self, tag: &str) -> Result<bool> {
        let mut tags = self.tags.write();
        Ok(tags
            .get_mut(tag)
            .and_then(|history| history.base.take())
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    #[tokio::test]
    async fn test_latest_and_in_effect_lookups() {
        let store = MemoryStore::new();
        let first = seed::first_application();
        let second = seed::second_application();

        store.commit_snapshot(VersionedSnapshot::new("shop", first.clone(), None)).await.unwrap();
        store
            .commit_snapshot(VersionedSnapshot::new("shop", second.clone(), Some(seed::first_annotation())))
            .await
            .unwrap();

        assert_eq!(store.list_timestamps("shop").await.unwrap(), vec![second.timestamp, first.timestamp]);

        let latest = store.get_latest_snapshot("shop").await.unwrap().unwrap();
        assert_eq!(latest.application, second);

        let between = first.timestamp + chrono::Duration::days(1);
        let in_effect = store.get_latest_at_or_before("shop", between).await.unwrap().unwrap();
        assert_eq!(in_effect.application, first);

        let before_all = first.timestamp - chrono::Duration::days(1);
        assert!(store.get_latest_at_or_before("shop", before_all).await.unwrap().is_none());
        assert!(store.get_latest_snapshot("other").await.unwrap().is_none());
        assert_eq!(store.list_tags().await.unwrap(), vec!["shop".to_string()]);
    }

    #[tokio::test]
    async fn test_base_is_written_once() {
        let store = MemoryStore::new();
        let first = BaseSnapshot {
            application: seed::first_application(),
            annotation: Some(seed::first_annotation()),
        };
        let second = BaseSnapshot {
            application: seed::second_application(),
            annotation: None,
        };

        assert!(store.save_base_if_absent("shop", first.clone()).await.unwrap());
        assert!(!store.save_base_if_absent("shop", second).await.unwrap());
        assert_eq!(store.get_base("shop").await.unwrap(), Some(first));

        assert!(store.delete_base("shop").await.unwrap());
        assert!(store.get_base("shop").await.unwrap().is_none());
        assert!(!store.delete_base("shop").await.unwrap());
    }
}

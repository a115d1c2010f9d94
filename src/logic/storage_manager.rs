use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::logic::{AnnotationFixer, ChangeDetector, ValidityChecker};
use crate::model::{
    Annotation, Application, BaseSnapshot, ChangeReport, IgnoredChangeTypes, Timestamp, ValidityReport,
    VersionedSnapshot,
};
use crate::store::Store;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("No system model is stored for tag '{0}'")]
    NoApplicationModel(String),
    #[error("System model for tag '{tag}' dated {timestamp} is older than the latest snapshot ({latest})")]
    StaleApplication {
        tag: String,
        timestamp: Timestamp,
        latest: Timestamp,
    },
    #[error("System model for tag '{tag}' contains duplicate ids: {ids:?}")]
    DuplicateIds { tag: String, ids: Vec<String> },
    #[error("Cannot retime snapshot of tag '{tag}': {reason}")]
    InvalidRetime { tag: String, reason: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Keeps the annotations of every tag consistent with its evolving system model.
///
/// Updates of the same tag are serialized by a per-tag lock held across the whole
/// read-check-fix-write sequence. Reads take no lock.
pub struct AnnotationStorageManager<S: Store> {
    store: S,
    ignored: IgnoredChangeTypes,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: Store> AnnotationStorageManager<S> {
    pub fn new(store: S) -> Self {
        Self::with_ignored_changes(store, IgnoredChangeTypes::none())
    }

    /// `ignored` applies to every system-model update, on top of per-request settings.
    pub fn with_ignored_changes(store: S, ignored: IgnoredChangeTypes) -> Self {
        Self {
            store,
            ignored,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Locks nobody holds are dropped, so the map only keeps tags being updated.
    fn tag_lock(&self, tag: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|name, lock| name == tag || Arc::strong_count(lock) > 1);
        locks.entry(tag.to_string()).or_default().clone()
    }

    /// Stores a new system model of `tag` and brings the annotation along.
    ///
    /// Non-breaking changes carry the current annotation into the new snapshot.
    /// Breaking changes trigger one repair attempt; if the repaired annotation is
    /// still broken, the new snapshot is quarantined. In both cases the previous
    /// (system model, annotation) pair is kept as base unless one exists already.
    pub async fn apply_application_update(
        &self,
        tag: &str,
        application: Application,
        ignored: &IgnoredChangeTypes,
    ) -> ManagerResult<ValidityReport> {
        let duplicates = application.duplicate_ids();
        if !duplicates.is_empty() {
            return Err(ManagerError::DuplicateIds {
                tag: tag.to_string(),
                ids: duplicates,
            });
        }

        let lock = self.tag_lock(tag);
        let _guard = lock.lock().await;

        self.apply_application_update_locked(tag, application, &self.ignored.merge(ignored))
            .await
    }

    async fn apply_application_update_locked(
        &self,
        tag: &str,
        application: Application,
        ignored: &IgnoredChangeTypes,
    ) -> ManagerResult<ValidityReport> {
        let detector = ChangeDetector::ignoring(*ignored);

        let Some(latest) = self.store.get_latest_snapshot(tag).await? else {
            let changes = detector.compare(&application, &Application::empty(application.id.clone()));
            log::info!(
                "Storing first system model of tag '{}' ({} endpoints)",
                tag,
                application.endpoints.len()
            );
            self.store
                .commit_snapshot(VersionedSnapshot::new(tag, application.clone(), None))
                .await?;
            return Ok(ValidityChecker::check(&application, None, Some(&changes)));
        };

        if application.timestamp < latest.timestamp() {
            return Err(ManagerError::StaleApplication {
                tag: tag.to_string(),
                timestamp: application.timestamp,
                latest: latest.timestamp(),
            });
        }

        let changes = detector.compare(&application, &latest.application);
        if !changes.changed() {
            log::debug!(
                "System model of tag '{}' has no relevant changes ({} ignored)",
                tag,
                changes.ignored_changes.len()
            );
            return Ok(ValidityReport::empty());
        }

        let application = ChangeDetector::revert_ignored(&application, &latest.application, &changes);
        let annotation = self.effective_annotation(tag).await?;
        let report = ValidityChecker::check(&application, annotation.as_ref(), Some(&changes));

        let annotation = match annotation {
            Some(annotation) if report.is_breaking() => annotation,
            annotation => {
                log::info!("Tag '{}' updated with {} system changes", tag, changes.changes.len());
                self.store
                    .commit_snapshot(VersionedSnapshot::new(tag, application, annotation))
                    .await?;
                return Ok(report);
            }
        };

        let fixed = AnnotationFixer::fix(&annotation, &report);
        let mut fixed_report = ValidityChecker::check(&application, Some(&fixed), Some(&changes));
        fixed_report.violations_before_fix = Some(report.violations);

        // The base goes first: a quarantined snapshot must never exist without it
        let base = BaseSnapshot {
            application: latest.application,
            annotation: Some(annotation),
        };
        if self.store.save_base_if_absent(tag, base).await? {
            log::info!("Stored base snapshot of tag '{}'", tag);
        }

        let snapshot = if fixed_report.is_breaking() {
            log::warn!("Annotation of tag '{}' cannot be repaired and is quarantined", tag);
            VersionedSnapshot::quarantined(tag, application)
        } else {
            log::info!("Annotation of tag '{}' repaired as '{}'", tag, fixed.id);
            VersionedSnapshot::new(tag, application, Some(fixed))
        };
        self.store.commit_snapshot(snapshot).await?;

        Ok(fixed_report)
    }

    /// Replaces the annotation of the latest snapshot of `tag`, unless it is broken
    /// against the latest system model. A breaking report means nothing was stored.
    pub async fn apply_annotation_update(&self, tag: &str, annotation: Annotation) -> ManagerResult<ValidityReport> {
        let lock = self.tag_lock(tag);
        let _guard = lock.lock().await;

        let latest = self
            .store
            .get_latest_snapshot(tag)
            .await?
            .ok_or_else(|| ManagerError::NoApplicationModel(tag.to_string()))?;

        let report = ValidityChecker::check(&latest.application, Some(&annotation), None);
        if report.is_breaking() {
            log::warn!("Rejected annotation '{}' for tag '{}': {}", annotation.id, tag, report);
            return Ok(report);
        }

        self.store
            .commit_snapshot(VersionedSnapshot::new(tag, latest.application, Some(annotation)))
            .await?;
        if self.store.delete_base(tag).await? {
            log::info!("Tag '{}' recovered, base snapshot removed", tag);
        }

        Ok(report)
    }

    /// Stores `annotation` on the latest snapshot if the tag has no annotation yet.
    pub async fn save_annotation_if_absent(&self, tag: &str, annotation: Annotation) -> ManagerResult<bool> {
        let lock = self.tag_lock(tag);
        let _guard = lock.lock().await;

        self.save_annotation_if_absent_locked(tag, annotation).await
    }

    async fn save_annotation_if_absent_locked(&self, tag: &str, annotation: Annotation) -> ManagerResult<bool> {
        let latest = self
            .store
            .get_latest_snapshot(tag)
            .await?
            .ok_or_else(|| ManagerError::NoApplicationModel(tag.to_string()))?;

        if self.effective_annotation(tag).await?.is_some() {
            return Ok(false);
        }

        let broken = ValidityChecker::check(&latest.application, Some(&annotation), None).is_breaking();
        let mut snapshot = VersionedSnapshot::new(tag, latest.application, Some(annotation));
        snapshot.broken = broken;
        self.store.commit_snapshot(snapshot).await?;

        Ok(true)
    }

    /// Stores `annotation` if the tag has none, then applies `application`.
    pub async fn create_or_update(
        &self,
        tag: &str,
        application: Application,
        annotation: Annotation,
        ignored: &IgnoredChangeTypes,
    ) -> ManagerResult<ValidityReport> {
        let lock = self.tag_lock(tag);
        let _guard = lock.lock().await;

        let ignored = self.ignored.merge(ignored);

        if self.store.get_latest_snapshot(tag).await?.is_none() {
            let report = self
                .apply_application_update_locked(tag, application, &ignored)
                .await?;
            self.save_annotation_if_absent_locked(tag, annotation).await?;
            return Ok(report);
        }

        self.save_annotation_if_absent_locked(tag, annotation).await?;
        self.apply_application_update_locked(tag, application, &ignored)
            .await
    }

    /// Moves the snapshot dated `old` to the earlier timestamp `new` and recomputes
    /// the broken flags of every snapshot from `new` on.
    pub async fn retime_application_snapshot(&self, tag: &str, old: Timestamp, new: Timestamp) -> ManagerResult<()> {
        let invalid = |reason: String| ManagerError::InvalidRetime {
            tag: tag.to_string(),
            reason,
        };

        if new >= old {
            return Err(invalid(format!("{} is not before {}", new, old)));
        }

        let lock = self.tag_lock(tag);
        let _guard = lock.lock().await;

        let mut snapshot = self
            .store
            .get_snapshot(tag, old)
            .await?
            .ok_or_else(|| invalid(format!("no snapshot at {}", old)))?;

        if self.store.get_snapshot(tag, new).await?.is_some() {
            return Err(invalid(format!("a snapshot at {} exists already", new)));
        }

        snapshot.application.timestamp = new;
        self.store.commit_snapshot(snapshot).await?;
        self.store.delete_snapshot(tag, old).await?;
        log::info!("Retimed snapshot of tag '{}' from {} to {}", tag, old, new);

        self.recheck_from(tag, new).await
    }

    /// Re-evaluates every snapshot dated at or after `from` against the annotation
    /// in effect at that point.
    async fn recheck_from(&self, tag: &str, from: Timestamp) -> ManagerResult<()> {
        let mut timestamps = self.store.list_timestamps(tag).await?;
        timestamps.reverse();

        let mut effective: Option<Annotation> = None;

        for timestamp in timestamps {
            let Some(snapshot) = self.store.get_snapshot(tag, timestamp).await? else {
                continue;
            };

            if let Some(annotation) = &snapshot.annotation {
                effective = Some(annotation.clone());
            }
            if timestamp < from {
                continue;
            }

            let broken = effective
                .as_ref()
                .map(|annotation| ValidityChecker::check(&snapshot.application, Some(annotation), None).is_breaking())
                .unwrap_or(false);

            let mut updated = snapshot.clone();
            updated.broken = broken;
            if !broken && updated.annotation.is_none() {
                updated.annotation = effective.clone();
            }

            if updated != snapshot {
                log::debug!("Snapshot {} of tag '{}' is now broken={}", timestamp, tag, broken);
                self.store.commit_snapshot(updated).await?;
            }
        }

        Ok(())
    }

    /// Annotation of the newest snapshot that holds one.
    async fn effective_annotation(&self, tag: &str) -> ManagerResult<Option<Annotation>> {
        for timestamp in self.store.list_timestamps(tag).await? {
            if let Some(annotation) = self
                .store
                .get_snapshot(tag, timestamp)
                .await?
                .and_then(|snapshot| snapshot.annotation)
            {
                return Ok(Some(annotation));
            }
        }

        Ok(None)
    }

    /// Changes from the system model in effect at `since` to the latest one.
    pub async fn delta_since(
        &self,
        tag: &str,
        since: Timestamp,
        ignored: &IgnoredChangeTypes,
    ) -> ManagerResult<ChangeReport> {
        let latest = self
            .store
            .get_latest_snapshot(tag)
            .await?
            .ok_or_else(|| ManagerError::NoApplicationModel(tag.to_string()))?;

        let old = self
            .store
            .get_latest_at_or_before(tag, since)
            .await?
            .map(|snapshot| snapshot.application)
            .unwrap_or_else(|| Application::empty(latest.application.id.clone()));

        Ok(ChangeDetector::ignoring(self.ignored.merge(ignored)).compare(&latest.application, &old))
    }

    pub async fn latest_application(&self, tag: &str) -> ManagerResult<Option<Application>> {
        Ok(self
            .store
            .get_latest_snapshot(tag)
            .await?
            .map(|snapshot| snapshot.application))
    }

    /// Annotation slot of the latest snapshot; empty while the tag is quarantined.
    pub async fn latest_annotation(&self, tag: &str) -> ManagerResult<Option<Annotation>> {
        Ok(self
            .store
            .get_latest_snapshot(tag)
            .await?
            .and_then(|snapshot| snapshot.annotation))
    }

    pub async fn annotation_at(&self, tag: &str, timestamp: Timestamp) -> ManagerResult<Option<Annotation>> {
        Ok(self
            .store
            .get_latest_at_or_before(tag, timestamp)
            .await?
            .and_then(|snapshot| snapshot.annotation))
    }

    pub async fn is_broken(&self, tag: &str) -> ManagerResult<bool> {
        Ok(self
            .store
            .get_latest_snapshot(tag)
            .await?
            .map(|snapshot| snapshot.broken)
            .unwrap_or(false))
    }

    pub async fn is_broken_at(&self, tag: &str, timestamp: Timestamp) -> ManagerResult<bool> {
        Ok(self
            .store
            .get_latest_at_or_before(tag, timestamp)
            .await?
            .map(|snapshot| snapshot.broken)
            .unwrap_or(false))
    }

    pub async fn base_annotation(&self, tag: &str) -> ManagerResult<Option<Annotation>> {
        Ok(self.store.get_base(tag).await?.and_then(|base| base.annotation))
    }

    pub async fn base_application(&self, tag: &str) -> ManagerResult<Option<Application>> {
        Ok(self.store.get_base(tag).await?.map(|base| base.application))
    }

    pub async fn tags(&self) -> ManagerResult<Vec<String>> {
        Ok(self.store.list_tags().await?)
    }
}

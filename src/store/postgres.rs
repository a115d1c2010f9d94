use anyhow::{Context, Result};
use chrono::SubsecRound;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::model::{Annotation, Application, BaseSnapshot, SnapshotBlob, Timestamp, VersionedSnapshot};
use crate::store::traits::{BaseStore, SnapshotStore};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the snapshot tables if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                tag TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                application_hash TEXT NOT NULL,
                application_data BYTEA NOT NULL,
                application_size BIGINT NOT NULL,
                annotation_hash TEXT,
                annotation_data BYTEA,
                annotation_size BIGINT,
                broken BOOLEAN NOT NULL DEFAULT FALSE,
                committed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (tag, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create snapshots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS base_snapshots (
                tag TEXT PRIMARY KEY,
                application_hash TEXT NOT NULL,
                application_data BYTEA NOT NULL,
                annotation_hash TEXT,
                annotation_data BYTEA,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create base_snapshots table")?;

        log::info!("Snapshot tables are in place");
        Ok(())
    }

    /// TIMESTAMPTZ keeps microseconds; keys are truncated so that lookups with the
    /// full-precision timestamp of a document find its row.
    fn row_timestamp(timestamp: Timestamp) -> Timestamp {
        timestamp.trunc_subsecs(6)
    }

    fn decode_annotation(row: &PgRow) -> Result<Option<Annotation>> {
        let data: Option<Vec<u8>> = row.get("annotation_data");
        data.map(|data| SnapshotBlob::decode(&data)).transpose()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PostgresStore {
    async fn commit_snapshot(&self, snapshot: VersionedSnapshot) -> Result<()> {
        let application = SnapshotBlob::encode(&snapshot.application)?;
        let annotation = snapshot.annotation.as_ref().map(SnapshotBlob::encode).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (tag, timestamp, application_hash, application_data, application_size,
                                   annotation_hash, annotation_data, annotation_size, broken)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tag, timestamp) DO UPDATE SET
                application_hash = EXCLUDED.application_hash,
                application_data = EXCLUDED.application_data,
                application_size = EXCLUDED.application_size,
                annotation_hash = EXCLUDED.annotation_hash,
                annotation_data = EXCLUDED.annotation_data,
                annotation_size = EXCLUDED.annotation_size,
                broken = EXCLUDED.broken,
                committed_at = NOW()
            "#,
        )
        .bind(&snapshot.tag)
        .bind(Self::row_timestamp(snapshot.timestamp()))
        .bind(&application.hash)
        .bind(&application.data)
        .bind(application.data_size)
        .bind(annotation.as_ref().map(|blob| blob.hash.clone()))
        .bind(annotation.as_ref().map(|blob| blob.data.clone()))
        .bind(annotation.as_ref().map(|blob| blob.data_size))
        .bind(snapshot.broken)
        .execute(&self.pool)
        .await
        .context("Failed to commit snapshot")?;

        Ok(())
    }

    async fn get_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<Option<VersionedSnapshot>> {
        let row = sqlx::query(
            "SELECT application_data, annotation_data, broken FROM snapshots WHERE tag = $1 AND timestamp = $2",
        )
        .bind(tag)
        .bind(Self::row_timestamp(timestamp))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch snapshot")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let application_data: Vec<u8> = row.get("application_data");
        let application: Application = SnapshotBlob::decode(&application_data)?;

        Ok(Some(VersionedSnapshot {
            tag: tag.to_string(),
            application,
            annotation: Self::decode_annotation(&row)?,
            broken: row.get("broken"),
        }))
    }

    async fn list_timestamps(&self, tag: &str) -> Result<Vec<Timestamp>> {
        let rows = sqlx::query("SELECT timestamp FROM snapshots WHERE tag = $1 ORDER BY timestamp DESC")
            .bind(tag)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list snapshot timestamps")?;

        Ok(rows.iter().map(|row| row.get("timestamp")).collect())
    }

    async fn delete_snapshot(&self, tag: &str, timestamp: Timestamp) -> Result<bool> {
        let result = sqlx::query("DELETE FROM snapshots WHERE tag = $1 AND timestamp = $2")
            .bind(tag)
            .bind(Self::row_timestamp(timestamp))
            .execute(&self.pool)
            .await
            .context("Failed to delete snapshot")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT tag FROM snapshots ORDER BY tag")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tags")?;

        Ok(rows.iter().map(|row| row.get("tag")).collect())
    }

    async fn get_latest_snapshot(&self, tag: &str) -> Result<Option<VersionedSnapshot>> {
        let timestamp: Option<Timestamp> =
            sqlx::query_scalar("SELECT MAX(timestamp) FROM snapshots WHERE tag = $1")
                .bind(tag)
                .fetch_one(&self.pool)
                .await
                .context("Failed to fetch latest snapshot timestamp")?;

        match timestamp {
            Some(timestamp) => self.get_snapshot(tag, timestamp).await,
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl BaseStore for PostgresStore {
    async fn get_base(&self, tag: &str) -> Result<Option<BaseSnapshot>> {
        let row = sqlx::query("SELECT application_data, annotation_data FROM base_snapshots WHERE tag = $1")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch base snapshot")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let application_data: Vec<u8> = row.get("application_data");

        Ok(Some(BaseSnapshot {
            application: SnapshotBlob::decode(&application_data)?,
            annotation: Self::decode_annotation(&row)?,
        }))
    }

    async fn save_base_if_absent(&self, tag: &str, base: BaseSnapshot) -> Result<bool> {
        let application = SnapshotBlob::encode(&base.application)?;
        let annotation = base.annotation.as_ref().map(SnapshotBlob::encode).transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO base_snapshots (tag, application_hash, application_data, annotation_hash, annotation_data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tag) DO NOTHING
            "#,
        )
        .bind(tag)
        .bind(&application.hash)
        .bind(&application.data)
        .bind(annotation.as_ref().map(|blob| blob.hash.clone()))
        .bind(annotation.as_ref().map(|blob| blob.data.clone()))
        .execute(&self.pool)
        .await
        .context("Failed to save base snapshot")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_base(&self, tag: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM base_snapshots WHERE tag = $1")
            .bind(tag)
            .execute(&self.pool)
            .await
            .context("Failed to delete base snapshot")?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_row_timestamp_drops_sub_microsecond_precision() {
        let base = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        let precise = base + Duration::nanoseconds(1_234_567);

        assert_eq!(PostgresStore::row_timestamp(precise), base + Duration::microseconds(1_234));
        assert_eq!(PostgresStore::row_timestamp(base), base);
    }
}

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{Annotation, Application, Timestamp};

/// One (system model, annotation, broken flag) triple of a tag's history,
/// addressed by the system model's timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedSnapshot {
    pub tag: String,
    pub application: Application,
    pub annotation: Option<Annotation>,
    pub broken: bool,
}

impl VersionedSnapshot {
    pub fn new(tag: impl Into<String>, application: Application, annotation: Option<Annotation>) -> Self {
        Self {
            tag: tag.into(),
            application,
            annotation,
            broken: false,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.application.timestamp
    }

    /// Quarantined: the annotation slot is empty and the broken flag is set.
    pub fn quarantined(tag: impl Into<String>, application: Application) -> Self {
        Self {
            tag: tag.into(),
            application,
            annotation: None,
            broken: true,
        }
    }
}

/// The pre-break (system model, annotation) pair kept for manual recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    pub application: Application,
    pub annotation: Option<Annotation>,
}

/// Gzip-compressed JSON document with a SHA-256 content hash.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotBlob {
    pub hash: String,
    pub data: Vec<u8>,
    pub data_size: i64,
}

impl SnapshotBlob {
    pub fn encode<T: Serialize>(document: &T) -> Result<Self> {
        let serialized = serde_json::to_vec(document).context("Failed to serialize document")?;
        let data = Self::compress_data(&serialized)?;

        Ok(Self {
            hash: Self::calculate_hash(&serialized),
            data,
            data_size: serialized.len() as i64,
        })
    }

    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        let decompressed = Self::decompress_data(data)?;
        serde_json::from_slice(&decompressed).context("Failed to deserialize document")
    }

    fn calculate_hash(data: &[u8]) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    fn compress_data(data: &[u8]) -> Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).context("Failed to compress document")?;
        encoder.finish().context("Failed to compress document")
    }

    fn decompress_data(data: &[u8]) -> Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        // Plain JSON written by hand is accepted as well
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            let mut decoder = GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .context("Failed to decompress document")?;
            Ok(decompressed)
        } else {
            Ok(data.to_vec())
        }
    }
}

//! Classification records as returned to callers and as held by a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::Verdict;

/// Outcome of one successful classification.
///
/// Records are assembled once and never modified, so fields are read-only
/// outside this crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: String,

    /// Base64 JPEG of the 150x150 image the model saw
    image_b64: String,

    is_defective: bool,

    confidence: f32,

    timestamp: DateTime<Utc>,
}

impl Record {
    pub(crate) fn new(image_b64: String, verdict: Verdict, timestamp: DateTime<Utc>) -> Self {
        Record {
            id: Uuid::new_v4().to_string(),
            image_b64,
            is_defective: verdict.is_defective,
            confidence: verdict.confidence,
            timestamp,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image_b64(&self) -> &str {
        &self.image_b64
    }

    pub fn is_defective(&self) -> bool {
        self.is_defective
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A record as kept by a [`RecordStore`](crate::store::RecordStore).
///
/// `store_id` is the store's own key and never leaves the store boundary;
/// `id` is optional here so rows written by other tools still load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(rename = "_id")]
    pub store_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub image_b64: String,

    pub is_defective: bool,

    pub confidence: f32,

    pub timestamp: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(store_id: String, record: &Record) -> Self {
        StoredRecord {
            store_id,
            id: Some(record.id.clone()),
            image_b64: record.image_b64.clone(),
            is_defective: record.is_defective,
            confidence: record.confidence,
            timestamp: record.timestamp,
        }
    }

    /// Strip the store key, falling back to it when `id` is missing.
    pub fn into_record(self) -> Record {
        Record {
            id: self.id.unwrap_or(self.store_id),
            image_b64: self.image_b64,
            is_defective: self.is_defective,
            confidence: self.confidence,
            timestamp: self.timestamp,
        }
    }
}

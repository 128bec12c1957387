use crate::cadapter::ObjectInfo;
use serde::{Deserialize, Serialize};

/// Cached metadata for one object, keyed by its normalized URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFileRecord {
    pub uri: String,
    pub size_bytes: u64,
    pub content_type: String,
    /// Creation/modification time, epoch seconds.
    pub timestamp: i64,
}

impl CachedFileRecord {
    pub fn new(uri: impl Into<String>, size_bytes: u64, content_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            size_bytes,
            content_type: content_type.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Converts what the bucket reports into a record for `uri`.
    pub fn from_info(uri: impl Into<String>, info: &ObjectInfo) -> Self {
        let mut record = Self::new(
            uri,
            info.size,
            info.content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        );
        if let Some(updated) = info.updated {
            record.timestamp = updated;
        }
        record
    }
}

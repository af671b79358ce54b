use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Metadata written alongside an object at upload time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub filename: String,
    pub content_type: String,
    /// Unix seconds; `0` means the object never expires.
    pub expires_at: i64,
}

/// An uploaded file as seen through the object store's stat call.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: String,
    pub filename: Option<String>,
    /// Type recorded at upload; absent for objects written by other tools.
    pub content_type: Option<String>,
    pub size: u64,
    /// Unix seconds; `0` means the object never expires.
    pub expires_at: i64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StoredObject {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at != 0 && self.expires_at < now.timestamp()
    }
}

/// Response body of a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadReceipt {
    pub id: String,
    pub url: String,
    /// Unix seconds; `0` means no expiration.
    pub expires: i64,
}

/// Outcome of the most recent probe of one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EndpointHealth {
    pub endpoint: String,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub probed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(expires_at: i64) -> StoredObject {
        StoredObject {
            id: "id".to_string(),
            filename: None,
            content_type: None,
            size: 0,
            expires_at,
            etag: None,
            last_modified: None,
        }
    }

    #[test]
    fn test_zero_expiration_never_expires() {
        let far_future = DateTime::from_timestamp(4_000_000_000, 0).unwrap();
        assert!(!object(0).is_expired_at(far_future));
    }

    #[test]
    fn test_expiration_in_the_past() {
        let now = Utc::now();
        assert!(object(now.timestamp() - 10).is_expired_at(now));
        assert!(!object(now.timestamp() + 10).is_expired_at(now));
    }
}

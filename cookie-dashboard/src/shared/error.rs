use thiserror::Error;

/// Errors produced while fetching a [`Snapshot`](super::types::Snapshot).
///
/// Every variant is recoverable: the poller falls back to the hourly cache
/// and tries again on the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    #[error("non-success status: {0}")]
    Status(u16),

    #[error("failed to decode snapshot: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = error.status() {
            FetchError::Status(status.as_u16())
        } else if error.is_decode() {
            FetchError::Decode(error.to_string())
        } else {
            FetchError::Request(error.to_string())
        }
    }
}

/// Errors produced by a [`KeyValueStore`](super::cache::KeyValueStore).
///
/// Never surfaced past the [`HourlyCache`](super::cache::HourlyCache), which
/// logs and degrades to a cache miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("failed to (de)serialise cache entry: {0}")]
    Serialize(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        StorageError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        StorageError::Serialize(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(FetchError::Status(503).to_string(), "non-success status: 503");
        assert_eq!(FetchError::Timeout.to_string(), "request timed out");
        assert_eq!(
            StorageError::Io("disk full".to_string()).to_string(),
            "storage I/O failed: disk full"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(StorageError::from(err), StorageError::Serialize(_)));
    }
}

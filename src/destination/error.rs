use std::path::PathBuf;

use thiserror::Error;

/// Errors from the destination server.
///
/// `is_retryable()` separates transient failures (network, 5xx, throttling)
/// from requests the server will keep refusing, so the retry loop can stop early.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("HTTP error requesting {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Album {album_id} rejected asset {asset_id}: {reason}")]
    Rejected {
        album_id: String,
        asset_id: String,
        reason: String,
    },

    #[error("Cannot read {path} for upload: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DestinationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DestinationError::Http { .. } => true,
            DestinationError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            DestinationError::Rejected { .. } => false,
            DestinationError::Io { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> DestinationError {
        DestinationError::Status {
            status: code,
            url: "u".into(),
            body: String::new(),
        }
    }

    #[test]
    fn test_client_errors_not_retryable() {
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn test_transient_statuses_retryable() {
        assert!(status(408).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
    }

    #[test]
    fn test_rejected_and_io_not_retryable() {
        let rejected = DestinationError::Rejected {
            album_id: "al".into(),
            asset_id: "as".into(),
            reason: "no_permission".into(),
        };
        assert!(!rejected.is_retryable());
        let io = DestinationError::Io {
            path: "x".into(),
            source: std::io::Error::other("gone"),
        };
        assert!(!io.is_retryable());
    }
}

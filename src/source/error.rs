use std::path::PathBuf;

use thiserror::Error;

/// Errors from the source photo service. Every variant is treated as
/// transient: the caller retries, then records a failure event.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error requesting {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Source API returned errno {errno} for {url}")]
    Api { errno: i64, url: String },

    #[error("Disk error writing {path}: {source}")]
    Disk {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let e = SourceError::Api {
            errno: -6,
            url: "https://src.example/list".into(),
        };
        assert_eq!(
            e.to_string(),
            "Source API returned errno -6 for https://src.example/list"
        );
    }

    #[test]
    fn test_status_error_display() {
        let e = SourceError::Status {
            status: 502,
            url: "u".into(),
        };
        assert_eq!(e.to_string(), "HTTP 502 from u");
    }
}

//! Error types for the mirror components.
//!
//! A resolution miss (the share has no URL for a file) is not an error; the
//! client reports it as `Ok(None)`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from talking to the share API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure, timeout, or a non-success HTTP status.
    #[error("transport error on {endpoint} ({path}): {source}")]
    Transport {
        endpoint: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response arrived but did not have the expected shape.
    #[error("protocol error on {endpoint} ({path}): {message}")]
    Protocol {
        endpoint: &'static str,
        path: String,
        message: String,
    },
}

impl ClientError {
    pub(crate) fn transport(endpoint: &'static str, path: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint,
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn protocol(endpoint: &'static str, path: &str, message: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Errors from a single file download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request for {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The relative path would land outside the download root.
    #[error("refusing unsafe relative path {0:?}")]
    UnsafePath(String),
}

impl DownloadError {
    pub(crate) fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Errors from loading or persisting the progress store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted progress file exists but cannot be parsed.
    #[error("progress file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode progress: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_names_endpoint_and_path() {
        let err = ClientError::protocol("list", "/movies", "missing data");
        let text = err.to_string();
        assert!(text.contains("list"));
        assert!(text.contains("/movies"));
        assert!(text.contains("missing data"));
    }

    #[test]
    fn filesystem_error_shows_path() {
        let err = DownloadError::fs(
            "create directory",
            "/tmp/x/y",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().starts_with("create directory /tmp/x/y"));
    }
}

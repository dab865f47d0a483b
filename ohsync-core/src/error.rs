//! Error types for ohsync-core.
//!
//! [`TransferError`] and [`RemoteError`] live here because both the
//! reconciliation engine (uploads) and the transfer pool (downloads) report
//! them.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or saving [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A size string such as `128m` could not be parsed.
    #[error("invalid size '{0}'; expected e.g. 500k, 128m, 2g or 1gib")]
    InvalidSize(String),
}

/// A member allow/deny list line that is not an 8-digit id.
#[derive(Debug, Error)]
pub enum IdListError {
    #[error("I/O error reading id list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: expected an eight digit member id, found '{value}'")]
    Malformed {
        path: PathBuf,
        line: usize,
        value: String,
    },
}

/// Failure talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure: DNS, connect, TLS, timeout.
    #[error("remote store unreachable: {0}")]
    Unreachable(String),

    /// The byte transfer to storage broke off after the store accepted the
    /// request. Fails only that file.
    #[error("transfer interrupted: {0}")]
    Interrupted(String),

    /// The store answered with an unexpected status code.
    #[error("remote store returned status {code}: {body}")]
    Status { code: u16, body: String },

    /// The response body could not be decoded.
    #[error("could not decode remote response: {0}")]
    Decode(String),

    /// Local I/O while streaming a request or response body.
    #[error("I/O error during remote call: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// `true` for failures that make every further call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

/// Per-file upload or download failure. Never aborts a whole plan on its own.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{size} bytes exceeds the {max} byte limit")]
    SizeExceeded { size: u64, max: u64 },

    #[error("the file is empty")]
    EmptyFile,

    #[error("local file vanished: {path}")]
    LocalMissing { path: PathBuf },

    #[error("remote store rejected the transfer: {0}")]
    Rejected(String),

    #[error("network failure: {0}")]
    Network(String),

    /// The transfer task died before reporting (a panic in the transport).
    #[error("transfer aborted: {0}")]
    Aborted(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<RemoteError> for TransferError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unreachable(msg) | RemoteError::Interrupted(msg) => {
                TransferError::Network(msg)
            }
            other => TransferError::Rejected(other.to_string()),
        }
    }
}

/// Convenience constructor for [`TransferError::Io`] that maps a missing
/// file to [`TransferError::LocalMissing`].
pub fn transfer_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TransferError {
    let path = path.into();
    if source.kind() == std::io::ErrorKind::NotFound {
        TransferError::LocalMissing { path }
    } else {
        TransferError::Io { path, source }
    }
}

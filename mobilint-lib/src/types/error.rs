use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::Backend;
use crate::report::ReportStatus;

/// Possible errors when interacting with `mobilint_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Any form of I/O error occurred while reading from a given path.
    #[error(
        "Failed to read from path: `{}`, reason: {}",
        .0.as_deref().and_then(Path::to_str).unwrap_or("<MALFORMED PATH>"),
        .1
    )]
    IoError(Option<PathBuf>, std::io::Error),

    /// Reqwest network error
    #[error("Network error while trying to connect to an endpoint via reqwest")]
    NetworkRequest(#[from] reqwest::Error),

    /// The given string is neither a GitHub repository URL nor a local directory
    #[error("Invalid repository source `{0}`: expected https://github.com/<owner>/<repo> or a local directory")]
    InvalidRepositoryUrl(String),

    /// The GitHub API answered with a non-success status
    #[error("GitHub API request to {url} failed with status {status}")]
    GitHubStatus {
        /// The endpoint that was called
        url: String,
        /// The returned HTTP status
        status: reqwest::StatusCode,
    },

    /// The GitHub API rate limit was still exhausted after waiting for it
    #[error("GitHub API rate limit exceeded for {0}")]
    GitHubRateLimited(String),

    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// The repository did not contain a single analyzable file
    #[error("No analyzable files found in {0}")]
    EmptyRepository(String),

    /// A remote backend answered with a non-success status
    #[error("Backend {backend} responded with status {status}")]
    BackendStatus {
        /// The backend that failed
        backend: Backend,
        /// The returned HTTP status
        status: reqwest::StatusCode,
    },

    /// A remote backend answered, but its response could not be understood
    #[error("Malformed response from backend {backend}: {reason}")]
    MalformedResponse {
        /// The backend that sent the response
        backend: Backend,
        /// Why the response was rejected
        reason: String,
    },

    /// No API key is configured for a remote backend
    #[error("No API key configured for backend {0}. Set `{env}` or add `api_key` to the config file.", env = .0.api_key_env())]
    MissingApiKey(Backend),

    /// A backend was configured to admit no request at all
    #[error("Backend {0} is configured with a capacity of 0. Remove it from `lanes` to disable it.")]
    ZeroCapacity(Backend),

    /// The configured endpoint cannot be used as a base URL
    #[error("Invalid backend endpoint `{0}`")]
    InvalidEndpoint(String),

    /// A backend name did not match any known backend
    #[error("Unknown backend `{0}`")]
    UnknownBackend(String),

    /// The backend is known but was not registered with the orchestrator
    #[error("Backend {0} is not registered")]
    BackendNotRegistered(Backend),

    /// Error while (de)serializing JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A finding was added to a report that is already completed or failed
    #[error("Report {id} is {status} and no longer accepts findings")]
    ReportClosed {
        /// The report id
        id: Uuid,
        /// The terminal status of the report
        status: ReportStatus,
    },

    /// A report status change that would move the report backwards
    #[error("Cannot move report from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status
        from: ReportStatus,
        /// Requested status
        to: ReportStatus,
    },

    /// The analysis was cancelled by the caller
    #[error("Analysis was cancelled")]
    Cancelled,

    /// A background task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl ErrorKind {
    /// Return more details about the given [`ErrorKind`], if any
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            ErrorKind::NetworkRequest(e) if e.is_timeout() => {
                Some("Request timed out. Raise `timeout` in the `[backends.<name>]` config table".to_string())
            }
            ErrorKind::GitHubRateLimited(_) => Some(
                "GitHub rate limit reached. Set `GITHUB_TOKEN` to raise the limit".to_string(),
            ),
            ErrorKind::GitHubStatus { status, .. } if status.as_u16() == 403 => Some(
                "GitHub denied access. Private repositories need a `GITHUB_TOKEN`".to_string(),
            ),
            ErrorKind::BackendStatus { status, .. } if status.as_u16() == 429 => {
                Some("The backend throttled the request".to_string())
            }
            _ => None,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<(PathBuf, std::io::Error)> for ErrorKind {
    fn from(value: (PathBuf, std::io::Error)) -> Self {
        Self::IoError(Some(value.0), value.1)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(None, e)
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Possible errors when decoding objects handed over by a source
#[derive(Error, Debug)]
pub enum Error {
    /// A field required to identify the object was absent or empty
    #[error("object is missing required field {0}")]
    MissingField(&'static str),

    /// The `resourceVersion` could not be read as an integer token
    #[error("invalid resourceVersion {0:?}: expected a decimal integer")]
    InvalidResourceVersion(String),

    /// The `creationTimestamp` was not RFC 3339
    #[error("invalid creationTimestamp {0:?}: {1}")]
    InvalidTimestamp(String, #[source] chrono::ParseError),

    /// The payload was not the expected JSON shape
    #[error("failed to decode object: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// An error response sent by the API, usually inside a watch stream.
#[derive(Error, Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[error("{message}: {reason}")]
pub struct ErrorResponse {
    /// The status
    #[serde(default)]
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error
    #[serde(default)]
    pub reason: String,
    /// The error code
    pub code: u16,
}

impl ErrorResponse {
    /// Whether the server reported that the requested resource version is too old
    ///
    /// A watch that receives this has to start over with a fresh list.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        self.code == 410
    }
}

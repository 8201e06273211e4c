//! Error types for storage node operations.

use http::StatusCode;

/// Errors that can occur when talking to a single storage node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected status returned by the node
    #[error("node responded with {0}: {1}")]
    Status(StatusCode, String),

    /// IO error while reading an object body
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The node could not be reached at all
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bucket creation lost a race, or the bucket was already there
    #[error("bucket '{0}' already exists")]
    BucketAlreadyExists(String),
}

/// Result type alias for storage node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

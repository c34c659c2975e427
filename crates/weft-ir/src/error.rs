//! Error types for the transcoding core.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, WeftError>;

/// Errors raised by the core. None of them abort a run: the pipeline turns
/// each one into a warning or a report entry.
#[derive(Error, Debug)]
pub enum WeftError {
    /// A patch names a node the graph does not contain.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A patch tried to add a class to a text node.
    #[error("node {0} is a text node")]
    TextNode(String),

    /// A removal targeted a node the diagnostics did not flag as phantom.
    #[error("node {0} is not flagged as phantom; removal refused")]
    NotPhantom(String),

    /// The input had no element to transcode.
    #[error("no root element")]
    NoRoot,

    /// JSON (de)serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

//! Domain-specific errors.

use thiserror::Error;

/// Failure kinds surfaced by the permalink pipeline.
///
/// Every kind is terminal: nothing in the pipeline retries or recovers locally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Missing or invalid invocation settings (window id, user, chunk size).
    #[error("{0}")]
    Config(String),
    /// The editor's file server or the requested window could not be reached.
    #[error("{0}")]
    Connection(String),
    /// A transport exchange was rejected or returned something unparsable.
    #[error("{0}")]
    Protocol(String),
    /// An external tool could not be started or exited unsuccessfully.
    #[error("{0}")]
    ExternalTool(String),
    /// Output of an external tool did not have the expected shape.
    #[error("{0}")]
    UnexpectedFormat(String),
}

//! Error types for the cache engine.

use std::{
    io,
    path::{Path, PathBuf},
};

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Failure classification for remote store I/O.
///
/// Transport-library specific errors are mapped into these variants at the
/// boundary, see [`crate::transport::RemoteTransport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("remote cache entry not found: {0}")]
    NotFound(String),
    #[error("remote cache rejected credentials: {0}")]
    Unauthorized(String),
    #[error("remote cache transport failed: {0}")]
    Transport(String),
}

impl TransportError {
    /// Returns `true` if the error only means the entry is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Various error types for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Invalid or unreadable cache configuration. Fatal at session start.
    #[error("invalid cache configuration: {0}")]
    Config(String),
    /// The configured hash algorithm is not registered.
    #[error("unknown hash algorithm {requested:?}, registered algorithms: {known:?}")]
    UnknownAlgorithm { requested: String, known: Vec<&'static str> },
    /// A reactor or snapshot dependency could not be resolved to a file.
    #[error("cannot resolve dependency {coordinates} of {project}: {reason}")]
    DependencyNotResolved { project: String, coordinates: String, reason: String },
    /// A record exists but its contents are inconsistent.
    #[error("cached build of {0} is corrupt: {1}")]
    Corrupt(String, String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Artifact restoration failed.
    #[error("failed to restore {0}: {1}")]
    Restore(String, String),
    /// The session was cancelled while a cache operation was in flight.
    #[error("cache operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] CacheIoError),
    #[error("failed to serialize {0}: {1}")]
    Xml(String, quick_xml::DeError),
    #[error("{0}")]
    Message(String),
}

impl CacheError {
    pub fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        CacheIoError::new(err, path).into()
    }

    pub fn config(msg: impl std::fmt::Display) -> Self {
        CacheError::Config(msg.to_string())
    }

    pub fn msg(msg: impl std::fmt::Display) -> Self {
        CacheError::Message(msg.to_string())
    }

    pub fn xml(what: impl std::fmt::Display, err: quick_xml::DeError) -> Self {
        CacheError::Xml(what.to_string(), err)
    }
}

/// An `io::Error` carrying the path that produced it.
#[derive(Debug, thiserror::Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct CacheIoError {
    io: io::Error,
    path: PathBuf,
}

impl CacheIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<CacheIoError> for io::Error {
    fn from(err: CacheIoError) -> Self {
        err.io
    }
}

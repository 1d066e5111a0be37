// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for topology operations.

use crate::keys::FaceId;

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration row or one of the owned relations is missing.
    #[error("no such topology: {0}")]
    NoSuchTopology(String),

    /// A topology name collides with existing relations.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Wrong value kind or shape at a primitive boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// SRID or dimensionality mismatch, or a geometry of the wrong kind.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("not isolated: {0}")]
    NotIsolated(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A graph-shape precondition of an edit primitive does not hold.
    #[error("{0}")]
    PreconditionFailed(String),

    /// A sub-insertion of a bulk import failed.
    #[error("import failed: {0}")]
    ImportFailed(#[source] Box<Error>),

    /// The validator could not run to completion.
    #[error("validation aborted: {0}")]
    ValidationAborted(String),

    /// The boundary of a face cannot be assembled into a polygon.
    #[error("no geometry for face {0}")]
    NoGeometry(FaceId),

    /// The accessor was destroyed, or its topology dropped.
    #[error("stale accessor for topology {0}")]
    StaleAccessor(String),

    /// Savepoint stack discipline violated.
    #[error("savepoint error: {0}")]
    Savepoint(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Geometry(#[from] planar_topo_geometry::Error),
}

impl Error {
    /// Wraps a sub-insertion failure; already wrapped errors are kept as is.
    pub fn import_failed(inner: Error) -> Self {
        match inner {
            Error::ImportFailed(_) => inner,
            other => Error::ImportFailed(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_failure_wraps_once() {
        let inner = Error::PreconditionFailed("coincident node".into());
        let wrapped = Error::import_failed(Error::import_failed(inner));
        match &wrapped {
            Error::ImportFailed(inner) => {
                assert!(matches!(**inner, Error::PreconditionFailed(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(wrapped.to_string(), "import failed: coincident node");
    }
}

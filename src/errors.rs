//! Error taxonomy shared by every core operation
//!
//! Each failure maps onto exactly one [`ErrorKind`]. Corruption errors are never
//! recoverable; `NotFound` usually is, and callers decide what "absent" means.

use crate::artifacts::objects::object_id::ObjectId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("object {oid} is corrupt: {reason}")]
    CorruptObject { oid: String, reason: String },

    #[error("index is corrupt: {reason}")]
    CorruptIndex { reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("operation requires a conflict-free index ({count} unmerged entries)")]
    UnmergedEntries { count: usize },

    #[error("no object database is bound to this index")]
    NoObjectDatabase,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Field-less mirror of [`Error`], convenient for matching on the category alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    CorruptObject,
    CorruptIndex,
    InvalidArgument,
    UnmergedEntries,
    NoObjectDatabase,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::CorruptObject { .. } => ErrorKind::CorruptObject,
            Error::CorruptIndex { .. } => ErrorKind::CorruptIndex,
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::UnmergedEntries { .. } => ErrorKind::UnmergedEntries,
            Error::NoObjectDatabase => ErrorKind::NoObjectDatabase,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    pub fn object_not_found(oid: &ObjectId) -> Self {
        Error::NotFound {
            what: format!("object {oid}"),
        }
    }

    pub fn corrupt_object(oid: impl ToString, reason: impl Into<String>) -> Self {
        Error::CorruptObject {
            oid: oid.to_string(),
            reason: reason.into(),
        }
    }

    /// Malformed object payload whose id is not known yet, see [`Error::at_object`]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::CorruptObject {
            oid: String::from("<unknown>"),
            reason: reason.into(),
        }
    }

    /// Attach the id of the object being decoded to a corruption error
    pub fn at_object(self, oid: &ObjectId) -> Self {
        match self {
            Error::CorruptObject { reason, .. } => Error::CorruptObject {
                oid: oid.to_string(),
                reason,
            },
            other => other,
        }
    }

    pub fn corrupt_index(reason: impl Into<String>) -> Self {
        Error::CorruptIndex {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//! Model errors and the caller-facing error taxonomy.
//!
//! [`ModelError`] covers failures of the model layer itself (bad references,
//! type-system problems, documents that do not map back to records).
//! [`RepositoryError`] is what every public repository operation returns: one
//! of five families, each carrying a precise [`ErrorKind`]. It is `Clone` and
//! serializable so a copy can sit in a side table until the caller collects it.

use eavmeta_store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while building or reading model records.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid record reference: {0}")]
    InvalidReference(String),

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("invalid type system: {0}")]
    InvalidTypeSystem(String),

    #[error("document {doc} cannot be mapped: {message}")]
    Mapping { doc: String, message: String },

    #[error("relationship {guid} has an unresolvable {end}")]
    InconsistentRelationship { guid: String, end: &'static str },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    pub fn mapping(doc: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Mapping {
            doc: doc.to_string(),
            message: message.into(),
        }
    }
}

/// The five error families callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorFamily {
    NotFound,
    State,
    Validation,
    Conflict,
    Infrastructure,
}

/// Precise reason for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotKnown,
    ProxyOnly,
    AlreadyDeleted,
    NotDeleted,
    ClassificationAlreadyPresent,
    ClassificationNotPresent,
    NullRequiredProperty,
    InvalidClassificationForEntity,
    InvalidPropertyForType,
    InvalidType,
    InvalidParameter,
    StatusNotSupported,
    InvalidSearchPattern,
    NotLocal,
    DuplicateReference,
    QueryTimeout,
    CommitTimeout,
    SnapshotRelease,
    FunctionFault,
    InconsistentRelationship,
    StoreFailure,
}

impl ErrorKind {
    pub fn family(self) -> ErrorFamily {
        use ErrorKind::*;
        match self {
            NotKnown => ErrorFamily::NotFound,
            ProxyOnly | AlreadyDeleted | NotDeleted | ClassificationAlreadyPresent | ClassificationNotPresent => {
                ErrorFamily::State
            }
            NullRequiredProperty
            | InvalidClassificationForEntity
            | InvalidPropertyForType
            | InvalidType
            | InvalidParameter
            | StatusNotSupported
            | InvalidSearchPattern => ErrorFamily::Validation,
            NotLocal | DuplicateReference => ErrorFamily::Conflict,
            QueryTimeout | CommitTimeout | SnapshotRelease | FunctionFault | InconsistentRelationship | StoreFailure => {
                ErrorFamily::Infrastructure
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        use ErrorKind::*;
        match self {
            NotKnown => "NOT_KNOWN",
            ProxyOnly => "PROXY_ONLY",
            AlreadyDeleted => "ALREADY_DELETED",
            NotDeleted => "NOT_DELETED",
            ClassificationAlreadyPresent => "CLASSIFICATION_ALREADY_PRESENT",
            ClassificationNotPresent => "CLASSIFICATION_NOT_PRESENT",
            NullRequiredProperty => "NULL_REQUIRED_PROPERTY",
            InvalidClassificationForEntity => "INVALID_CLASSIFICATION_FOR_ENTITY",
            InvalidPropertyForType => "INVALID_PROPERTY_FOR_TYPE",
            InvalidType => "INVALID_TYPE",
            InvalidParameter => "INVALID_PARAMETER",
            StatusNotSupported => "STATUS_NOT_SUPPORTED",
            InvalidSearchPattern => "INVALID_SEARCH_PATTERN",
            NotLocal => "NOT_LOCAL",
            DuplicateReference => "DUPLICATE_REFERENCE",
            QueryTimeout => "QUERY_TIMEOUT",
            CommitTimeout => "COMMIT_TIMEOUT",
            SnapshotRelease => "SNAPSHOT_RELEASE",
            FunctionFault => "FUNCTION_FAULT",
            InconsistentRelationship => "INCONSISTENT_RELATIONSHIP",
            StoreFailure => "STORE_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type returned by public repository operations.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryError {
    #[error("not found [{kind}]: {message}")]
    NotFound { kind: ErrorKind, message: String },

    #[error("invalid state [{kind}]: {message}")]
    State { kind: ErrorKind, message: String },

    #[error("validation failed [{kind}]: {message}")]
    Validation { kind: ErrorKind, message: String },

    #[error("conflict [{kind}]: {message}")]
    Conflict { kind: ErrorKind, message: String },

    #[error("infrastructure failure [{kind}]: {message}")]
    Infrastructure { kind: ErrorKind, message: String },
}

impl RepositoryError {
    /// Build the error of the family that `kind` belongs to.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind.family() {
            ErrorFamily::NotFound => Self::NotFound { kind, message },
            ErrorFamily::State => Self::State { kind, message },
            ErrorFamily::Validation => Self::Validation { kind, message },
            ErrorFamily::Conflict => Self::Conflict { kind, message },
            ErrorFamily::Infrastructure => Self::Infrastructure { kind, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { kind, .. }
            | Self::State { kind, .. }
            | Self::Validation { kind, .. }
            | Self::Conflict { kind, .. }
            | Self::Infrastructure { kind, .. } => *kind,
        }
    }

    pub fn family(&self) -> ErrorFamily {
        self.kind().family()
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound { message, .. }
            | Self::State { message, .. }
            | Self::Validation { message, .. }
            | Self::Conflict { message, .. }
            | Self::Infrastructure { message, .. } => message,
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::Timeout { .. } => ErrorKind::QueryTimeout,
            StoreError::CommitTimeout(_) => ErrorKind::CommitTimeout,
            StoreError::SnapshotClosed(_) => ErrorKind::SnapshotRelease,
            StoreError::InvalidQuery(_) => ErrorKind::InvalidSearchPattern,
            StoreError::UnknownTransaction(_) | StoreError::DuplicateFunction(_) | StoreError::Unavailable(_) => {
                ErrorKind::StoreFailure
            }
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ModelError> for RepositoryError {
    fn from(err: ModelError) -> Self {
        let kind = match &err {
            ModelError::InvalidReference(_) => ErrorKind::InvalidParameter,
            ModelError::UnknownType(_) => ErrorKind::InvalidType,
            ModelError::InconsistentRelationship { .. } => ErrorKind::InconsistentRelationship,
            ModelError::InvalidTypeSystem(_) | ModelError::Mapping { .. } | ModelError::Serialization(_) => {
                ErrorKind::StoreFailure
            }
        };
        Self::new(kind, err.to_string())
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query error types.

use eavmeta_model::{ErrorKind, ModelError, RepositoryError};
use eavmeta_store::StoreError;
use thiserror::Error;

/// Errors that can occur while compiling or running a search.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("type {name} is not of category {expected}")]
    WrongCategory { name: String, expected: &'static str },

    #[error("invalid search pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("entity not known: {0}")]
    UnknownRoot(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<QueryError> for RepositoryError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Store(e) => e.into(),
            QueryError::Model(e) => e.into(),
            QueryError::UnknownType(_) | QueryError::WrongCategory { .. } => {
                RepositoryError::new(ErrorKind::InvalidType, err.to_string())
            }
            QueryError::InvalidPattern { .. } => RepositoryError::new(ErrorKind::InvalidSearchPattern, err.to_string()),
            QueryError::UnknownRoot(_) => RepositoryError::new(ErrorKind::NotKnown, err.to_string()),
        }
    }
}

//! Errors of the decision point and its policy stores.

use xacml_common::{
    evaluator::EvaluationError,
    policy::{PolicyError, ValidationError},
};

/// Errors from policy storage, indexing and evaluation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A document failed schema validation.
    #[error("policy validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A document could not be analyzed as a policy.
    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),

    /// No policy with the given id exists.
    #[error("policy not found: {0}")]
    NotFound(String),

    /// A policy with the given id already exists.
    #[error("duplicate policy id: {0}")]
    Duplicate(String),

    /// An update carried a document declaring a different policy id.
    #[error("policy id mismatch: updating {expected} with a document declaring {actual}")]
    IdMismatch {
        /// The id being updated.
        expected: String,
        /// The id declared by the new document.
        actual: String,
    },

    /// The storage medium failed.
    #[error("store error: {0}")]
    Store(anyhow::Error),

    /// A transaction could not be committed.
    #[error("transaction error: {0}")]
    Transaction(anyhow::Error),

    /// Evaluation failed.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Store(anyhow::Error::from(err))
}

pub(crate) fn transaction(err: impl Into<anyhow::Error>) -> Error {
    Error::Transaction(err.into())
}

pub(crate) fn retrieval(err: Error) -> EvaluationError {
    EvaluationError::Retrieval(anyhow::Error::from(err))
}

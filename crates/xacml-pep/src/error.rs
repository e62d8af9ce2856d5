//! Enforcement errors.

use xacml_common::evaluator::EvaluationError;

/// Errors raised while enforcing policy on a request or response.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The request cannot be interpreted.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The decision point did not permit the request.
    #[error("access denied")]
    AccessDenied,

    /// The decision point failed.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// A response body could not be parsed for filtering.
    #[error("response cannot be filtered: {0}")]
    ResponseParse(anyhow::Error),

    /// Other failure.
    #[error("enforcement failed: {0}")]
    Unclassified(anyhow::Error),
}

pub(crate) fn bad_request(msg: impl Into<String>) -> Error {
    Error::BadRequest(msg.into())
}

pub(crate) fn response_parse(err: impl Into<anyhow::Error>) -> Error {
    Error::ResponseParse(err.into())
}

pub(crate) fn unclassified(err: impl Into<anyhow::Error>) -> Error {
    Error::Unclassified(err.into())
}

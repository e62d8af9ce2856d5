//! The boundary between enforcement and decision.

use std::{future::Future, pin::Pin};

use crate::{context::RequestContext, decision::DecisionResult};

/// A boxed future returned by [DecisionEvaluator] methods.
pub type EvalFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EvaluationError>> + Send + 'a>>;

/// The decision engine failed.
#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    /// Candidate policies could not be retrieved.
    #[error("policy retrieval failed: {0}")]
    Retrieval(anyhow::Error),

    /// A batch produced a different number of results than requests.
    #[error("expected {expected} decision results, got {actual}")]
    ResultCount {
        /// Number of requests submitted.
        expected: usize,
        /// Number of results received.
        actual: usize,
    },

    /// Other engine failure.
    #[error("evaluation failed: {0}")]
    Engine(anyhow::Error),
}

/// Something that turns request contexts into decisions.
///
/// Implementations return exactly one [DecisionResult] per request, carrying the request's
/// `resource-id` so that callers can correlate results with their origin.
pub trait DecisionEvaluator: Send + Sync {
    /// Evaluate one request.
    fn evaluate(&self, request: RequestContext) -> EvalFuture<'_, DecisionResult>;

    /// Evaluate a batch of requests.
    ///
    /// The default implementation evaluates the requests one by one and fails as a whole
    /// if any of them fails.
    fn evaluate_batch(&self, requests: Vec<RequestContext>) -> EvalFuture<'_, Vec<DecisionResult>> {
        Box::pin(async move {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.evaluate(request).await?);
            }
            Ok(results)
        })
    }
}

/// Evaluate a batch and verify that the evaluator honoured the one-result-per-request contract.
pub async fn evaluate_batch_checked(
    evaluator: &dyn DecisionEvaluator,
    requests: Vec<RequestContext>,
) -> Result<Vec<DecisionResult>, EvaluationError> {
    let expected = requests.len();
    let results = evaluator.evaluate_batch(requests).await?;

    if results.len() != expected {
        return Err(EvaluationError::ResultCount {
            expected,
            actual: results.len(),
        });
    }

    Ok(results)
}

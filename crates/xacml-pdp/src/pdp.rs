//! The policy decision point.

use std::sync::Arc;

use tracing::{debug, error};
use xacml_common::{
    context::RequestContext,
    decision::{DecisionResult, Status},
    evaluator::{DecisionEvaluator, EvalFuture, EvaluationError},
    id::xacml,
    policy::PolicyDocument,
};

use crate::{
    engine::{NoOpPolicyTracer, PolicyTracer, TargetEvaluator},
    error,
    index::PolicyIndex,
};

/// Decides requests by evaluating the candidate policies an index returns.
pub struct PolicyDecisionPoint {
    index: Arc<dyn PolicyIndex>,
    evaluator: TargetEvaluator,
}

impl PolicyDecisionPoint {
    /// A decision point over `index`.
    pub fn new(index: Arc<dyn PolicyIndex>) -> Self {
        Self {
            index,
            evaluator: TargetEvaluator,
        }
    }

    /// Decide one request, reporting to `tracer`.
    ///
    /// Fails only when candidates cannot be retrieved. Evaluation problems yield an
    /// `Indeterminate` result with an error status.
    pub fn decide(
        &self,
        request: &RequestContext,
        tracer: &mut impl PolicyTracer,
    ) -> Result<DecisionResult, EvaluationError> {
        let resource_id = request.resource_id();

        let candidates = self.index.candidates(request).map_err(|err| {
            error!(%err, "candidate retrieval failed");
            error::retrieval(err)
        })?;

        let mut candidates: Vec<(String, Vec<u8>)> = candidates.into_iter().collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut policies = Vec::with_capacity(candidates.len());
        for (id, bytes) in candidates {
            match PolicyDocument::parse(&bytes) {
                Ok(policy) => policies.push(policy),
                Err(err) => {
                    error!(policy_id = %id, %err, "stored policy cannot be analyzed");
                    return Ok(DecisionResult::indeterminate(
                        resource_id,
                        Status::error(xacml::STATUS_SYNTAX_ERROR, err.to_string()),
                    ));
                }
            }
        }

        let result = match self.evaluator.eval(request, &policies, tracer) {
            Ok(decision) => DecisionResult::new(resource_id, decision),
            Err(err) => DecisionResult::indeterminate(
                resource_id,
                Status::error(xacml::STATUS_PROCESSING_ERROR, err.to_string()),
            ),
        };

        debug!(
            resource_id = result.resource_id.as_deref(),
            decision = ?result.decision,
            candidates = policies.len(),
            "decided request"
        );

        Ok(result)
    }
}

impl DecisionEvaluator for PolicyDecisionPoint {
    fn evaluate(&self, request: RequestContext) -> EvalFuture<'_, DecisionResult> {
        Box::pin(async move { self.decide(&request, &mut NoOpPolicyTracer) })
    }
}

use std::sync::Arc;

use xacml_common::{
    config::{Backend, StoreConfig},
    context::RequestContext,
    decision::{Decision, DecisionResult},
    evaluator::{evaluate_batch_checked, DecisionEvaluator, EvalFuture, EvaluationError},
};
use xacml_pdp::{
    engine::LogPolicyTracer,
    pdp::PolicyDecisionPoint,
    store::{open_store, StoreHandle},
};

use crate::fixtures::{deny_below, deny_pid, permit_all, request};

fn decision_point(dir: &tempfile::TempDir, backend: Backend) -> PolicyDecisionPoint {
    let config = StoreConfig::new(dir.path()).with_backend(backend);
    let handle = open_store(&config).unwrap();

    match (&handle, backend) {
        (StoreHandle::File(_), Backend::File) | (StoreHandle::Indexed(_), Backend::Indexed) => {}
        _ => panic!("wrong backend opened"),
    }

    let store = handle.store();
    store.add_policy(permit_all("permit-all").as_bytes(), None).unwrap();
    store
        .add_policy(deny_pid("deny-demo-2", "demo:2").as_bytes(), None)
        .unwrap();

    PolicyDecisionPoint::new(handle.index())
}

#[test_log::test(tokio::test)]
async fn decides_with_both_backends() {
    for backend in [Backend::File, Backend::Indexed] {
        let dir = tempfile::tempdir().unwrap();
        let pdp = decision_point(&dir, backend);

        let permitted = pdp
            .evaluate(request("alice", "demo:1", "/demo:1"))
            .await
            .unwrap();
        assert_eq!(permitted.decision, Decision::Permit);
        assert_eq!(permitted.resource_id.as_deref(), Some("/demo:1"));
        assert!(permitted.is_permitted());

        let denied = pdp
            .decide(&request("alice", "demo:2", "/demo:2"), &mut LogPolicyTracer)
            .unwrap();
        assert_eq!(denied.decision, Decision::Deny);
        assert!(!denied.is_permitted());
    }
}

#[test_log::test(tokio::test)]
async fn batch_results_correlate_by_resource_id() {
    let dir = tempfile::tempdir().unwrap();
    let pdp = decision_point(&dir, Backend::Indexed);

    let requests = ["demo:1", "demo:2", "demo:3"]
        .into_iter()
        .map(|pid| request("alice", pid, &format!("/{pid}")))
        .collect();

    let results = evaluate_batch_checked(&pdp, requests).await.unwrap();
    let summary: Vec<(Option<&str>, Decision)> = results
        .iter()
        .map(|result| (result.resource_id.as_deref(), result.decision))
        .collect();

    assert_eq!(
        summary,
        [
            (Some("/demo:1"), Decision::Permit),
            (Some("/demo:2"), Decision::Deny),
            (Some("/demo:3"), Decision::Permit),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn no_applicable_policy() {
    let dir = tempfile::tempdir().unwrap();
    let handle = open_store(&StoreConfig::new(dir.path()).with_backend(Backend::Indexed)).unwrap();
    handle
        .store()
        .add_policy(deny_pid("deny-demo-2", "demo:2").as_bytes(), None)
        .unwrap();
    let pdp = PolicyDecisionPoint::new(handle.index());

    let result = pdp
        .evaluate(request("alice", "demo:1", "/demo:1"))
        .await
        .unwrap();
    assert_eq!(result.decision, Decision::NotApplicable);
    assert!(!result.is_permitted());
}

#[test_log::test(tokio::test)]
async fn backends_agree_on_trailing_slash_resource_ids() {
    let mut decisions = vec![];

    for backend in [Backend::File, Backend::Indexed] {
        let dir = tempfile::tempdir().unwrap();
        let handle = open_store(&StoreConfig::new(dir.path()).with_backend(backend)).unwrap();
        let store = handle.store();
        store.add_policy(permit_all("permit-all").as_bytes(), None).unwrap();
        store
            .add_policy(deny_below("deny-dc", "/demo:1/DC").as_bytes(), None)
            .unwrap();
        let pdp = PolicyDecisionPoint::new(handle.index());

        let below = pdp
            .evaluate(request("alice", "demo:1", "/demo:1/DC/"))
            .await
            .unwrap();
        let exact = pdp
            .evaluate(request("alice", "demo:1", "/demo:1/DC"))
            .await
            .unwrap();
        decisions.push((below.decision, exact.decision));
    }

    assert_eq!(
        decisions,
        [
            (Decision::Deny, Decision::Permit),
            (Decision::Deny, Decision::Permit),
        ]
    );
}

/// Loses the first request of every batch.
struct Lossy(Arc<PolicyDecisionPoint>);

impl DecisionEvaluator for Lossy {
    fn evaluate(&self, request: RequestContext) -> EvalFuture<'_, DecisionResult> {
        self.0.evaluate(request)
    }

    fn evaluate_batch(&self, requests: Vec<RequestContext>) -> EvalFuture<'_, Vec<DecisionResult>> {
        Box::pin(async move {
            let mut results = vec![];
            for request in requests.into_iter().skip(1) {
                results.push(self.0.evaluate(request).await?);
            }
            Ok(results)
        })
    }
}

#[test_log::test(tokio::test)]
async fn result_count_mismatch_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let lossy = Lossy(Arc::new(decision_point(&dir, Backend::File)));

    let result = evaluate_batch_checked(
        &lossy,
        vec![
            request("alice", "demo:1", "/demo:1"),
            request("alice", "demo:2", "/demo:2"),
        ],
    )
    .await;

    assert!(matches!(
        result,
        Err(EvaluationError::ResultCount {
            expected: 2,
            actual: 1
        })
    ));
}

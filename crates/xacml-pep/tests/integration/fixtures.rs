use std::sync::Arc;

use xacml_common::{
    config::{Backend, StoreConfig},
    id::{repository, xacml},
};
use xacml_pdp::{pdp::PolicyDecisionPoint, store::open_store};
use xacml_pep::{context::ContextBuilder, filter::Enforcer};

/// A policy permitting everything to everyone.
pub fn permit_all(id: &str) -> String {
    format!(
        r#"<Policy xmlns="urn:oasis:names:tc:xacml:1.0:policy" PolicyId="{id}"
    RuleCombiningAlgId="urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable">
  <Target>
    <Subjects><AnySubject/></Subjects>
    <Actions><AnyAction/></Actions>
  </Target>
  <Rule RuleId="permit" Effect="Permit"/>
</Policy>
"#
    )
}

/// A policy denying everything where resource attribute `attribute` equals `value`.
pub fn deny_resource(id: &str, attribute: &str, value: &str) -> String {
    format!(
        r#"<Policy xmlns="urn:oasis:names:tc:xacml:1.0:policy" PolicyId="{id}"
    RuleCombiningAlgId="urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable">
  <Target>
    <Resources>
      <Resource>
        <ResourceMatch MatchId="urn:oasis:names:tc:xacml:1.0:function:string-equal">
          <AttributeValue DataType="http://www.w3.org/2001/XMLSchema#string">{value}</AttributeValue>
          <ResourceAttributeDesignator AttributeId="{attribute}"
              DataType="http://www.w3.org/2001/XMLSchema#string"/>
        </ResourceMatch>
      </Resource>
    </Resources>
  </Target>
  <Rule RuleId="deny" Effect="Deny"/>
</Policy>
"#
    )
}

pub fn deny_pid(id: &str, pid: &str) -> String {
    deny_resource(id, repository::OBJECT_PID, pid)
}

pub fn deny_resource_id(id: &str, resource_id: &str) -> String {
    deny_resource(id, xacml::RESOURCE_ID, resource_id)
}

/// A decision point over a fresh store holding `policies`.
pub fn decision_point(
    dir: &tempfile::TempDir,
    backend: Backend,
    policies: &[String],
) -> Arc<PolicyDecisionPoint> {
    let handle = open_store(&StoreConfig::new(dir.path()).with_backend(backend)).unwrap();
    for policy in policies {
        handle.store().add_policy(policy.as_bytes(), None).unwrap();
    }
    Arc::new(PolicyDecisionPoint::new(handle.index()))
}

/// An enforcer where everything is permitted except object `demo:2`.
pub fn demo_enforcer(dir: &tempfile::TempDir, backend: Backend) -> Enforcer {
    let pdp = decision_point(
        dir,
        backend,
        &[permit_all("permit-all"), deny_pid("deny-demo-2", "demo:2")],
    );
    Enforcer::with_default_filters(pdp, ContextBuilder::new())
}

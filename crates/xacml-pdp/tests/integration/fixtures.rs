use xacml_common::{
    attribute::AttributeValue,
    context::RequestContext,
    id::{repository, xacml},
};

/// A policy without Target restrictions on resources.
pub fn permit_all(id: &str) -> String {
    format!(
        r#"<Policy xmlns="urn:oasis:names:tc:xacml:1.0:policy" PolicyId="{id}"
    RuleCombiningAlgId="urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable">
  <Description>permit everything</Description>
  <Target>
    <Subjects><AnySubject/></Subjects>
    <Actions><AnyAction/></Actions>
  </Target>
  <Rule RuleId="permit" Effect="Permit"/>
</Policy>
"#
    )
}

/// A policy denying everything on one object.
pub fn deny_pid(id: &str, pid: &str) -> String {
    format!(
        r#"<Policy xmlns="urn:oasis:names:tc:xacml:1.0:policy" PolicyId="{id}"
    RuleCombiningAlgId="urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable">
  <Target>
    <Resources>
      <Resource>
        <ResourceMatch MatchId="urn:oasis:names:tc:xacml:1.0:function:string-equal">
          <AttributeValue DataType="http://www.w3.org/2001/XMLSchema#string">{pid}</AttributeValue>
          <ResourceAttributeDesignator AttributeId="{}"
              DataType="http://www.w3.org/2001/XMLSchema#string"/>
        </ResourceMatch>
      </Resource>
    </Resources>
  </Target>
  <Rule RuleId="deny" Effect="Deny"/>
</Policy>
"#,
        repository::OBJECT_PID
    )
}

/// A policy denying everything below a resource-id prefix.
pub fn deny_below(id: &str, prefix: &str) -> String {
    format!(
        r#"<Policy xmlns="urn:oasis:names:tc:xacml:2.0:policy:schema:os" PolicyId="{id}"
    RuleCombiningAlgId="urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable">
  <Target>
    <Resources>
      <Resource>
        <ResourceMatch MatchId="urn:oasis:names:tc:xacml:2.0:function:string-regexp-match">
          <AttributeValue DataType="http://www.w3.org/2001/XMLSchema#string">{prefix}/.*</AttributeValue>
          <ResourceAttributeDesignator AttributeId="{}"
              DataType="http://www.w3.org/2001/XMLSchema#string"/>
        </ResourceMatch>
      </Resource>
    </Resources>
  </Target>
  <Rule RuleId="deny" Effect="Deny"/>
</Policy>
"#,
        xacml::RESOURCE_ID
    )
}

pub fn request(subject: &str, pid: &str, resource_id: &str) -> RequestContext {
    RequestContext::builder()
        .subject_attribute(xacml::SUBJECT_ID, AttributeValue::string(subject))
        .subject_attribute(repository::SUBJECT_LOGIN_ID, AttributeValue::string(subject))
        .resource_attribute(repository::OBJECT_PID, AttributeValue::string(pid))
        .resource_attribute(xacml::RESOURCE_ID, AttributeValue::string(resource_id))
        .action_attribute(
            repository::ACTION_ID,
            AttributeValue::string(format!("{}getObjectProfile", repository::ACTION_ID_PREFIX)),
        )
        .build()
}

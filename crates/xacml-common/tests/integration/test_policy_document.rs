use indoc::indoc;
use xacml_common::{
    attribute::{AttributeType, Category},
    id::{function, xacml, XACML_2_POLICY_NS},
    policy::{Effect, PolicyDocument, PolicyKind, SchemaValidator},
};

const POLICY_SET: &str = indoc! {r#"
    <PolicySet xmlns="urn:oasis:names:tc:xacml:2.0:policy:schema:os"
        PolicySetId="fedora-api-m"
        PolicyCombiningAlgId="urn:oasis:names:tc:xacml:1.0:policy-combining-algorithm:deny-overrides">
      <Target>
        <Actions>
          <Action>
            <ActionMatch MatchId="urn:oasis:names:tc:xacml:1.0:function:string-equal">
              <AttributeValue DataType="http://www.w3.org/2001/XMLSchema#string">urn:fedora:names:fedora:2.1:action:api-m</AttributeValue>
              <ActionAttributeDesignator AttributeId="urn:fedora:names:fedora:2.1:action:api"
                  DataType="http://www.w3.org/2001/XMLSchema#string"/>
            </ActionMatch>
          </Action>
        </Actions>
      </Target>
      <Policy PolicyId="deny-purge"
          RuleCombiningAlgId="urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable">
        <Target>
          <Resources>
            <Resource>
              <ResourceMatch MatchId="urn:oasis:names:tc:xacml:2.0:function:string-regexp-match">
                <AttributeValue DataType="http://www.w3.org/2001/XMLSchema#string">/demo:2/.*</AttributeValue>
                <ResourceAttributeDesignator AttributeId="urn:oasis:names:tc:xacml:1.0:resource:resource-id"
                    DataType="http://www.w3.org/2001/XMLSchema#string"/>
              </ResourceMatch>
            </Resource>
          </Resources>
        </Target>
        <Rule RuleId="deny" Effect="Deny"/>
      </Policy>
    </PolicySet>
"#};

#[test_log::test]
fn policy_set_is_valid_and_analyzed() {
    SchemaValidator::xacml()
        .validate(POLICY_SET.as_bytes())
        .unwrap();

    let doc = PolicyDocument::parse(POLICY_SET.as_bytes()).unwrap();
    assert_eq!(doc.id, "fedora-api-m");
    assert_eq!(doc.kind, PolicyKind::PolicySet);
    assert_eq!(doc.namespace.as_deref(), Some(XACML_2_POLICY_NS));

    let metadata = doc.metadata();
    assert!(metadata.any_subject);
    assert!(metadata.any_resource);
    assert!(!metadata.any_action);

    let [child] = doc.children.as_slice() else {
        panic!("expected one nested policy");
    };
    assert_eq!(child.id, "deny-purge");
    assert!(!child.metadata().any_resource);
    assert_eq!(child.rules[0].effect, Effect::Deny);

    let m = child
        .target
        .category(Category::Resource)
        .matches()
        .next()
        .unwrap();
    assert_eq!(m.match_id, function::STRING_REGEXP_MATCH_2);
    assert_eq!(m.attribute_id.as_deref(), Some(xacml::RESOURCE_ID));
    assert_eq!(m.data_type, Some(AttributeType::String));
    assert_eq!(m.value, "/demo:2/.*");
}

#[test_log::test]
fn empty_category_element_is_wildcard() {
    let doc = PolicyDocument::parse(
        indoc! {r#"
            <Policy xmlns="urn:oasis:names:tc:xacml:1.0:policy" PolicyId="p" RuleCombiningAlgId="a">
              <Target><Subjects/><Resources><AnyResource/></Resources></Target>
            </Policy>
        "#}
        .as_bytes(),
    )
    .unwrap();

    for category in Category::ALL {
        assert!(doc.metadata().any(category), "{category}");
    }
}

use std::fs;

use indoc::indoc;
use xacml_common::policy::{SchemaValidator, ValidationError};

const XSD: &str = indoc! {r#"
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
               xmlns:xacml="urn:oasis:names:tc:xacml:2.0:policy:schema:os"
               targetNamespace="urn:oasis:names:tc:xacml:2.0:policy:schema:os"
               elementFormDefault="qualified">
      <xs:element name="Policy" type="xacml:PolicyType"/>
      <xs:complexType name="PolicyType">
        <xs:sequence>
          <xs:element ref="xacml:Description" minOccurs="0"/>
          <xs:element ref="xacml:Target"/>
          <xs:element ref="xacml:Rule" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
        <xs:attribute name="PolicyId" type="xs:anyURI" use="required"/>
        <xs:attribute name="RuleCombiningAlgId" type="xs:anyURI" use="required"/>
      </xs:complexType>

      <xs:element name="Description" type="xs:string"/>

      <xs:element name="Target">
        <xs:complexType>
          <xs:sequence>
            <xs:element ref="xacml:Resources" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="Resources">
        <xs:complexType>
          <xs:sequence>
            <xs:any processContents="lax" minOccurs="0" maxOccurs="unbounded"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>

      <xs:element name="Rule" type="xacml:RuleType"/>
      <xs:complexType name="RuleType">
        <xs:sequence>
          <xs:element ref="xacml:Target" minOccurs="0"/>
          <xs:element ref="xacml:Condition" minOccurs="0"/>
        </xs:sequence>
        <xs:attribute name="RuleId" type="xs:string" use="required"/>
        <xs:attribute name="Effect" type="xacml:EffectType" use="required"/>
      </xs:complexType>
      <xs:simpleType name="EffectType">
        <xs:restriction base="xs:string">
          <xs:enumeration value="Permit"/>
          <xs:enumeration value="Deny"/>
        </xs:restriction>
      </xs:simpleType>

      <xs:element name="Condition">
        <xs:complexType>
          <xs:sequence>
            <xs:element ref="xacml:Expression"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="Expression" type="xacml:ExpressionType" abstract="true"/>
      <xs:complexType name="ExpressionType" abstract="true"/>
      <xs:element name="Apply" type="xacml:ApplyType" substitutionGroup="xacml:Expression"/>
      <xs:complexType name="ApplyType">
        <xs:complexContent>
          <xs:extension base="xacml:ExpressionType">
            <xs:sequence>
              <xs:element ref="xacml:Expression" minOccurs="0" maxOccurs="unbounded"/>
            </xs:sequence>
            <xs:attribute name="FunctionId" type="xs:anyURI" use="required"/>
          </xs:extension>
        </xs:complexContent>
      </xs:complexType>
    </xs:schema>
"#};

fn validator() -> SchemaValidator {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("policy.xsd"), XSD).unwrap();
    SchemaValidator::from_location("policy.xsd", Some(dir.path())).unwrap()
}

fn policy(body: &str) -> String {
    format!(
        r#"<Policy xmlns="urn:oasis:names:tc:xacml:2.0:policy:schema:os" PolicyId="p" RuleCombiningAlgId="urn:alg">{body}</Policy>"#
    )
}

#[track_caller]
fn assert_invalid(validator: &SchemaValidator, body: &str, expected_path: &str) {
    match validator.validate(policy(body).as_bytes()) {
        Err(ValidationError::Invalid { path, .. }) => assert_eq!(path, expected_path, "{body}"),
        other => panic!("expected {body} to be rejected, got {other:?}"),
    }
}

#[test_log::test]
fn accepts_documents_the_schema_describes() {
    let validator = validator();
    validator
        .validate(
            policy(indoc! {r#"
                <Description>demo</Description>
                <Target>
                  <Resources><Resource xmlns="urn:other"/></Resources>
                </Target>
                <Rule RuleId="r1" Effect="Permit">
                  <Condition>
                    <Apply FunctionId="urn:and"><Apply FunctionId="urn:true"/></Apply>
                  </Condition>
                </Rule>
                <Rule RuleId="r2" Effect="Deny"/>
            "#})
            .as_bytes(),
        )
        .unwrap();
}

#[test_log::test]
fn rejects_element_order_the_structural_check_allows() {
    let body = r#"<Rule RuleId="r" Effect="Permit"/><Target/>"#;
    SchemaValidator::xacml()
        .validate(policy(body).as_bytes())
        .unwrap();

    assert_invalid(&validator(), body, "/Policy/Rule");
}

#[test_log::test]
fn rejects_schema_violations() {
    let validator = validator();

    assert_invalid(&validator, r#"<Rule RuleId="r" Effect="Permit"/>"#, "/Policy/Rule");
    assert_invalid(&validator, r#"<Target Extra="x"/>"#, "/Policy/Target");
    assert_invalid(
        &validator,
        r#"<Target/><Rule RuleId="r" Effect="Maybe"/>"#,
        "/Policy/Rule",
    );
    assert_invalid(
        &validator,
        r#"<Target/><Rule RuleId="r" Effect="Permit"><Condition><Expression/></Condition></Rule>"#,
        "/Policy/Rule/Condition/Expression",
    );
    assert_invalid(
        &validator,
        r#"<Target/><Rule RuleId="r" Effect="Permit"><Condition><Apply/></Condition></Rule>"#,
        "/Policy/Rule/Condition/Apply",
    );
    assert_invalid(&validator, "<Target/>stray", "/Policy");
}

#[test_log::test]
fn rejects_undeclared_root() {
    let err = validator()
        .validate(br#"<PolicySet xmlns="urn:oasis:names:tc:xacml:2.0:policy:schema:os"/>"#)
        .unwrap_err();
    assert!(matches!(err, ValidationError::Invalid { .. }));
}

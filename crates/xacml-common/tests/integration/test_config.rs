use std::fs;

use indoc::indoc;
use xacml_common::{
    attribute::{AttributeType, Category},
    config::{Backend, ConfigError, StoreConfig},
    id::repository,
    policy::SchemaSource,
};

const XSD: &str = indoc! {r#"
    <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
               targetNamespace="urn:oasis:names:tc:xacml:2.0:policy:schema:os"/>
"#};

#[test_log::test]
fn load_toml_resolves_schema_relative_to_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("schema")).unwrap();
    fs::write(dir.path().join("schema/policy.xsd"), XSD).unwrap();

    let path = dir.path().join("store.toml");
    fs::write(
        &path,
        indoc! {r#"
            directory = "/srv/policies"
            backend = "indexed"

            [validation]
            schema = "schema/policy.xsd"

            [[index-map.action]]
            id = "urn:fedora:names:fedora:2.1:action:id"
            type = "string"
        "#},
    )
    .unwrap();

    let config = StoreConfig::load(&path).unwrap();
    assert_eq!(config.backend, Backend::Indexed);
    assert_eq!(config.base_dir(), Some(dir.path()));
    assert_eq!(
        config.index_map.lookup(Category::Action, repository::ACTION_ID),
        Some(AttributeType::String)
    );
    assert!(config.index_map.category(Category::Resource).is_empty());

    let validator = config.validator().unwrap().unwrap();
    assert_eq!(
        validator.source(),
        &SchemaSource::File(dir.path().join("schema/policy.xsd"))
    );
    assert_eq!(
        validator.namespaces(),
        ["urn:oasis:names:tc:xacml:2.0:policy:schema:os".to_string()]
    );
}

#[test_log::test]
fn load_xml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.xml");
    fs::write(
        &path,
        indoc! {r#"
            <PolicyStore>
              <Directory>/srv/policies</Directory>
              <Recycle>/srv/recycle</Recycle>
              <Validation enabled="true" schema="http://docs.oasis-open.org/xacml/access_control-xacml-2.0-policy-schema-os.xsd"/>
            </PolicyStore>
        "#},
    )
    .unwrap();

    let config = StoreConfig::load(&path).unwrap();
    assert_eq!(config.backend, Backend::File);
    assert_eq!(config.recycle_directory(), std::path::PathBuf::from("/srv/recycle"));
    assert!(matches!(
        config.validator().unwrap().unwrap().source(),
        SchemaSource::Url(_)
    ));
}

#[test_log::test]
fn missing_schema_file_is_an_error() {
    let config = StoreConfig::from_toml(indoc! {r#"
        directory = "/srv/policies"
        validation = { schema = "/nonexistent/policy.xsd" }
    "#})
    .unwrap();

    assert!(config.validator().is_err());
}

#[test_log::test]
fn unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.yaml");
    fs::write(&path, "directory: x").unwrap();

    assert!(matches!(
        StoreConfig::load(&path),
        Err(ConfigError::UnknownFormat(_))
    ));
}

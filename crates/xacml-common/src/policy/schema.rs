//! Validation of XACML policy documents.
//!
//! A configured XSD that declares elements is compiled and enforced. Without one, the structure
//! rules below encode what the XACML policy schema requires of the elements the rest of the
//! system reads.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use roxmltree::Node;
use tracing::debug;

use crate::{
    attribute::{AttributeType, Category},
    id::POLICY_NAMESPACES,
};

use super::xsd::Xsd;

/// A document failed validation.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    /// The document could not be parsed.
    #[error("policy is not well-formed: {0}")]
    Malformed(String),

    /// The document violates the policy structure.
    #[error("invalid policy at {path}: {message}")]
    Invalid {
        /// Slash-separated element path to the offending node.
        path: String,
        /// What is wrong.
        message: String,
    },

    /// The configured schema could not be loaded.
    #[error("unusable policy schema {location}: {message}")]
    Schema {
        /// The configured schema location.
        location: String,
        /// What is wrong.
        message: String,
    },
}

/// Where the validator's namespace rules came from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SchemaSource {
    /// The built-in XACML 1.0/2.0 policy namespaces.
    Builtin,
    /// A schema referenced by URL, accepted without fetching.
    Url(String),
    /// A local XSD file.
    File(PathBuf),
}

/// Validates policy documents before they enter a store.
#[derive(Clone, Debug)]
pub struct SchemaValidator {
    source: SchemaSource,
    namespaces: Vec<String>,
    schema: Option<Arc<Xsd>>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::xacml()
    }
}

impl SchemaValidator {
    /// A validator accepting the XACML 1.0 and 2.0 policy namespaces.
    pub fn xacml() -> Self {
        Self {
            source: SchemaSource::Builtin,
            namespaces: POLICY_NAMESPACES.iter().map(|ns| ns.to_string()).collect(),
            schema: None,
        }
    }

    /// A validator for the schema at `location`.
    ///
    /// URLs are accepted as-is and validate against the built-in namespaces. Relative file
    /// paths are resolved against `base_dir`. A schema file without global element
    /// declarations only restricts the namespace.
    pub fn from_location(location: &str, base_dir: Option<&Path>) -> Result<Self, ValidationError> {
        if location.contains("://") && !location.starts_with("file://") {
            return Ok(Self {
                source: SchemaSource::Url(location.to_string()),
                ..Self::xacml()
            });
        }

        let raw = PathBuf::from(location.strip_prefix("file://").unwrap_or(location));
        let path = match base_dir {
            Some(base) if raw.is_relative() => base.join(raw),
            _ => raw,
        };

        let schema_error = |message: String| ValidationError::Schema {
            location: path.display().to_string(),
            message,
        };

        let text = std::fs::read_to_string(&path).map_err(|err| schema_error(err.to_string()))?;
        let doc = roxmltree::Document::parse(&text).map_err(|err| schema_error(err.to_string()))?;
        let xsd = Xsd::compile(doc.root_element()).map_err(schema_error)?;
        let target_namespace = xsd.target_namespace().to_string();

        debug!(
            ?path,
            target_namespace,
            declares_elements = xsd.declares_elements(),
            "loaded policy schema"
        );

        Ok(Self {
            source: SchemaSource::File(path.clone()),
            namespaces: vec![target_namespace],
            schema: xsd.declares_elements().then(|| Arc::new(xsd)),
        })
    }

    /// Where this validator's rules came from.
    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// The namespaces a policy root element may live in.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Validate a serialized policy.
    pub fn validate(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|err| ValidationError::Malformed(err.to_string()))?;
        let doc = roxmltree::Document::parse(text)
            .map_err(|err| ValidationError::Malformed(err.to_string()))?;

        let root = doc.root_element();
        if let Some(schema) = &self.schema {
            return schema.validate(root);
        }

        let namespace = root.tag_name().namespace().unwrap_or_default();
        if !self.namespaces.iter().any(|ns| ns == namespace) {
            return Err(invalid(
                root,
                format!("namespace `{namespace}` is not a policy namespace"),
            ));
        }

        self.check_policy(root)
    }

    fn check_policy(&self, node: Node) -> Result<(), ValidationError> {
        let (id_attr, alg_attr) = match node.tag_name().name() {
            "Policy" => ("PolicyId", "RuleCombiningAlgId"),
            "PolicySet" => ("PolicySetId", "PolicyCombiningAlgId"),
            other => return Err(invalid(node, format!("unexpected element `{other}`"))),
        };

        require_attribute(node, id_attr)?;
        require_attribute(node, alg_attr)?;

        for child in elements(node) {
            match child.tag_name().name() {
                "Target" => check_target(child)?,
                "Rule" if id_attr == "PolicyId" => check_rule(child)?,
                "Policy" | "PolicySet" if id_attr == "PolicySetId" => self.check_policy(child)?,
                "Description"
                | "PolicyDefaults"
                | "PolicySetDefaults"
                | "VariableDefinition"
                | "CombinerParameters"
                | "RuleCombinerParameters"
                | "PolicyCombinerParameters"
                | "PolicySetCombinerParameters"
                | "PolicyIdReference"
                | "PolicySetIdReference"
                | "Obligations" => {}
                other => return Err(invalid(child, format!("unexpected element `{other}`"))),
            }
        }

        Ok(())
    }
}

fn check_rule(node: Node) -> Result<(), ValidationError> {
    require_attribute(node, "RuleId")?;
    match require_attribute(node, "Effect")? {
        "Permit" | "Deny" => {}
        other => return Err(invalid(node, format!("invalid Effect `{other}`"))),
    }

    for child in elements(node) {
        match child.tag_name().name() {
            "Target" => check_target(child)?,
            "Description" | "Condition" => {}
            other => return Err(invalid(child, format!("unexpected element `{other}`"))),
        }
    }

    Ok(())
}

fn check_target(node: Node) -> Result<(), ValidationError> {
    for child in elements(node) {
        let name = child.tag_name().name();
        let category = Category::ALL
            .into_iter()
            .find(|category| category.plural() == name)
            .ok_or_else(|| invalid(child, format!("unexpected element `{name}`")))?;

        for alternative in elements(child) {
            let name = alternative.tag_name().name();
            if name == category.any_marker() {
                continue;
            }
            if name != category.singular() {
                return Err(invalid(alternative, format!("unexpected element `{name}`")));
            }

            for m in elements(alternative) {
                if m.tag_name().name() != category.match_element() {
                    return Err(invalid(
                        m,
                        format!("expected `{}`", category.match_element()),
                    ));
                }
                check_match(m, category)?;
            }
        }
    }

    Ok(())
}

fn check_match(node: Node, category: Category) -> Result<(), ValidationError> {
    require_attribute(node, "MatchId")?;

    let mut values = 0;
    let mut designators = 0;

    for child in elements(node) {
        let name = child.tag_name().name();
        if name == "AttributeValue" {
            values += 1;
            require_attribute(child, "DataType")?;
        } else if name == category.designator() {
            designators += 1;
            require_attribute(child, "AttributeId")?;
            let data_type = require_attribute(child, "DataType")?;
            if data_type.parse::<AttributeType>().is_err() {
                debug!(data_type, "unsupported designator datatype");
            }
        } else if name == "AttributeSelector" {
            designators += 1;
            require_attribute(child, "RequestContextPath")?;
        } else {
            return Err(invalid(child, format!("unexpected element `{name}`")));
        }
    }

    if values != 1 {
        return Err(invalid(node, "expected exactly one AttributeValue".to_string()));
    }
    if designators != 1 {
        return Err(invalid(
            node,
            "expected exactly one designator or selector".to_string(),
        ));
    }

    Ok(())
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn require_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, ValidationError> {
    node.attribute(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| invalid(node, format!("missing attribute `{name}`")))
}

pub(super) fn invalid(node: Node, message: String) -> ValidationError {
    let mut names: Vec<&str> = node
        .ancestors()
        .filter(Node::is_element)
        .map(|n| n.tag_name().name())
        .collect();
    names.reverse();

    ValidationError::Invalid {
        path: format!("/{}", names.join("/")),
        message,
    }
}

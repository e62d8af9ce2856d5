//! Analysis of XACML policy documents.

use roxmltree::Node;
use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeType, Category};

/// A policy document could not be analyzed.
#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    /// The document is not well-formed XML.
    #[error("malformed policy document: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The document is not UTF-8.
    #[error("policy document is not UTF-8")]
    Encoding,

    /// The root element carries no `PolicyId`/`PolicySetId`.
    #[error("policy document has no PolicyId")]
    MissingPolicyId,

    /// The root element is neither `Policy` nor `PolicySet`.
    #[error("unsupported policy root element `{0}`")]
    UnsupportedRoot(String),

    /// A rule has an effect other than Permit or Deny.
    #[error("invalid rule effect `{0}`")]
    InvalidEffect(String),
}

/// Whether the document is a single policy or a policy set.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum PolicyKind {
    /// A `Policy` root.
    Policy,
    /// A `PolicySet` root.
    PolicySet,
}

/// Per-category wildcard flags of a policy.
///
/// A flag is set when the policy's Target places no restriction on that category.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PolicyMetadata {
    /// No subject restriction.
    pub any_subject: bool,
    /// No resource restriction.
    pub any_resource: bool,
    /// No action restriction.
    pub any_action: bool,
    /// No environment restriction.
    pub any_environment: bool,
}

impl PolicyMetadata {
    /// The flag of `category`.
    pub fn any(&self, category: Category) -> bool {
        match category {
            Category::Subject => self.any_subject,
            Category::Resource => self.any_resource,
            Category::Action => self.any_action,
            Category::Environment => self.any_environment,
        }
    }

    fn set(&mut self, category: Category, value: bool) {
        match category {
            Category::Subject => self.any_subject = value,
            Category::Resource => self.any_resource = value,
            Category::Action => self.any_action = value,
            Category::Environment => self.any_environment = value,
        }
    }
}

/// One `*Match` element of a Target.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TargetMatch {
    /// The match function.
    pub match_id: String,

    /// The designated attribute; `None` for selectors, which cannot be indexed.
    pub attribute_id: Option<String>,

    /// The datatype of the literal, `None` when unsupported.
    pub data_type: Option<AttributeType>,

    /// The literal text of the `AttributeValue`.
    pub value: String,
}

/// The restriction a Target places on one category.
///
/// `alternatives` is a disjunction of conjunctions: the category matches when every match
/// of at least one alternative matches.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct CategoryTarget {
    /// The category is unrestricted.
    pub any: bool,

    /// The `Subject`/`Resource`/... alternatives.
    pub alternatives: Vec<Vec<TargetMatch>>,
}

impl CategoryTarget {
    fn wildcard() -> Self {
        Self {
            any: true,
            alternatives: vec![],
        }
    }

    /// Iterate every match of every alternative.
    pub fn matches(&self) -> impl Iterator<Item = &TargetMatch> {
        self.alternatives.iter().flatten()
    }
}

/// A parsed Target: one restriction per category.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Target {
    categories: [CategoryTarget; 4],
}

impl Default for Target {
    fn default() -> Self {
        Self {
            categories: [
                CategoryTarget::wildcard(),
                CategoryTarget::wildcard(),
                CategoryTarget::wildcard(),
                CategoryTarget::wildcard(),
            ],
        }
    }
}

impl Target {
    /// The restriction of `category`.
    pub fn category(&self, category: Category) -> &CategoryTarget {
        &self.categories[category.index()]
    }

    /// The wildcard flags of this target.
    pub fn metadata(&self) -> PolicyMetadata {
        let mut metadata = PolicyMetadata::default();
        for category in Category::ALL {
            metadata.set(category, self.category(category).any);
        }
        metadata
    }
}

/// A rule's effect.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum Effect {
    /// The rule permits.
    Permit,
    /// The rule denies.
    Deny,
}

/// A rule inside a policy.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Rule {
    /// The `RuleId`.
    pub id: String,

    /// The effect when the rule applies.
    pub effect: Effect,

    /// The rule's own Target; wildcard when absent.
    pub target: Target,

    /// Whether the rule carries a `Condition`, which the reference evaluator cannot decide.
    pub has_condition: bool,
}

/// The parts of a policy document used for indexing and evaluation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PolicyDocument {
    /// `PolicyId` or `PolicySetId`.
    pub id: String,

    /// Root element kind.
    pub kind: PolicyKind,

    /// Namespace of the root element.
    pub namespace: Option<String>,

    /// `RuleCombiningAlgId` or `PolicyCombiningAlgId`.
    pub combining_algorithm: Option<String>,

    /// The policy Target.
    pub target: Target,

    /// Rules of a `Policy`.
    pub rules: Vec<Rule>,

    /// Nested policies of a `PolicySet`.
    pub children: Vec<PolicyDocument>,
}

impl PolicyDocument {
    /// Analyze a serialized policy.
    pub fn parse(bytes: &[u8]) -> Result<Self, PolicyError> {
        let text = std::str::from_utf8(bytes).map_err(|_| PolicyError::Encoding)?;
        let doc = roxmltree::Document::parse(text)?;
        Self::from_node(doc.root_element())
    }

    /// Extract only the policy identifier.
    pub fn policy_id(bytes: &[u8]) -> Result<String, PolicyError> {
        Ok(Self::parse(bytes)?.id)
    }

    /// The wildcard flags of the policy Target.
    pub fn metadata(&self) -> PolicyMetadata {
        self.target.metadata()
    }

    fn from_node(root: Node) -> Result<Self, PolicyError> {
        let (kind, id_attr, alg_attr) = match root.tag_name().name() {
            "Policy" => (PolicyKind::Policy, "PolicyId", "RuleCombiningAlgId"),
            "PolicySet" => (PolicyKind::PolicySet, "PolicySetId", "PolicyCombiningAlgId"),
            other => return Err(PolicyError::UnsupportedRoot(other.to_string())),
        };

        let id = root
            .attribute(id_attr)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(PolicyError::MissingPolicyId)?
            .to_string();

        let target = child(root, "Target").map(parse_target).unwrap_or_default();

        let mut rules = vec![];
        let mut children = vec![];

        for node in elements(root) {
            match node.tag_name().name() {
                "Rule" => rules.push(parse_rule(node)?),
                "Policy" | "PolicySet" => children.push(Self::from_node(node)?),
                _ => {}
            }
        }

        Ok(Self {
            id,
            kind,
            namespace: root.tag_name().namespace().map(str::to_string),
            combining_algorithm: root.attribute(alg_attr).map(str::to_string),
            target,
            rules,
            children,
        })
    }
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    elements(node).find(|child| child.tag_name().name() == name)
}

fn parse_rule(node: Node) -> Result<Rule, PolicyError> {
    let effect = match node.attribute("Effect") {
        Some("Permit") => Effect::Permit,
        Some("Deny") => Effect::Deny,
        other => return Err(PolicyError::InvalidEffect(other.unwrap_or("").to_string())),
    };

    Ok(Rule {
        id: node.attribute("RuleId").unwrap_or_default().to_string(),
        effect,
        target: child(node, "Target").map(parse_target).unwrap_or_default(),
        has_condition: child(node, "Condition").is_some(),
    })
}

fn parse_target(node: Node) -> Target {
    let mut target = Target::default();

    for category in Category::ALL {
        let Some(category_node) = child(node, category.plural()) else {
            continue;
        };

        let mut category_target = CategoryTarget::default();

        for alternative in elements(category_node) {
            let name = alternative.tag_name().name();
            if name == category.any_marker() {
                category_target.any = true;
                continue;
            }
            if name != category.singular() {
                continue;
            }

            let matches: Vec<TargetMatch> = elements(alternative)
                .filter(|m| m.tag_name().name() == category.match_element())
                .map(|m| parse_match(m, category))
                .collect();

            if matches.is_empty() {
                // an empty alternative matches everything
                category_target.any = true;
            } else {
                category_target.alternatives.push(matches);
            }
        }

        if category_target.alternatives.is_empty() {
            category_target.any = true;
        }
        if category_target.any {
            category_target.alternatives.clear();
        }

        target.categories[category.index()] = category_target;
    }

    target
}

fn parse_match(node: Node, category: Category) -> TargetMatch {
    let value_node = child(node, "AttributeValue");
    let designator = child(node, category.designator());

    let data_type = value_node
        .and_then(|value| value.attribute("DataType"))
        .or_else(|| designator.and_then(|d| d.attribute("DataType")))
        .and_then(|uri| uri.parse::<AttributeType>().ok());

    TargetMatch {
        match_id: node.attribute("MatchId").unwrap_or_default().to_string(),
        attribute_id: designator
            .and_then(|d| d.attribute("AttributeId"))
            .map(str::to_string),
        data_type,
        value: value_node
            .and_then(|value| value.text())
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

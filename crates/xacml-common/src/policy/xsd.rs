//! Validation against a W3C XML Schema.
//!
//! The supported subset is what policy schemas are written in: global and local element
//! declarations, references and substitution groups, named and anonymous complex types with
//! `sequence`, `choice` and `all` model groups and occurrence bounds, `complexContent`
//! extension and restriction, `simpleContent`, wildcards, attribute declarations with `use`,
//! and simple types restricted by enumeration. Imports and includes are not followed; names
//! that cannot be resolved are validated laxly.

use std::collections::BTreeSet;

use fnv::{FnvHashMap, FnvHashSet};
use roxmltree::Node;
use tracing::debug;

use super::schema::{invalid, ValidationError};

const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

const MAX_DERIVATION_DEPTH: usize = 16;

/// A compiled schema.
#[derive(Debug)]
pub(super) struct Xsd {
    target_namespace: String,
    qualified: bool,
    elements: FnvHashMap<String, Decl>,
    types: FnvHashMap<String, Type>,
    substitutions: FnvHashMap<String, Vec<String>>,
}

#[derive(Clone, Debug)]
struct Decl {
    name: String,
    ty: TypeRef,
    is_abstract: bool,
}

#[derive(Clone, Debug)]
enum TypeRef {
    Named(String),
    Builtin(String),
    Inline(Box<Type>),
    Any,
}

#[derive(Clone, Debug)]
enum Type {
    Complex(Complex),
    Simple(Simple),
}

#[derive(Clone, Default, Debug)]
struct Complex {
    base: Option<String>,
    restriction: bool,
    mixed: bool,
    attributes: Vec<AttrDecl>,
    any_attribute: bool,
    content: Content,
}

#[derive(Clone, Default, Debug)]
enum Content {
    #[default]
    Empty,
    Simple(TypeRef),
    Elements(Particle),
}

#[derive(Clone, Debug)]
struct AttrDecl {
    name: String,
    ty: TypeRef,
    required: bool,
}

#[derive(Clone, Default, Debug)]
struct Simple {
    base: Option<String>,
    enumeration: Vec<String>,
}

#[derive(Clone, Debug)]
struct Particle {
    min: u32,
    max: Option<u32>,
    term: Term,
}

#[derive(Clone, Debug)]
enum Term {
    Ref(String),
    Local(Decl),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
    Any,
}

/// A complex type with its derivation resolved.
#[derive(Default)]
struct Effective {
    mixed: bool,
    attributes: Vec<AttrDecl>,
    any_attribute: bool,
    content: Content,
}

fn is_xs(node: Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(XSD_NS)
}

fn xs_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(|child| child.is_element() && child.tag_name().namespace() == Some(XSD_NS))
}

/// The local part of a QName.
fn local(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

/// Resolve the QName `qname` written on `node` to a type reference.
fn type_ref(node: Node, qname: &str) -> TypeRef {
    let prefix = qname.split_once(':').map(|(prefix, _)| prefix);
    if node.lookup_namespace_uri(prefix) == Some(XSD_NS) {
        TypeRef::Builtin(local(qname).to_string())
    } else {
        TypeRef::Named(local(qname).to_string())
    }
}

impl Xsd {
    /// Compile the schema rooted at `root`.
    pub(super) fn compile(root: Node) -> Result<Self, String> {
        if !is_xs(root, "schema") {
            return Err("root element is not an XML schema".to_string());
        }
        let target_namespace = root
            .attribute("targetNamespace")
            .ok_or_else(|| "schema has no targetNamespace".to_string())?;

        let mut xsd = Self {
            target_namespace: target_namespace.to_string(),
            qualified: root.attribute("elementFormDefault") == Some("qualified"),
            elements: Default::default(),
            types: Default::default(),
            substitutions: Default::default(),
        };

        for child in xs_children(root) {
            match child.tag_name().name() {
                "element" => {
                    let decl = parse_decl(child)?;
                    if let Some(head) = child.attribute("substitutionGroup") {
                        xsd.substitutions
                            .entry(local(head).to_string())
                            .or_default()
                            .push(decl.name.clone());
                    }
                    xsd.elements.insert(decl.name.clone(), decl);
                }
                "complexType" | "simpleType" => {
                    let name = child
                        .attribute("name")
                        .ok_or_else(|| "top-level type without a name".to_string())?;
                    xsd.types.insert(name.to_string(), parse_type(child)?);
                }
                "annotation" => {}
                other => debug!(component = other, "schema component not supported, ignoring"),
            }
        }

        Ok(xsd)
    }

    pub(super) fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    pub(super) fn declares_elements(&self) -> bool {
        !self.elements.is_empty()
    }

    /// Validate the document rooted at `root`.
    pub(super) fn validate(&self, root: Node) -> Result<(), ValidationError> {
        let namespace = root.tag_name().namespace().unwrap_or_default();
        if namespace != self.target_namespace {
            return Err(invalid(
                root,
                format!("namespace `{namespace}` is not the schema's target namespace"),
            ));
        }

        let name = root.tag_name().name();
        let decl = self
            .elements
            .get(name)
            .ok_or_else(|| invalid(root, format!("no global declaration for `{name}`")))?;

        self.validate_element(root, decl)
    }

    fn validate_element(&self, node: Node, decl: &Decl) -> Result<(), ValidationError> {
        if decl.is_abstract {
            return Err(invalid(node, format!("`{}` is abstract", decl.name)));
        }

        match self.resolve(&decl.ty) {
            None => Ok(()),
            Some(Type::Simple(_)) => self.validate_simple_element(node, &decl.ty),
            Some(Type::Complex(complex)) => {
                let effective = self.effective(complex, 0);
                self.validate_complex(node, &effective)
            }
        }
        .and_then(|()| match &decl.ty {
            TypeRef::Builtin(builtin) if builtin != "anyType" => {
                self.validate_simple_element(node, &decl.ty)
            }
            _ => Ok(()),
        })
    }

    /// The type a reference names, `None` for builtins and unresolvable names.
    fn resolve<'a>(&'a self, ty: &'a TypeRef) -> Option<&'a Type> {
        match ty {
            TypeRef::Named(name) => {
                let resolved = self.types.get(name);
                if resolved.is_none() {
                    debug!(%name, "unresolved type, validating laxly");
                }
                resolved
            }
            TypeRef::Inline(ty) => Some(&**ty),
            TypeRef::Builtin(_) | TypeRef::Any => None,
        }
    }

    fn effective(&self, complex: &Complex, depth: usize) -> Effective {
        let mut effective = match complex.base.as_deref().and_then(|base| self.types.get(base)) {
            Some(Type::Complex(base)) if depth < MAX_DERIVATION_DEPTH => {
                self.effective(base, depth + 1)
            }
            _ => Effective::default(),
        };

        effective.mixed |= complex.mixed;
        effective.any_attribute |= complex.any_attribute;
        for attribute in &complex.attributes {
            effective.attributes.retain(|existing| existing.name != attribute.name);
            effective.attributes.push(attribute.clone());
        }

        let base_content = std::mem::take(&mut effective.content);
        effective.content = match (base_content, complex.content.clone()) {
            (_, own) if complex.restriction => own,
            (Content::Elements(base), Content::Elements(own)) => Content::Elements(Particle {
                min: 1,
                max: Some(1),
                term: Term::Sequence(vec![base, own]),
            }),
            (base, Content::Empty) => base,
            (_, own) => own,
        };

        effective
    }

    fn validate_simple_element(&self, node: Node, ty: &TypeRef) -> Result<(), ValidationError> {
        if let Some(child) = node.children().find(Node::is_element) {
            return Err(invalid(
                child,
                format!("unexpected element `{}`", child.tag_name().name()),
            ));
        }
        let value = text(node);
        if !self.value_matches(ty, &value) {
            return Err(invalid(node, format!("invalid value `{}`", value.trim())));
        }
        Ok(())
    }

    fn validate_complex(&self, node: Node, effective: &Effective) -> Result<(), ValidationError> {
        for attribute in node.attributes() {
            match attribute.namespace() {
                Some(XSI_NS | XML_NS) => continue,
                Some(_) if effective.any_attribute => continue,
                None => {}
                Some(namespace) => {
                    return Err(invalid(
                        node,
                        format!(
                            "unexpected attribute `{}` in namespace `{namespace}`",
                            attribute.name()
                        ),
                    ))
                }
            }

            match effective
                .attributes
                .iter()
                .find(|decl| decl.name == attribute.name())
            {
                Some(decl) if !self.value_matches(&decl.ty, attribute.value()) => {
                    return Err(invalid(
                        node,
                        format!(
                            "invalid value `{}` for attribute `{}`",
                            attribute.value(),
                            attribute.name()
                        ),
                    ));
                }
                Some(_) => {}
                None if effective.any_attribute => {}
                None => {
                    return Err(invalid(
                        node,
                        format!("unexpected attribute `{}`", attribute.name()),
                    ))
                }
            }
        }

        for decl in effective.attributes.iter().filter(|decl| decl.required) {
            if node.attribute(decl.name.as_str()).is_none() {
                return Err(invalid(node, format!("missing attribute `{}`", decl.name)));
            }
        }

        match &effective.content {
            Content::Simple(ty) => self.validate_simple_element(node, ty),
            Content::Empty => {
                if let Some(child) = node.children().find(Node::is_element) {
                    return Err(invalid(
                        child,
                        format!("unexpected element `{}`", child.tag_name().name()),
                    ));
                }
                if !effective.mixed && has_text(node) {
                    return Err(invalid(node, "unexpected text".to_string()));
                }
                Ok(())
            }
            Content::Elements(particle) => {
                if !effective.mixed && has_text(node) {
                    return Err(invalid(node, "unexpected text".to_string()));
                }

                let children: Vec<Node> = node.children().filter(Node::is_element).collect();
                let ends = self.match_particle(particle, &children, 0);
                if !ends.contains(&children.len()) {
                    let stop = ends.last().copied().unwrap_or(0);
                    return Err(match children.get(stop) {
                        Some(child) => invalid(
                            *child,
                            format!("unexpected element `{}`", child.tag_name().name()),
                        ),
                        None => invalid(node, "missing required content".to_string()),
                    });
                }

                for child in children {
                    if let Some(decl) = self.declaration_for(particle, child) {
                        self.validate_element(child, &decl)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// The positions in `children` a match of `particle` starting at `start` can end at.
    fn match_particle(&self, particle: &Particle, children: &[Node], start: usize) -> BTreeSet<usize> {
        let mut reached = BTreeSet::new();
        if particle.min == 0 {
            reached.insert(start);
        }

        let mut frontier = BTreeSet::from([start]);
        let mut count: u32 = 0;

        while !frontier.is_empty() && particle.max.map_or(true, |max| count < max) {
            frontier = frontier
                .iter()
                .flat_map(|&position| self.match_term(&particle.term, children, position))
                .collect();
            count += 1;

            if count >= particle.min {
                let before = reached.len();
                reached.extend(frontier.iter().copied());
                if reached.len() == before && count > particle.min {
                    break;
                }
            }
            if count as usize > children.len() + particle.min as usize {
                break;
            }
        }

        reached
    }

    fn match_term(&self, term: &Term, children: &[Node], position: usize) -> BTreeSet<usize> {
        match term {
            Term::Ref(_) | Term::Local(_) | Term::Any => match children.get(position) {
                Some(child) if self.term_accepts(term, *child) => BTreeSet::from([position + 1]),
                _ => BTreeSet::new(),
            },
            Term::Sequence(particles) => {
                let mut positions = BTreeSet::from([position]);
                for particle in particles {
                    positions = positions
                        .iter()
                        .flat_map(|&position| self.match_particle(particle, children, position))
                        .collect();
                    if positions.is_empty() {
                        break;
                    }
                }
                positions
            }
            Term::Choice(particles) => particles
                .iter()
                .flat_map(|particle| self.match_particle(particle, children, position))
                .collect(),
            Term::All(particles) => {
                let mut used = vec![false; particles.len()];
                let mut end = position;
                while let Some(child) = children.get(end) {
                    let Some(index) = particles.iter().enumerate().position(|(i, particle)| {
                        !used[i] && self.term_accepts(&particle.term, *child)
                    }) else {
                        break;
                    };
                    used[index] = true;
                    end += 1;
                }
                let complete = particles
                    .iter()
                    .zip(&used)
                    .all(|(particle, used)| *used || particle.min == 0);
                if complete {
                    BTreeSet::from([end])
                } else {
                    BTreeSet::new()
                }
            }
        }
    }

    /// Whether a single-element term accepts `child`.
    fn term_accepts(&self, term: &Term, child: Node) -> bool {
        let name = child.tag_name().name();
        let namespace = child.tag_name().namespace();
        match term {
            Term::Ref(head) => {
                namespace == Some(self.target_namespace.as_str())
                    && (head == name || self.substitutes(head, name))
            }
            Term::Local(decl) => {
                decl.name == name
                    && if self.qualified {
                        namespace == Some(self.target_namespace.as_str())
                    } else {
                        namespace.is_none()
                    }
            }
            Term::Any => true,
            Term::Sequence(_) | Term::Choice(_) | Term::All(_) => false,
        }
    }

    /// Whether `member` is in the substitution group of `head`, transitively.
    fn substitutes(&self, head: &str, member: &str) -> bool {
        let mut seen = FnvHashSet::default();
        let mut pending = vec![head];
        while let Some(head) = pending.pop() {
            if !seen.insert(head) {
                continue;
            }
            for candidate in self.substitutions.get(head).into_iter().flatten() {
                if candidate == member {
                    return true;
                }
                pending.push(candidate);
            }
        }
        false
    }

    /// The declaration `child` is validated against, `None` under a wildcard.
    fn declaration_for(&self, particle: &Particle, child: Node) -> Option<Decl> {
        match &particle.term {
            Term::Ref(_) if self.term_accepts(&particle.term, child) => {
                self.elements.get(child.tag_name().name()).cloned()
            }
            Term::Local(decl) if self.term_accepts(&particle.term, child) => Some(decl.clone()),
            Term::Sequence(particles) | Term::Choice(particles) | Term::All(particles) => particles
                .iter()
                .find_map(|particle| self.declaration_for(particle, child)),
            _ => None,
        }
    }

    fn value_matches(&self, ty: &TypeRef, value: &str) -> bool {
        match ty {
            TypeRef::Builtin(builtin) => builtin_matches(builtin, value),
            TypeRef::Named(_) | TypeRef::Inline(_) => match self.resolve(ty) {
                Some(Type::Simple(simple)) => {
                    (simple.enumeration.is_empty()
                        || simple.enumeration.iter().any(|e| e == value.trim()))
                        && simple
                            .base
                            .as_deref()
                            .map_or(true, |base| builtin_matches(base, value))
                }
                _ => true,
            },
            TypeRef::Any => true,
        }
    }
}

fn builtin_matches(builtin: &str, value: &str) -> bool {
    let value = value.trim();
    match builtin {
        "boolean" => matches!(value, "true" | "false" | "1" | "0"),
        "integer" | "int" | "long" | "short" => value.parse::<i64>().is_ok(),
        "nonNegativeInteger" | "unsignedInt" | "unsignedLong" => value.parse::<u64>().is_ok(),
        "positiveInteger" => value.parse::<u64>().is_ok_and(|n| n > 0),
        "anyURI" | "ID" | "NCName" | "token" => !value.contains(char::is_whitespace),
        _ => true,
    }
}

fn text(node: Node) -> String {
    node.children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect()
}

fn has_text(node: Node) -> bool {
    node.children()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .any(|text| !text.trim().is_empty())
}

fn parse_decl(node: Node) -> Result<Decl, String> {
    let name = node
        .attribute("name")
        .ok_or_else(|| "element declaration without a name".to_string())?;

    let ty = match node.attribute("type") {
        Some(qname) => type_ref(node, qname),
        None => match xs_children(node)
            .find(|child| is_xs(*child, "complexType") || is_xs(*child, "simpleType"))
        {
            Some(inline) => TypeRef::Inline(Box::new(parse_type(inline)?)),
            None => TypeRef::Any,
        },
    };

    Ok(Decl {
        name: name.to_string(),
        ty,
        is_abstract: node.attribute("abstract") == Some("true"),
    })
}

fn parse_type(node: Node) -> Result<Type, String> {
    if is_xs(node, "simpleType") {
        return Ok(Type::Simple(parse_simple(node)));
    }

    let mut complex = Complex {
        mixed: node.attribute("mixed") == Some("true"),
        ..Default::default()
    };
    parse_complex_body(node, &mut complex)?;

    for child in xs_children(node) {
        match child.tag_name().name() {
            "complexContent" => {
                complex.mixed |= child.attribute("mixed") == Some("true");
                if let Some(derivation) = xs_children(child)
                    .find(|d| is_xs(*d, "extension") || is_xs(*d, "restriction"))
                {
                    complex.base = derivation.attribute("base").map(|base| local(base).to_string());
                    complex.restriction = is_xs(derivation, "restriction");
                    parse_complex_body(derivation, &mut complex)?;
                }
            }
            "simpleContent" => {
                if let Some(derivation) = xs_children(child)
                    .find(|d| is_xs(*d, "extension") || is_xs(*d, "restriction"))
                {
                    let base = derivation
                        .attribute("base")
                        .map_or(TypeRef::Any, |base| type_ref(derivation, base));
                    complex.content = Content::Simple(base);
                    parse_complex_body(derivation, &mut complex)?;
                }
            }
            _ => {}
        }
    }

    Ok(Type::Complex(complex))
}

/// Read the model group and attribute declarations directly under `node`.
fn parse_complex_body(node: Node, complex: &mut Complex) -> Result<(), String> {
    for child in xs_children(node) {
        match child.tag_name().name() {
            "sequence" | "choice" | "all" => {
                if let Some(particle) = parse_particle(child)? {
                    complex.content = Content::Elements(particle);
                }
            }
            "attribute" => {
                if child.attribute("use") == Some("prohibited") {
                    continue;
                }
                let Some(name) = child.attribute("name").or(child.attribute("ref")) else {
                    return Err("attribute declaration without a name".to_string());
                };
                let ty = match child.attribute("type") {
                    Some(qname) => type_ref(child, qname),
                    None => match xs_children(child).find(|c| is_xs(*c, "simpleType")) {
                        Some(inline) => TypeRef::Inline(Box::new(parse_type(inline)?)),
                        None => TypeRef::Any,
                    },
                };
                complex.attributes.push(AttrDecl {
                    name: local(name).to_string(),
                    ty,
                    required: child.attribute("use") == Some("required"),
                });
            }
            "anyAttribute" => complex.any_attribute = true,
            _ => {}
        }
    }
    Ok(())
}

fn parse_particle(node: Node) -> Result<Option<Particle>, String> {
    let min = match node.attribute("minOccurs") {
        Some(min) => min
            .parse()
            .map_err(|_| format!("invalid minOccurs `{min}`"))?,
        None => 1,
    };
    let max = match node.attribute("maxOccurs") {
        Some("unbounded") => None,
        Some(max) => Some(max.parse().map_err(|_| format!("invalid maxOccurs `{max}`"))?),
        None => Some(1),
    };

    let term = match node.tag_name().name() {
        "element" => match node.attribute("ref") {
            Some(reference) => Term::Ref(local(reference).to_string()),
            None => Term::Local(parse_decl(node)?),
        },
        "any" => Term::Any,
        group @ ("sequence" | "choice" | "all") => {
            let mut particles = vec![];
            for child in xs_children(node) {
                particles.extend(parse_particle(child)?);
            }
            match group {
                "sequence" => Term::Sequence(particles),
                "choice" => Term::Choice(particles),
                _ => Term::All(particles),
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(Particle { min, max, term }))
}

fn parse_simple(node: Node) -> Simple {
    let Some(restriction) = xs_children(node).find(|child| is_xs(*child, "restriction")) else {
        return Simple::default();
    };

    Simple {
        base: restriction.attribute("base").and_then(|base| match type_ref(restriction, base) {
            TypeRef::Builtin(builtin) => Some(builtin),
            _ => None,
        }),
        enumeration: xs_children(restriction)
            .filter(|child| is_xs(*child, "enumeration"))
            .filter_map(|child| child.attribute("value"))
            .map(str::to_string)
            .collect(),
    }
}

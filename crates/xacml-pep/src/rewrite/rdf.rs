//! Resource-index results: RDF/XML, SPARQL XML, and RDF/XML rewritten as N-Triples.

use tracing::debug;
use xacml_common::id::repository::INFO_FEDORA_PREFIX;

use crate::error::{self, Error};

use super::{
    xml::{Element, XmlDocument, XmlRows},
    ResourceRef,
};

/// The repository resource an `info:fedora/` URI names.
///
/// `info:fedora/demo:1` names an object, `info:fedora/demo:1/DC` one of its datastreams.
/// URIs that do not start with a PID are not repository resources.
pub fn parse_info_uri(uri: &str) -> Option<ResourceRef> {
    let path = uri.trim().strip_prefix(INFO_FEDORA_PREFIX)?;
    let (pid, rest) = match path.split_once('/') {
        Some((pid, rest)) => (pid, Some(rest)),
        None => (path, None),
    };

    if pid.is_empty() || !pid.contains(':') {
        return None;
    }

    Some(match rest {
        Some(datastream) if !datastream.is_empty() => ResourceRef::datastream(pid, datastream),
        _ => ResourceRef::object(pid),
    })
}

/// `rdf:Description` entries of an RDF/XML graph, by their `rdf:about`.
#[derive(Clone, Copy, Default, Debug)]
pub struct RdfDescriptions;

impl XmlRows for RdfDescriptions {
    fn accepts(&self, root: &Element) -> bool {
        root.is("RDF")
    }

    fn is_row(&self, element: &Element) -> bool {
        element.is("Description")
    }

    fn resources(&self, _root: &Element, row: &Element) -> Vec<ResourceRef> {
        row.attribute("about")
            .and_then(|about| parse_info_uri(&about))
            .into_iter()
            .collect()
    }
}

/// `result` entries of a SPARQL XML result set, by every repository URI they bind.
#[derive(Clone, Copy, Default, Debug)]
pub struct SparqlResults;

impl XmlRows for SparqlResults {
    fn is_row(&self, element: &Element) -> bool {
        element.is("result")
    }

    fn resources(&self, _root: &Element, row: &Element) -> Vec<ResourceRef> {
        let mut resources = vec![];
        row.descendants(&mut |element: &Element| {
            // the W3C format puts the URI in a `uri` element, older formats in a `uri` attribute
            if element.is("uri") {
                resources.extend(parse_info_uri(&element.text()));
            }
            for (_, value) in element.attributes() {
                resources.extend(parse_info_uri(&value));
            }
        });
        resources
    }
}

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// Serialize an RDF/XML graph as N-Triples.
///
/// Covers the forms a resource index writes: node elements (typed or `rdf:Description`)
/// identified by `rdf:about` or `rdf:nodeID`, property attributes, and property elements
/// with an `rdf:resource`, `rdf:nodeID`, nested node element, `rdf:parseType="Resource"` or
/// literal object. Literals keep `rdf:datatype` and `xml:lang`.
pub fn to_ntriples(document: &XmlDocument) -> Result<String, Error> {
    let root = document.root();
    let mut writer = TripleWriter::default();

    writer.enter(root);
    if writer.is_rdf(root, "RDF") {
        for node in root.children() {
            writer.node(node)?;
        }
    } else {
        writer.node(root)?;
    }

    debug!(triples = writer.count, "serialized N-Triples");
    Ok(writer.out)
}

#[derive(Default)]
struct TripleWriter {
    /// In-scope namespace declarations, innermost last. `None` is the default namespace.
    namespaces: Vec<(Option<String>, String)>,
    blank_nodes: usize,
    count: usize,
    out: String,
}

enum Attr {
    Rdf(String),
    Property(String),
    Ignored,
}

impl TripleWriter {
    /// Bring the namespace declarations of `element` into scope, returning the scope mark.
    fn enter(&mut self, element: &Element) -> usize {
        let mark = self.namespaces.len();
        for (name, value) in element.qualified_attributes() {
            if name == "xmlns" {
                self.namespaces.push((None, value));
            } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                self.namespaces.push((Some(prefix.to_string()), value));
            }
        }
        mark
    }

    fn leave(&mut self, mark: usize) {
        self.namespaces.truncate(mark);
    }

    fn namespace(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some("http://www.w3.org/XML/1998/namespace");
        }
        self.namespaces
            .iter()
            .rev()
            .find(|(declared, _)| declared.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    fn uri(&self, element: &Element) -> Result<String, Error> {
        let prefix = element.prefix();
        let namespace = self.namespace(prefix.as_deref()).ok_or_else(|| {
            error::response_parse(anyhow::anyhow!(
                "undeclared namespace prefix on {}",
                element.local_name()
            ))
        })?;
        Ok(format!("{namespace}{}", element.local_name()))
    }

    fn is_rdf(&self, element: &Element, local: &str) -> bool {
        element.is(local) && self.namespace(element.prefix().as_deref()) == Some(RDF_NS)
    }

    fn classify(&self, name: &str) -> Attr {
        let (prefix, local) = match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, name),
        };
        match (prefix, local) {
            (Some("xmlns" | "xml"), _) | (None, "xmlns") => Attr::Ignored,
            // unqualified RDF attributes are still written by older servers
            (None, "about" | "resource" | "nodeID" | "datatype" | "parseType" | "ID") => {
                Attr::Rdf(local.to_string())
            }
            (None, _) => Attr::Ignored,
            (Some(prefix), local) => match self.namespace(Some(prefix)) {
                Some(RDF_NS) => Attr::Rdf(local.to_string()),
                Some(namespace) => Attr::Property(format!("{namespace}{local}")),
                None => Attr::Ignored,
            },
        }
    }

    fn rdf_attribute(&self, element: &Element, local: &str) -> Option<String> {
        element
            .qualified_attributes()
            .find(|(name, _)| matches!(self.classify(name), Attr::Rdf(ref l) if l == local))
            .map(|(_, value)| value)
    }

    fn blank_node(&mut self) -> String {
        self.blank_nodes += 1;
        format!("_:b{}", self.blank_nodes)
    }

    fn triple(&mut self, subject: &str, predicate: &str, object: &str) {
        self.count += 1;
        self.out.push_str(&format!("{subject} <{predicate}> {object} .\n"));
    }

    /// Write the triples of a node element, returning its subject term.
    fn node(&mut self, element: &Element) -> Result<String, Error> {
        let mark = self.enter(element);

        let subject = match (
            self.rdf_attribute(element, "about"),
            self.rdf_attribute(element, "nodeID"),
        ) {
            (Some(about), _) => format!("<{about}>"),
            (None, Some(id)) => format!("_:{id}"),
            (None, None) => self.blank_node(),
        };

        if !self.is_rdf(element, "Description") {
            let class = self.uri(element)?;
            self.triple(&subject, &format!("{RDF_NS}type"), &format!("<{class}>"));
        }

        self.properties(&subject, element)?;
        self.leave(mark);
        Ok(subject)
    }

    /// Write the property attributes and property elements of a node.
    fn properties(&mut self, subject: &str, element: &Element) -> Result<(), Error> {
        let attributes: Vec<(String, String)> = element.qualified_attributes().collect();
        for (name, value) in attributes {
            if let Attr::Property(predicate) = self.classify(&name) {
                self.triple(subject, &predicate, &literal(&value, None, None));
            }
        }

        for property in element.children() {
            let mark = self.enter(property);
            let predicate = self.uri(property)?;
            let object = self.object(property)?;
            self.triple(subject, &predicate, &object);
            self.leave(mark);
        }

        Ok(())
    }

    /// The object term of a property element.
    fn object(&mut self, property: &Element) -> Result<String, Error> {
        if let Some(resource) = self.rdf_attribute(property, "resource") {
            return Ok(format!("<{resource}>"));
        }
        if let Some(id) = self.rdf_attribute(property, "nodeID") {
            return Ok(format!("_:{id}"));
        }
        if self.rdf_attribute(property, "parseType").as_deref() == Some("Resource") {
            let subject = self.blank_node();
            self.properties(&subject, property)?;
            return Ok(subject);
        }
        if let Some(node) = property.children().next() {
            return self.node(node);
        }

        let language = property
            .qualified_attributes()
            .find(|(name, _)| name == "xml:lang")
            .map(|(_, value)| value);
        let datatype = self.rdf_attribute(property, "datatype");

        Ok(literal(
            &property.text(),
            datatype.as_deref(),
            language.as_deref(),
        ))
    }
}

/// An N-Triples literal term.
fn literal(value: &str, datatype: Option<&str>, language: Option<&str>) -> String {
    let mut term = String::with_capacity(value.len() + 2);
    term.push('"');
    for c in value.chars() {
        match c {
            '\\' => term.push_str("\\\\"),
            '"' => term.push_str("\\\""),
            '\n' => term.push_str("\\n"),
            '\r' => term.push_str("\\r"),
            '\t' => term.push_str("\\t"),
            c => term.push(c),
        }
    }
    term.push('"');

    match (datatype, language) {
        (Some(datatype), _) => term.push_str(&format!("^^<{datatype}>")),
        (None, Some(language)) if !language.is_empty() => {
            term.push('@');
            term.push_str(language);
        }
        _ => {}
    }
    term
}

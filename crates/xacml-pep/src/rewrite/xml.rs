//! A structure-preserving XML tree built on `quick-xml` events.
//!
//! Start tags, text, comments and declarations are kept as the raw events they were read
//! as, so a document written back out differs from its input only where elements were
//! removed.

use std::borrow::Cow;

use quick_xml::{
    events::{BytesStart, Event},
    Reader, Writer,
};
use tracing::debug;

use crate::error::{self, Error};

use super::{in_order, Decider, ResourceRef};

/// A child of an element.
#[derive(Clone, Debug)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Text, CDATA, a comment or a processing instruction.
    Other(Event<'static>),
}

impl Node {
    fn is_whitespace(&self) -> bool {
        match self {
            Self::Other(Event::Text(text)) => text.iter().all(u8::is_ascii_whitespace),
            _ => false,
        }
    }
}

/// An element and its content.
#[derive(Clone, Debug)]
pub struct Element {
    start: BytesStart<'static>,
    children: Vec<Node>,
    empty: bool,
}

impl Element {
    fn new(start: BytesStart<'static>, empty: bool) -> Self {
        Self {
            start,
            children: vec![],
            empty,
        }
    }

    /// The local name, without prefix.
    pub fn local_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.start.local_name().into_inner())
    }

    /// Whether the local name is `local`.
    pub fn is(&self, local: &str) -> bool {
        self.start.local_name().as_ref() == local.as_bytes()
    }

    /// The unescaped value of the first attribute with local name `local`.
    pub fn attribute(&self, local: &str) -> Option<String> {
        self.attributes()
            .find(|(name, _)| name == local)
            .map(|(_, value)| value)
    }

    /// Local names and unescaped values of all well-formed attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.start.attributes().flatten().filter_map(|attr| {
            let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().ok()?.into_owned();
            Some((name, value))
        })
    }

    /// The namespace prefix of the name, if any.
    pub fn prefix(&self) -> Option<String> {
        self.start
            .name()
            .prefix()
            .map(|prefix| String::from_utf8_lossy(prefix.as_ref()).into_owned())
    }

    /// Qualified names and unescaped values of all well-formed attributes, namespace
    /// declarations included.
    pub fn qualified_attributes(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.start.attributes().flatten().filter_map(|attr| {
            let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().ok()?.into_owned();
            Some((name, value))
        })
    }

    /// The child elements.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Other(_) => None,
        })
    }

    /// The first child element with local name `local`.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children().find(|child| child.is(local))
    }

    /// The concatenated text of all descendants.
    pub fn text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Element(element) => element.collect_text(out),
                Node::Other(Event::Text(text)) => match text.unescape() {
                    Ok(unescaped) => out.push_str(&unescaped),
                    Err(_) => out.push_str(&String::from_utf8_lossy(text)),
                },
                Node::Other(Event::CData(cdata)) => out.push_str(&String::from_utf8_lossy(cdata)),
                Node::Other(_) => {}
            }
        }
    }

    /// Visit every element in document order, self included.
    pub fn descendants(&self, visit: &mut impl FnMut(&Element)) {
        visit(self);
        for child in self.children() {
            child.descendants(visit);
        }
    }

    /// The topmost descendants matching `is_row`, in document order.
    ///
    /// Rows are not searched for nested rows.
    pub fn rows(&self, is_row: &impl Fn(&Element) -> bool) -> Vec<&Element> {
        let mut rows = vec![];
        self.collect_rows(is_row, &mut rows);
        rows
    }

    fn collect_rows<'a>(&'a self, is_row: &impl Fn(&Element) -> bool, rows: &mut Vec<&'a Element>) {
        for child in self.children() {
            if is_row(child) {
                rows.push(child);
            } else {
                child.collect_rows(is_row, rows);
            }
        }
    }

    /// Remove the rows for which `keep` is false, visiting them in the order of [Self::rows].
    ///
    /// Whitespace directly before a removed row goes with it. Returns the number of rows
    /// removed.
    pub fn retain_rows(
        &mut self,
        is_row: &impl Fn(&Element) -> bool,
        keep: &mut impl FnMut(&Element) -> bool,
    ) -> usize {
        let mut removed = 0;
        let mut index = 0;

        while index < self.children.len() {
            let Node::Element(child) = &mut self.children[index] else {
                index += 1;
                continue;
            };

            if !is_row(child) {
                removed += child.retain_rows(is_row, keep);
                index += 1;
            } else if keep(child) {
                index += 1;
            } else {
                self.children.remove(index);
                removed += 1;
                if index > 0 && self.children[index - 1].is_whitespace() {
                    self.children.remove(index - 1);
                    index -= 1;
                }
            }
        }

        removed
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> anyhow::Result<()> {
        if self.empty {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }

        writer.write_event(Event::Start(self.start.borrow()))?;
        for node in &self.children {
            match node {
                Node::Element(element) => element.write(writer)?,
                Node::Other(event) => writer.write_event(event)?,
            }
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }
}

/// A parsed XML document.
#[derive(Clone, Debug)]
pub struct XmlDocument {
    prolog: Vec<Event<'static>>,
    root: Element,
    epilog: Vec<Event<'static>>,
}

impl XmlDocument {
    /// Parse `text`, which must be well-formed with exactly one root element.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut reader = Reader::from_str(text);
        let mut builder = TreeBuilder::default();

        loop {
            let event = reader.read_event().map_err(|err| {
                error::response_parse(anyhow::anyhow!(
                    "at position {}: {err}",
                    reader.buffer_position()
                ))
            })?;

            match event {
                Event::Start(start) => builder.stack.push(Element::new(start.into_owned(), false)),
                Event::Empty(start) => {
                    builder.attach(Node::Element(Element::new(start.into_owned(), true)))?
                }
                Event::End(end) => {
                    let Some(element) = builder.stack.pop() else {
                        return Err(error::response_parse(anyhow::anyhow!(
                            "unexpected end tag {}",
                            String::from_utf8_lossy(end.name().as_ref())
                        )));
                    };
                    builder.attach(Node::Element(element))?;
                }
                Event::Eof => break,
                other => builder.attach(Node::Other(other.into_owned()))?,
            }
        }

        builder.finish()
    }

    /// The root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The root element, mutably.
    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Serialize the document.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer).map_err(error::unclassified)?;
        Ok(writer.into_inner())
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> anyhow::Result<()> {
        for event in &self.prolog {
            writer.write_event(event)?;
        }
        self.root.write(writer)?;
        for event in &self.epilog {
            writer.write_event(event)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    root: Option<Element>,
    prolog: Vec<Event<'static>>,
    epilog: Vec<Event<'static>>,
}

impl TreeBuilder {
    fn attach(&mut self, node: Node) -> Result<(), Error> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }

        match node {
            Node::Element(element) if self.root.is_none() => {
                self.root = Some(element);
                Ok(())
            }
            Node::Element(element) => Err(error::response_parse(anyhow::anyhow!(
                "second root element {}",
                element.local_name()
            ))),
            Node::Other(Event::Text(text)) if !text.iter().all(u8::is_ascii_whitespace) => Err(
                error::response_parse(anyhow::anyhow!("text outside the root element")),
            ),
            Node::Other(event) => {
                match self.root {
                    None => self.prolog.push(event),
                    Some(_) => self.epilog.push(event),
                }
                Ok(())
            }
        }
    }

    fn finish(self) -> Result<XmlDocument, Error> {
        if let Some(open) = self.stack.last() {
            return Err(error::response_parse(anyhow::anyhow!(
                "unclosed element {}",
                open.local_name()
            )));
        }

        let Some(root) = self.root else {
            return Err(error::response_parse(anyhow::anyhow!("no root element")));
        };

        Ok(XmlDocument {
            prolog: self.prolog,
            root,
            epilog: self.epilog,
        })
    }
}

/// Where the entries of an XML response are and what they refer to.
pub trait XmlRows: Send + Sync {
    /// Whether a document with this root element has the expected format.
    fn accepts(&self, _root: &Element) -> bool {
        true
    }

    /// Whether `element` is an entry.
    fn is_row(&self, element: &Element) -> bool;

    /// The resources entry `row` of the document rooted at `root` refers to.
    fn resources(&self, root: &Element, row: &Element) -> Vec<ResourceRef>;
}

/// Remove the entries of the XML `body` that refer to resources `decider` does not permit.
///
/// A body that is not well-formed fails the whole response.
pub async fn filter(
    body: &[u8],
    rows: &dyn XmlRows,
    decider: &Decider<'_>,
) -> Result<Vec<u8>, Error> {
    filter_document(body, rows, decider).await?.to_bytes()
}

/// Like [filter], returning the filtered document instead of its serialization.
pub async fn filter_document(
    body: &[u8],
    rows: &dyn XmlRows,
    decider: &Decider<'_>,
) -> Result<XmlDocument, Error> {
    let text = std::str::from_utf8(body).map_err(error::response_parse)?;
    let mut document = XmlDocument::parse(text)?;

    if !rows.accepts(document.root()) {
        return Err(error::response_parse(anyhow::anyhow!(
            "unexpected root element {}",
            document.root().local_name()
        )));
    }

    let is_row = |element: &Element| rows.is_row(element);
    let entries: Vec<Vec<ResourceRef>> = document
        .root()
        .rows(&is_row)
        .into_iter()
        .map(|row| rows.resources(document.root(), row))
        .collect();

    let verdicts = decider.verdicts(&entries).await?;

    let mut next = in_order(verdicts);
    let removed = document.root_mut().retain_rows(&is_row, &mut |_: &Element| next());
    debug!(entries = entries.len(), removed, "filtered XML response");

    Ok(document)
}

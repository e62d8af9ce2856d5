//! XACML request contexts.

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

use crate::{
    attribute::{AttributeSet, AttributeValue, Category},
    id::{xacml, XACML_2_CONTEXT_NS},
};

/// One subject of a request, with its subject category.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Subject {
    category: String,
    attributes: AttributeSet,
}

impl Subject {
    /// A subject in the given subject category.
    pub fn new(category: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            category: category.into(),
            attributes,
        }
    }

    /// The subject-category URI.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The attributes describing this subject.
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }
}

/// A request-scoped bundle of categorized attributes.
///
/// A context can only be obtained through [RequestContextBuilder] and is immutable afterwards.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RequestContext {
    subjects: Vec<Subject>,
    resource: AttributeSet,
    action: AttributeSet,
    environment: AttributeSet,
}

impl RequestContext {
    /// Start building a new context.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// The subjects of the request.
    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    /// The resource attributes.
    pub fn resource(&self) -> &AttributeSet {
        &self.resource
    }

    /// The action attributes.
    pub fn action(&self) -> &AttributeSet {
        &self.action
    }

    /// The environment attributes.
    pub fn environment(&self) -> &AttributeSet {
        &self.environment
    }

    /// Iterate all `(attribute id, value)` pairs of a category.
    ///
    /// For [Category::Subject] the pairs of every subject are yielded.
    pub fn attributes(
        &self,
        category: Category,
    ) -> Box<dyn Iterator<Item = (&str, &AttributeValue)> + '_> {
        fn flatten(set: &AttributeSet) -> impl Iterator<Item = (&str, &AttributeValue)> {
            set.iter()
                .flat_map(|(id, values)| values.iter().map(move |value| (id, value)))
        }

        match category {
            Category::Subject => Box::new(
                self.subjects
                    .iter()
                    .flat_map(|subject| flatten(&subject.attributes)),
            ),
            Category::Resource => Box::new(flatten(&self.resource)),
            Category::Action => Box::new(flatten(&self.action)),
            Category::Environment => Box::new(flatten(&self.environment)),
        }
    }

    /// The values of attribute `id` in `category`.
    pub fn values<'a>(
        &'a self,
        category: Category,
        id: &'a str,
    ) -> impl Iterator<Item = &'a AttributeValue> + 'a {
        self.attributes(category)
            .filter(move |(attr_id, _)| *attr_id == id)
            .map(|(_, value)| value)
    }

    /// Whether the category carries no attributes at all.
    pub fn is_empty(&self, category: Category) -> bool {
        self.attributes(category).next().is_none()
    }

    /// The first value of the standard `resource-id` attribute, in canonical form.
    pub fn resource_id(&self) -> Option<String> {
        self.resource
            .get(xacml::RESOURCE_ID)
            .first()
            .map(AttributeValue::encode)
    }

    /// Serialize as an XACML 2.0 `Request` document.
    pub fn to_xacml(&self) -> anyhow::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("Request").with_attributes([("xmlns", XACML_2_CONTEXT_NS)]),
        ))?;

        for subject in &self.subjects {
            write_attribute_group(
                &mut writer,
                BytesStart::new("Subject").with_attributes([("SubjectCategory", subject.category())]),
                &subject.attributes,
            )?;
        }
        write_attribute_group(&mut writer, BytesStart::new("Resource"), &self.resource)?;
        write_attribute_group(&mut writer, BytesStart::new("Action"), &self.action)?;
        write_attribute_group(&mut writer, BytesStart::new("Environment"), &self.environment)?;

        writer.write_event(Event::End(BytesEnd::new("Request")))?;

        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn write_attribute_group(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    attributes: &AttributeSet,
) -> anyhow::Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;

    for (id, values) in attributes.iter() {
        // one Attribute element per datatype, as XACML requires homogeneous bags
        let mut types = Vec::with_capacity(1);
        for ty in values.iter().map(AttributeValue::ty) {
            if !types.contains(&ty) {
                types.push(ty);
            }
        }

        for ty in types {
            writer.write_event(Event::Start(
                BytesStart::new("Attribute")
                    .with_attributes([("AttributeId", id), ("DataType", ty.uri())]),
            ))?;
            for value in values.iter().filter(|value| value.ty() == ty) {
                let encoded = value.encode();
                writer.write_event(Event::Start(BytesStart::new("AttributeValue")))?;
                writer.write_event(Event::Text(BytesText::new(&encoded)))?;
                writer.write_event(Event::End(BytesEnd::new("AttributeValue")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("Attribute")))?;
        }
    }

    writer.write_event(Event::End(end))?;
    Ok(())
}

/// Builder for [RequestContext].
#[derive(Default)]
pub struct RequestContextBuilder {
    subjects: Vec<Subject>,
    resource: AttributeSet,
    action: AttributeSet,
    environment: AttributeSet,
}

impl RequestContextBuilder {
    /// Add a complete subject.
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    /// Add an attribute to the access subject, creating it if needed.
    pub fn subject_attribute(mut self, id: &str, value: AttributeValue) -> Self {
        let index = match self
            .subjects
            .iter()
            .position(|subject| subject.category == xacml::ACCESS_SUBJECT)
        {
            Some(index) => index,
            None => {
                self.subjects
                    .push(Subject::new(xacml::ACCESS_SUBJECT, AttributeSet::default()));
                self.subjects.len() - 1
            }
        };
        self.subjects[index].attributes.insert(id, value);
        self
    }

    /// Add a resource attribute.
    pub fn resource_attribute(mut self, id: &str, value: AttributeValue) -> Self {
        self.resource.insert(id, value);
        self
    }

    /// Merge a set of resource attributes.
    pub fn resource_attributes(mut self, set: &AttributeSet) -> Self {
        self.resource.merge(set);
        self
    }

    /// Add an action attribute.
    pub fn action_attribute(mut self, id: &str, value: AttributeValue) -> Self {
        self.action.insert(id, value);
        self
    }

    /// Merge a set of action attributes.
    pub fn action_attributes(mut self, set: &AttributeSet) -> Self {
        self.action.merge(set);
        self
    }

    /// Add an environment attribute.
    pub fn environment_attribute(mut self, id: &str, value: AttributeValue) -> Self {
        self.environment.insert(id, value);
        self
    }

    /// Merge a set of environment attributes.
    pub fn environment_attributes(mut self, set: &AttributeSet) -> Self {
        self.environment.merge(set);
        self
    }

    /// Finish the context.
    pub fn build(self) -> RequestContext {
        RequestContext {
            subjects: self.subjects,
            resource: self.resource,
            action: self.action,
            environment: self.environment,
        }
    }
}

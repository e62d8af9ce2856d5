//! The index map: which attributes a policy store knows how to index.

use serde::{Deserialize, Serialize};

use crate::{
    attribute::{AttributeType, Category},
    id::{repository, xacml},
};

/// One indexed attribute: id and the datatype its values are encoded with.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct IndexedAttribute {
    /// Attribute identifier.
    pub id: String,

    /// Attribute datatype.
    #[serde(rename = "type", default = "default_type")]
    pub ty: AttributeType,
}

fn default_type() -> AttributeType {
    AttributeType::String
}

/// The ordered indexed attributes of one category.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(transparent)]
pub struct CategoryIndex {
    attributes: Vec<IndexedAttribute>,
}

/// Per category, the ordered list of `attribute id -> datatype` entries a store indexes.
///
/// Loaded once when the store is initialized and read-only afterwards.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct IndexMap {
    #[serde(default)]
    subject: CategoryIndex,

    #[serde(default)]
    resource: CategoryIndex,

    #[serde(default)]
    action: CategoryIndex,

    #[serde(default)]
    environment: CategoryIndex,
}

impl IndexMap {
    /// The attributes indexed by a default repository installation.
    pub fn repository_default() -> Self {
        let mut map = Self::default();

        let subject = map.category_mut(Category::Subject);
        subject.put(xacml::SUBJECT_ID, AttributeType::String);
        subject.put(repository::SUBJECT_LOGIN_ID, AttributeType::String);
        subject.put(repository::SUBJECT_ROLE, AttributeType::String);

        let resource = map.category_mut(Category::Resource);
        resource.put(xacml::RESOURCE_ID, AttributeType::String);
        resource.put(repository::OBJECT_PID, AttributeType::String);
        resource.put(repository::OBJECT_NAMESPACE, AttributeType::String);
        resource.put(repository::DATASTREAM_ID, AttributeType::String);
        resource.put(repository::SDEF_PID, AttributeType::String);

        let action = map.category_mut(Category::Action);
        action.put(repository::ACTION_ID, AttributeType::String);
        action.put(repository::ACTION_API, AttributeType::String);

        map
    }

    /// The index of one category.
    pub fn category(&self, category: Category) -> &CategoryIndex {
        match category {
            Category::Subject => &self.subject,
            Category::Resource => &self.resource,
            Category::Action => &self.action,
            Category::Environment => &self.environment,
        }
    }

    /// Get a mutable reference to the index of one category.
    pub fn category_mut(&mut self, category: Category) -> &mut CategoryIndex {
        match category {
            Category::Subject => &mut self.subject,
            Category::Resource => &mut self.resource,
            Category::Action => &mut self.action,
            Category::Environment => &mut self.environment,
        }
    }

    /// The datatype `id` is indexed with in `category`, if it is indexed at all.
    pub fn lookup(&self, category: Category, id: &str) -> Option<AttributeType> {
        self.category(category).lookup(id)
    }

    /// Whether no attribute is indexed in any category.
    pub fn is_empty(&self) -> bool {
        Category::ALL
            .iter()
            .all(|category| self.category(*category).is_empty())
    }
}

impl CategoryIndex {
    /// Put an attribute into the index, replacing the datatype if it was already present.
    pub fn put(&mut self, id: impl Into<String>, ty: AttributeType) {
        let id = id.into();
        match self.attributes.iter_mut().find(|attr| attr.id == id) {
            Some(existing) => existing.ty = ty,
            None => self.attributes.push(IndexedAttribute { id, ty }),
        }
    }

    /// The datatype of `id`.
    pub fn lookup(&self, id: &str) -> Option<AttributeType> {
        self.attributes
            .iter()
            .find(|attr| attr.id == id)
            .map(|attr| attr.ty)
    }

    /// Position of `id` in the configured order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| attr.id == id)
    }

    /// Number of indexed attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate the attributes in configured order.
    pub fn iter(&self) -> std::slice::Iter<'_, IndexedAttribute> {
        self.attributes.iter()
    }
}

impl IntoIterator for CategoryIndex {
    type IntoIter = std::vec::IntoIter<IndexedAttribute>;
    type Item = IndexedAttribute;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

impl<'a> IntoIterator for &'a CategoryIndex {
    type IntoIter = std::slice::Iter<'a, IndexedAttribute>;
    type Item = &'a IndexedAttribute;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.iter()
    }
}

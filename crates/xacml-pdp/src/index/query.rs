//! Candidate queries.
//!
//! A request is first projected onto the [IndexMap]. The projection's *shape*, the number of
//! values bound for each projected attribute, is all a [QueryPlan] is compiled from. Attribute
//! ids and values only enter at execution time through bind variables, so one plan serves every
//! request of the same shape.

use std::fmt::Write;

use tracing::debug;
use xacml_common::{
    attribute::{AttributeBean, AttributeType, AttributeValue, Category},
    context::RequestContext,
    id::xacml,
    index_map::IndexMap,
};

use super::{components::decompose, record::IndexRecord};

/// Namespace of the policy index vocabulary used in rendered queries.
pub const INDEX_NAMESPACE: &str = "urn:xacml-lib:names:policy-index";

/// The index-relevant part of a request.
#[derive(Clone, Default, Debug)]
pub struct Projection {
    categories: [Vec<AttributeBean>; 4],
    components: Vec<String>,
}

impl Projection {
    /// Project `request` onto the indexed attributes.
    ///
    /// Values are re-encoded with the indexed datatype. Values that do not decode as that
    /// datatype cannot match any indexed policy value and are dropped.
    pub fn project(request: &RequestContext, index_map: &IndexMap) -> Self {
        let mut projection = Self::default();

        for category in Category::ALL {
            for indexed in index_map.category(category) {
                let mut bean = AttributeBean::new(indexed.id.as_str(), indexed.ty);

                for value in request.values(category, &indexed.id) {
                    match reencode(value, indexed.ty) {
                        Some(encoded) => bean.add_value(encoded),
                        None => debug!(
                            attribute_id = %indexed.id,
                            %value,
                            ty = %indexed.ty,
                            "dropping value not decodable as indexed type"
                        ),
                    }
                }

                if bean.values.is_empty() {
                    continue;
                }

                if category == Category::Resource && bean.id == xacml::RESOURCE_ID {
                    for value in &bean.values {
                        projection.components.extend(decompose(value));
                    }
                }

                projection.categories[category.index()].push(bean);
            }
        }

        projection.components.sort();
        projection.components.dedup();
        projection
    }

    /// The projected attributes of `category`, in index map order.
    pub fn beans(&self, category: Category) -> &[AttributeBean] {
        &self.categories[category.index()]
    }

    /// The decomposed `resource-id` components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether nothing was projected.
    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(Vec::is_empty)
    }

    /// The shape of this projection.
    pub fn shape(&self) -> ShapeKey {
        ShapeKey {
            counts: self
                .categories
                .each_ref()
                .map(|beans| beans.iter().map(|bean| bean.values.len()).collect()),
            components: self.components.len(),
        }
    }

    /// The bind variables of this projection, by variable name.
    pub fn bindings(&self) -> Vec<(String, String)> {
        let mut bindings = vec![];

        for category in Category::ALL {
            let prefix = variable_prefix(category);
            for (i, bean) in self.beans(category).iter().enumerate() {
                bindings.push((format!("{prefix}{i}"), bean.id.clone()));
                for (j, value) in bean.values.iter().enumerate() {
                    bindings.push((format!("{prefix}{i}_{j}"), value.clone()));
                }
            }
        }

        if !self.components.is_empty() {
            bindings.push(("rid".to_string(), xacml::RESOURCE_ID.to_string()));
            for (k, component) in self.components.iter().enumerate() {
                bindings.push((format!("rc{k}"), component.clone()));
            }
        }

        bindings
    }

    fn value(&self, category: Category, attribute: usize, value: usize) -> Option<(&str, &str)> {
        let bean = self.beans(category).get(attribute)?;
        let value = bean.values.iter().nth(value)?;
        Some((bean.id.as_str(), value.as_str()))
    }
}

fn reencode(value: &AttributeValue, ty: AttributeType) -> Option<String> {
    if value.ty() == ty {
        return Some(value.encode());
    }
    AttributeValue::decode(ty, &value.encode())
        .ok()
        .map(|value| value.encode())
}

fn variable_prefix(category: Category) -> char {
    match category {
        Category::Subject => 's',
        Category::Resource => 'r',
        Category::Action => 'a',
        Category::Environment => 'e',
    }
}

/// Cache key of a compiled plan: per category, the value count of each projected attribute,
/// plus the number of resource-id components.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ShapeKey {
    counts: [Vec<usize>; 4],
    components: usize,
}

#[derive(Debug)]
enum Slot {
    Value { attribute: usize, value: usize },
    Component(usize),
}

#[derive(Debug)]
struct Clause {
    category: Category,
    slots: Vec<Slot>,
}

/// A compiled candidate query.
///
/// A policy is a candidate when, for every category the request says something about, the
/// policy either places no restriction on it or references one of the request's values.
#[derive(Debug)]
pub struct QueryPlan {
    clauses: Vec<Clause>,
    text: String,
}

impl QueryPlan {
    /// Compile the plan for requests of `shape`.
    pub fn compile(shape: &ShapeKey) -> Self {
        let mut clauses = vec![];

        for category in Category::ALL {
            let counts = &shape.counts[category.index()];
            if counts.is_empty() {
                continue;
            }

            let mut slots: Vec<Slot> = counts
                .iter()
                .enumerate()
                .flat_map(|(attribute, count)| {
                    (0..*count).map(move |value| Slot::Value { attribute, value })
                })
                .collect();

            if category == Category::Resource {
                slots.extend((0..shape.components).map(Slot::Component));
            }

            clauses.push(Clause { category, slots });
        }

        let text = render(&clauses);
        Self { clauses, text }
    }

    /// The plan as a path expression over the index vocabulary, with `$` bind variables.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of category clauses.
    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }

    /// Whether the policy indexed as `record` is a candidate for `projection`.
    pub fn matches(&self, record: &IndexRecord, projection: &Projection) -> bool {
        self.clauses.iter().all(|clause| {
            record.is_any(clause.category)
                || clause.slots.iter().any(|slot| match slot {
                    Slot::Value { attribute, value } => projection
                        .value(clause.category, *attribute, *value)
                        .is_some_and(|(id, value)| record.references(clause.category, id, value)),
                    Slot::Component(k) => projection.components.get(*k).is_some_and(|component| {
                        record.references(Category::Resource, xacml::RESOURCE_ID, component)
                    }),
                })
        })
    }
}

fn render(clauses: &[Clause]) -> String {
    let mut text = String::from("/p:policies/p:policy");
    if clauses.is_empty() {
        return text;
    }

    text.push('[');
    for (n, clause) in clauses.iter().enumerate() {
        if n > 0 {
            text.push_str(" and ");
        }

        let label = clause.category.label();
        let prefix = variable_prefix(clause.category);
        let _ = write!(text, "(@p:any-{label}='true'");

        for slot in &clause.slots {
            let _ = match slot {
                Slot::Value { attribute, value } => write!(
                    text,
                    " or p:{label}/p:attribute[@id=${prefix}{attribute}][@value=${prefix}{attribute}_{value}]"
                ),
                Slot::Component(k) => write!(
                    text,
                    " or p:{label}/p:attribute[@id=$rid][@value=$rc{k}]"
                ),
            };
        }
        text.push(')');
    }
    text.push(']');

    text
}

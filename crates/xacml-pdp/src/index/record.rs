//! Index records: what a policy's Target can be found by.

use fnv::{FnvHashMap, FnvHashSet};
use tracing::trace;
use xacml_common::{
    attribute::{AttributeValue, Category},
    id::{function, xacml},
    index_map::IndexMap,
    policy::{PolicyDocument, TargetMatch},
};

use super::components::is_component_pattern;

/// The indexed view of one policy's Target.
///
/// A record is conservative: a category is only restricted when every way the Target can
/// match that category requires at least one of the recorded `(attribute id, value)` pairs.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct IndexRecord {
    any: [bool; 4],
    values: [FnvHashMap<String, FnvHashSet<String>>; 4],
}

impl IndexRecord {
    /// Index the Target of `policy`.
    pub fn build(policy: &PolicyDocument, index_map: &IndexMap) -> Self {
        let mut record = Self::default();

        for category in Category::ALL {
            let target = policy.target.category(category);
            let slot = category.index();

            if target.any {
                record.any[slot] = true;
                continue;
            }

            for alternative in &target.alternatives {
                let keys: Vec<(String, String)> = alternative
                    .iter()
                    .filter_map(|m| index_key(category, m, index_map))
                    .collect();

                if keys.is_empty() {
                    trace!(
                        policy_id = %policy.id,
                        %category,
                        "target alternative cannot be indexed"
                    );
                    record.any[slot] = true;
                    break;
                }

                for (attribute_id, value) in keys {
                    record.values[slot]
                        .entry(attribute_id)
                        .or_default()
                        .insert(value);
                }
            }

            if record.any[slot] {
                record.values[slot].clear();
            }
        }

        record
    }

    /// Whether the policy places no indexable restriction on `category`.
    pub fn is_any(&self, category: Category) -> bool {
        self.any[category.index()]
    }

    /// Whether the policy's Target references `value` of `attribute_id` in `category`.
    pub fn references(&self, category: Category, attribute_id: &str, value: &str) -> bool {
        self.values[category.index()]
            .get(attribute_id)
            .is_some_and(|values| values.contains(value))
    }

    /// Number of indexed values in `category`.
    pub fn value_count(&self, category: Category) -> usize {
        self.values[category.index()]
            .values()
            .map(FnvHashSet::len)
            .sum()
    }
}

/// The literal key a match can be found by, if any.
fn index_key(
    category: Category,
    m: &TargetMatch,
    index_map: &IndexMap,
) -> Option<(String, String)> {
    let attribute_id = m.attribute_id.as_deref()?;
    let ty = index_map.lookup(category, attribute_id)?;

    if function::is_equality(&m.match_id) {
        let value = AttributeValue::decode(ty, &m.value).ok()?;
        return Some((attribute_id.to_string(), value.encode()));
    }

    if function::is_regexp(&m.match_id)
        && category == Category::Resource
        && attribute_id == xacml::RESOURCE_ID
        && is_component_pattern(&m.value)
    {
        return Some((attribute_id.to_string(), m.value.clone()));
    }

    None
}

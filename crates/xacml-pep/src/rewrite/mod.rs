//! Removal of unauthorized entries from search-style responses.
//!
//! Every format follows the same steps: parse the body, collect the resources each entry
//! refers to in document order, decide on all of them in one batch, then drop the entries
//! that refer to anything not permitted and serialize the rest unchanged.

use fnv::{FnvHashMap, FnvHashSet};
use tracing::{debug, warn};
use xacml_common::{
    context::RequestContext,
    evaluator::{evaluate_batch_checked, DecisionEvaluator},
};

use crate::{
    context::{Action, ContextBuilder},
    error::Error,
    path,
    request::PepRequest,
};

pub mod html;
pub mod rdf;
pub mod xml;

/// An object, or one datastream of it, referenced by a response entry.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ResourceRef {
    /// The object PID.
    pub pid: String,
    /// The datastream id.
    pub datastream: Option<String>,
}

impl ResourceRef {
    /// A reference to an object.
    pub fn object(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            datastream: None,
        }
    }

    /// A reference to a datastream.
    pub fn datastream(pid: impl Into<String>, datastream: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            datastream: Some(datastream.into()),
        }
    }

    /// The hierarchical `resource-id` decisions about this resource are correlated by.
    pub fn resource_id(&self) -> String {
        path::resource_id(&self.pid, self.datastream.as_deref(), None)
    }
}

/// Decides on the resources of one response on behalf of the request that produced it.
pub struct Decider<'a> {
    /// The decision point.
    pub evaluator: &'a dyn DecisionEvaluator,
    /// Builds one context per resource.
    pub builder: &'a ContextBuilder,
    /// The request the response answers.
    pub request: &'a PepRequest,
    /// The action each entry is decided for.
    pub action: Action,
}

impl Decider<'_> {
    /// Decide on every distinct resource in `resources` in one batch.
    pub async fn decide(&self, resources: &[ResourceRef]) -> Result<Permissions, Error> {
        let mut seen = FnvHashSet::default();
        let requests: Vec<RequestContext> = resources
            .iter()
            .filter(|resource| seen.insert(*resource))
            .map(|resource| {
                self.builder.build_for_resource(
                    self.request,
                    &self.action,
                    &resource.pid,
                    resource.datastream.as_deref(),
                )
            })
            .collect();

        if requests.is_empty() {
            return Ok(Permissions::default());
        }

        let results = evaluate_batch_checked(self.evaluator, requests).await?;

        let mut permitted: FnvHashMap<String, bool> = FnvHashMap::default();
        for result in results {
            let Some(resource_id) = result.resource_id.clone() else {
                warn!(decision = ?result.decision, "decision result without resource-id");
                continue;
            };
            let entry = permitted.entry(resource_id).or_insert(true);
            *entry = *entry && result.is_permitted();
        }

        debug!(
            action = self.action.name,
            resources = permitted.len(),
            denied = permitted.values().filter(|permitted| !**permitted).count(),
            "decided response entries"
        );

        Ok(Permissions { permitted })
    }

    /// Decide on the resources of each entry, yielding whether each entry may stay.
    pub async fn verdicts(&self, entries: &[Vec<ResourceRef>]) -> Result<Vec<bool>, Error> {
        let resources: Vec<ResourceRef> = entries.iter().flatten().cloned().collect();
        let permissions = self.decide(&resources).await?;

        Ok(entries
            .iter()
            .map(|resources| resources.iter().all(|resource| permissions.is_permitted(resource)))
            .collect())
    }
}

/// Decisions keyed by `resource-id`.
#[derive(Default, Debug)]
pub struct Permissions {
    permitted: FnvHashMap<String, bool>,
}

impl Permissions {
    /// Whether `resource` may be shown.
    ///
    /// A resource no decision was correlated with is left in place, and a warning is logged.
    pub fn is_permitted(&self, resource: &ResourceRef) -> bool {
        let resource_id = resource.resource_id();
        match self.permitted.get(&resource_id) {
            Some(permitted) => *permitted,
            None => {
                warn!(%resource_id, "no decision correlated with entry, leaving it in place");
                true
            }
        }
    }
}

/// Feed precomputed verdicts to a removal pass that visits entries in collection order.
pub(crate) fn in_order(verdicts: Vec<bool>) -> impl FnMut() -> bool {
    let mut verdicts = verdicts.into_iter();
    move || verdicts.next().unwrap_or(true)
}

//! Shape-keyed cache of compiled query plans.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::query::{QueryPlan, ShapeKey};

/// Compiled plans by request shape.
///
/// Two threads that miss on the same shape concurrently may both compile it; the later insert
/// wins and both plans are equivalent.
#[derive(Default)]
pub struct PlanCache {
    plans: DashMap<ShapeKey, Arc<QueryPlan>>,
}

impl PlanCache {
    /// The plan for `shape`, compiling it on first use.
    pub fn get_or_compile(&self, shape: &ShapeKey) -> Arc<QueryPlan> {
        if let Some(plan) = self.plans.get(shape) {
            debug!(?shape, "query plan cache hit");
            return plan.clone();
        }

        let plan = Arc::new(QueryPlan::compile(shape));
        debug!(?shape, query = plan.text(), "compiled query plan");

        self.plans.insert(shape.clone(), plan.clone());
        plan
    }

    /// Number of cached plans.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether no plan has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Drop every cached plan.
    pub fn clear(&self) {
        self.plans.clear();
    }
}

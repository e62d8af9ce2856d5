//! Candidate retrieval.
//!
//! Given a request, an index returns the stored policies that could possibly apply to it. The
//! returned set may contain policies that turn out not to apply, but never omits one that does.

use fnv::FnvHashMap;
use xacml_common::context::RequestContext;

use crate::Error;

pub mod cache;
pub mod components;
pub mod query;
pub mod record;

pub use cache::PlanCache;
pub use query::{Projection, QueryPlan, ShapeKey};
pub use record::IndexRecord;

/// Retrieves candidate policies for a request.
pub trait PolicyIndex: Send + Sync {
    /// The candidate policies for `request`, as `policy id -> document bytes`.
    fn candidates(&self, request: &RequestContext) -> Result<FnvHashMap<String, Vec<u8>>, Error>;
}

//! Enforcement filters and the registry dispatching to them.
//!
//! Every repository operation has a [Filter]. Before the operation runs, the filter turns
//! the request into a request context that must be permitted. Search operations also
//! rewrite their response so that it only lists permitted entries.

use std::{future::Future, pin::Pin, sync::Arc};

use fnv::FnvHashMap;
use tracing::{debug, error, info, warn};
use xacml_common::{context::RequestContext, evaluator::DecisionEvaluator};

use crate::{context::ContextBuilder, error::Error, path::PathParts, request::PepRequest};

mod find_objects;
mod list_datastreams;
mod operation;
mod risearch;

pub use find_objects::{FindObjectsFilter, LIST_OBJECT_IN_FIELD_SEARCH_RESULTS};
pub use list_datastreams::{ListDatastreamsFilter, GET_DATASTREAM};
pub use operation::{resolve, Operation, OperationFilter, ResourceScope, OPERATIONS};
pub use risearch::{RiSearchFilter, LIST_OBJECT_IN_RESOURCE_INDEX_RESULTS};

/// A boxed future returned by [Filter] methods.
pub type FilterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Enforcement for one repository operation.
pub trait Filter: Send + Sync {
    /// The name of the operation, e.g. `getDatastream`.
    fn operation(&self) -> &str;

    /// The request context that must be permitted for `request` to proceed.
    ///
    /// `None` means the request needs no decision.
    fn handle_request(&self, request: &PepRequest) -> Result<Option<RequestContext>, Error>;

    /// Whether [Self::handle_response] rewrites responses.
    fn handles_response(&self) -> bool {
        false
    }

    /// Rewrite the response `body` to `request`.
    ///
    /// Either the whole body is filtered, or an error is returned.
    fn handle_response<'a>(
        &'a self,
        _request: &'a PepRequest,
        body: Vec<u8>,
        _evaluator: &'a dyn DecisionEvaluator,
    ) -> FilterFuture<'a, Vec<u8>> {
        Box::pin(async move { Ok(body) })
    }
}

/// Filters by operation name, and the decision point they consult.
pub struct Enforcer {
    filters: FnvHashMap<String, Arc<dyn Filter>>,
    evaluator: Arc<dyn DecisionEvaluator>,
}

impl Enforcer {
    /// An enforcer without filters. Every operation is denied until a filter is registered.
    pub fn new(evaluator: Arc<dyn DecisionEvaluator>) -> Self {
        Self {
            filters: Default::default(),
            evaluator,
        }
    }

    /// An enforcer with a filter for every known operation.
    pub fn with_default_filters(
        evaluator: Arc<dyn DecisionEvaluator>,
        builder: ContextBuilder,
    ) -> Self {
        let mut enforcer = Self::new(evaluator);

        for operation in OPERATIONS {
            enforcer.register(Arc::new(OperationFilter::new(*operation, builder.clone())));
        }
        enforcer.register(Arc::new(FindObjectsFilter::new(builder.clone())));
        enforcer.register(Arc::new(ListDatastreamsFilter::new(builder.clone())));
        enforcer.register(Arc::new(RiSearchFilter::new(builder)));

        enforcer
    }

    /// Register `filter` for its operation, returning the filter it replaces.
    pub fn register(&mut self, filter: Arc<dyn Filter>) -> Option<Arc<dyn Filter>> {
        self.filters.insert(filter.operation().to_string(), filter)
    }

    /// The filter of `operation`.
    pub fn filter(&self, operation: &str) -> Option<&dyn Filter> {
        self.filters.get(operation).map(|filter| filter.as_ref())
    }

    /// The operation `request` invokes, judged by its effective method and path.
    pub fn operation(&self, request: &PepRequest) -> Result<&'static str, Error> {
        let method = request.effective_method();
        let parts = PathParts::parse(request.path_info())?;

        resolve(&method, &parts).ok_or_else(|| {
            Error::BadRequest(format!("no operation for {method} {}", request.path_info()))
        })
    }

    /// Decide whether `request` may perform `operation`.
    ///
    /// Operations without a filter are denied.
    pub async fn enforce_request(
        &self,
        operation: &str,
        request: &PepRequest,
    ) -> Result<(), Error> {
        let Some(filter) = self.filters.get(operation) else {
            warn!(operation, "no filter registered, denying");
            return Err(Error::AccessDenied);
        };

        let Some(context) = filter.handle_request(request)? else {
            debug!(operation, "request needs no decision");
            return Ok(());
        };

        let result = self.evaluator.evaluate(context).await.map_err(|err| {
            error!(operation, %err, "evaluation failed");
            Error::Evaluation(err)
        })?;

        if result.is_permitted() {
            debug!(operation, resource_id = result.resource_id.as_deref(), "permitted");
            Ok(())
        } else {
            info!(
                operation,
                resource_id = result.resource_id.as_deref(),
                decision = ?result.decision,
                status = result.status.code(),
                user = request.remote_user(),
                "access denied"
            );
            Err(Error::AccessDenied)
        }
    }

    /// Filter the response `body` that `operation` produced for `request`.
    pub async fn enforce_response(
        &self,
        operation: &str,
        request: &PepRequest,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, Error> {
        let Some(filter) = self.filters.get(operation) else {
            warn!(operation, "no filter registered, withholding response");
            return Err(Error::AccessDenied);
        };

        if !filter.handles_response() {
            return Ok(body);
        }

        filter
            .handle_response(request, body, self.evaluator.as_ref())
            .await
            .inspect_err(|err| error!(operation, %err, "response filtering failed"))
    }
}

/// Whether the response format parameter `param` of `request` asks for XML.
fn wants_xml(request: &PepRequest, param: &str) -> bool {
    request
        .param(param)
        .is_some_and(|format| format.eq_ignore_ascii_case("xml"))
}

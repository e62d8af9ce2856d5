//! Filtering of resource index search results.

use xacml_common::{context::RequestContext, evaluator::DecisionEvaluator};

use crate::{
    context::{Action, Api, ContextBuilder},
    error::Error,
    request::PepRequest,
    rewrite::{
        rdf::{self, RdfDescriptions, SparqlResults},
        xml::{self, Element, XmlRows},
        Decider, ResourceRef,
    },
};

use super::{operation::RISEARCH, Filter, FilterFuture, OperationFilter};

/// The action each object in a result is decided for.
pub const LIST_OBJECT_IN_RESOURCE_INDEX_RESULTS: Action =
    Action::new("listObjectInResourceIndexResults", Api::Access);

/// `risearch`: the query must be permitted, and results only mention permitted objects.
///
/// Triples come as RDF/XML and tuples as SPARQL XML. With `format=N-Triples` the filtered
/// RDF/XML graph is rewritten as N-Triples. Other formats cannot be filtered and fail the
/// response.
pub struct RiSearchFilter {
    request_filter: OperationFilter,
}

impl RiSearchFilter {
    /// A filter building contexts with `builder`.
    pub fn new(builder: ContextBuilder) -> Self {
        Self {
            request_filter: OperationFilter::new(RISEARCH, builder),
        }
    }
}

/// RDF/XML descriptions or SPARQL results, depending on the document.
struct ResultRows;

impl XmlRows for ResultRows {
    fn accepts(&self, root: &Element) -> bool {
        root.is("RDF") || root.is("sparql")
    }

    fn is_row(&self, element: &Element) -> bool {
        RdfDescriptions.is_row(element) || SparqlResults.is_row(element)
    }

    fn resources(&self, root: &Element, row: &Element) -> Vec<ResourceRef> {
        if root.is("RDF") {
            RdfDescriptions.resources(root, row)
        } else {
            SparqlResults.resources(root, row)
        }
    }
}

impl Filter for RiSearchFilter {
    fn operation(&self) -> &str {
        self.request_filter.operation()
    }

    fn handle_request(&self, request: &PepRequest) -> Result<Option<RequestContext>, Error> {
        self.request_filter.handle_request(request)
    }

    fn handles_response(&self) -> bool {
        true
    }

    fn handle_response<'a>(
        &'a self,
        request: &'a PepRequest,
        body: Vec<u8>,
        evaluator: &'a dyn DecisionEvaluator,
    ) -> FilterFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let decider = Decider {
                evaluator,
                builder: self.request_filter.builder(),
                request,
                action: LIST_OBJECT_IN_RESOURCE_INDEX_RESULTS,
            };

            let ntriples = request
                .param("format")
                .is_some_and(|format| format.eq_ignore_ascii_case("N-Triples"));

            if ntriples {
                let document = xml::filter_document(&body, &RdfDescriptions, &decider).await?;
                Ok(rdf::to_ntriples(&document)?.into_bytes())
            } else {
                xml::filter(&body, &ResultRows, &decider).await
            }
        })
    }
}

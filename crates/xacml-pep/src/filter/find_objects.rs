//! Filtering of field search results.

use kuchikiki::NodeRef;
use xacml_common::{context::RequestContext, evaluator::DecisionEvaluator};

use crate::{
    context::{Action, Api, ContextBuilder},
    error::Error,
    request::PepRequest,
    rewrite::{
        html::{self, link_text, HtmlRows},
        xml::{self, Element, XmlRows},
        Decider, ResourceRef,
    },
};

use super::{operation::FIND_OBJECTS, wants_xml, Filter, FilterFuture, OperationFilter};

/// The action each listed object is decided for.
pub const LIST_OBJECT_IN_FIELD_SEARCH_RESULTS: Action =
    Action::new("listObjectInFieldSearchResults", Api::Access);

/// `findObjects`: the search must be permitted, and only permitted objects are listed.
///
/// XML results (`resultFormat=xml`) list objects as `objectFields` elements; the HTML page
/// lists each object as a table row linking its PID, followed by a row of its fields.
pub struct FindObjectsFilter {
    request_filter: OperationFilter,
}

impl FindObjectsFilter {
    /// A filter building contexts with `builder`.
    pub fn new(builder: ContextBuilder) -> Self {
        Self {
            request_filter: OperationFilter::new(FIND_OBJECTS, builder),
        }
    }
}

struct ObjectFields;

impl XmlRows for ObjectFields {
    fn accepts(&self, root: &Element) -> bool {
        root.is("result")
    }

    fn is_row(&self, element: &Element) -> bool {
        element.is("objectFields")
    }

    fn resources(&self, _root: &Element, row: &Element) -> Vec<ResourceRef> {
        row.child("pid")
            .map(|pid| ResourceRef::object(pid.text().trim()))
            .into_iter()
            .collect()
    }
}

struct ObjectRows;

impl HtmlRows for ObjectRows {
    fn resources(&self, row: &NodeRef) -> Option<Vec<ResourceRef>> {
        let pid = link_text(row)?;
        if !pid.contains(':') || pid.contains(char::is_whitespace) {
            return None;
        }
        Some(vec![ResourceRef::object(pid)])
    }

    fn paired(&self) -> bool {
        true
    }
}

impl Filter for FindObjectsFilter {
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
                action: LIST_OBJECT_IN_FIELD_SEARCH_RESULTS,
            };

            if wants_xml(request, "resultFormat") {
                xml::filter(&body, &ObjectFields, &decider).await
            } else {
                html::filter(&body, &ObjectRows, &decider).await
            }
        })
    }
}

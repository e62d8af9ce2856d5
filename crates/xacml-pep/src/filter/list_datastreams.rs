//! Filtering of datastream listings.

use kuchikiki::NodeRef;
use percent_encoding::percent_decode_str;
use xacml_common::{context::RequestContext, evaluator::DecisionEvaluator};

use crate::{
    context::{Action, Api, ContextBuilder},
    error::Error,
    path::PathParts,
    request::PepRequest,
    rewrite::{
        html::{self, link_href, HtmlRows},
        xml::{self, Element, XmlRows},
        Decider, ResourceRef,
    },
};

use super::{operation::LIST_DATASTREAMS, wants_xml, Filter, FilterFuture, OperationFilter};

/// The action each listed datastream is decided for.
pub const GET_DATASTREAM: Action = Action::new("getDatastream", Api::Management);

/// `listDatastreams`: the listing must be permitted, and only datastreams the user may read
/// are listed.
pub struct ListDatastreamsFilter {
    request_filter: OperationFilter,
}

impl ListDatastreamsFilter {
    /// A filter building contexts with `builder`.
    pub fn new(builder: ContextBuilder) -> Self {
        Self {
            request_filter: OperationFilter::new(LIST_DATASTREAMS, builder),
        }
    }
}

/// `datastream` elements of an `objectDatastreams` document.
struct DatastreamElements {
    pid: Option<String>,
}

impl XmlRows for DatastreamElements {
    fn accepts(&self, root: &Element) -> bool {
        root.is("objectDatastreams")
    }

    fn is_row(&self, element: &Element) -> bool {
        element.is("datastream")
    }

    fn resources(&self, root: &Element, row: &Element) -> Vec<ResourceRef> {
        let Some(pid) = root.attribute("pid").or_else(|| self.pid.clone()) else {
            return vec![];
        };
        row.attribute("dsid")
            .map(|dsid| ResourceRef::datastream(pid, dsid))
            .into_iter()
            .collect()
    }
}

/// Table rows linking `.../datastreams/{dsid}`.
struct DatastreamRows {
    pid: Option<String>,
}

impl HtmlRows for DatastreamRows {
    fn resources(&self, row: &NodeRef) -> Option<Vec<ResourceRef>> {
        let href = link_href(row)?;
        let (_, rest) = href.split_once("/datastreams/")?;
        let dsid = rest.split(['/', '?']).next().filter(|dsid| !dsid.is_empty())?;
        let dsid = percent_decode_str(dsid).decode_utf8().ok()?;

        let pid = self.pid.clone()?;
        Some(vec![ResourceRef::datastream(pid, dsid)])
    }
}

impl Filter for ListDatastreamsFilter {
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
            let pid = PathParts::parse(request.path_info())?
                .pid
                .or_else(|| request.param("pid").map(str::to_string));

            let decider = Decider {
                evaluator,
                builder: self.request_filter.builder(),
                request,
                action: GET_DATASTREAM,
            };

            if wants_xml(request, "format") {
                xml::filter(&body, &DatastreamElements { pid }, &decider).await
            } else {
                html::filter(&body, &DatastreamRows { pid }, &decider).await
            }
        })
    }
}

//! Table-driven request filters for repository operations.

use http::Method;
use xacml_common::{
    attribute::AttributeSet,
    context::RequestContext,
    id::repository,
};

use crate::{
    context::{Action, Api, ContextBuilder},
    error::{self, Error},
    mapper::ResourceAttributeMapper,
    path::PathParts,
    request::PepRequest,
};

use super::Filter;

use self::ResourceScope::{Object, OptionalObject, Repository};
use crate::context::Api::{Access as A, Management as M};

/// What part of the repository an operation addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceScope {
    /// The repository as a whole, e.g. searches. Request parameters describe the query and
    /// are not mapped to resource attributes.
    Repository,
    /// One object, which must be named by the path or a `pid` parameter.
    Object,
    /// An object when one is named, e.g. ingest with or without a chosen PID.
    OptionalObject,
}

/// A repository operation and the resource it addresses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Operation {
    /// The action decided for.
    pub action: Action,
    /// The addressed resource.
    pub scope: ResourceScope,
}

const fn op(name: &'static str, api: Api, scope: ResourceScope) -> Operation {
    Operation {
        action: Action::new(name, api),
        scope,
    }
}

pub(super) const FIND_OBJECTS: Operation = op("findObjects", A, Repository);
pub(super) const RISEARCH: Operation = op("risearch", A, Repository);
pub(super) const LIST_DATASTREAMS: Operation = op("listDatastreams", A, Object);

/// The known operations.
pub const OPERATIONS: &[Operation] = &[
    FIND_OBJECTS,
    RISEARCH,
    op("getObjectProfile", A, Object),
    op("getObjectHistory", A, Object),
    LIST_DATASTREAMS,
    op("listMethods", A, Object),
    op("getDatastreamDissemination", A, Object),
    op("getDissemination", A, Object),
    op("getDatastream", M, Object),
    op("getDatastreamHistory", M, Object),
    op("getObjectXML", M, Object),
    op("export", M, Object),
    op("validate", M, Object),
    op("getRelationships", M, Object),
    op("modifyObject", M, Object),
    op("purgeObject", M, Object),
    op("addDatastream", M, Object),
    op("modifyDatastream", M, Object),
    op("purgeDatastream", M, Object),
    op("getNextPID", M, Repository),
    op("ingest", M, OptionalObject),
];

/// The operation a request with `method` and path `parts` invokes.
pub fn resolve(method: &Method, parts: &PathParts) -> Option<&'static str> {
    let method = method.as_str();

    match parts.endpoint.as_str() {
        "risearch" => Some("risearch"),
        "get" => match (&parts.pid, &parts.datastream, &parts.method) {
            (Some(_), Some(_), _) => Some("getDatastreamDissemination"),
            (Some(_), None, Some(_)) => Some("getDissemination"),
            (Some(_), None, None) => Some("getObjectProfile"),
            (None, ..) => None,
        },
        "objects" => resolve_objects(method, parts),
        _ => None,
    }
}

fn resolve_objects(method: &str, parts: &PathParts) -> Option<&'static str> {
    if let Some(keyword) = parts.keyword.as_deref() {
        return match (keyword, method) {
            ("nextPID", "POST") => Some("getNextPID"),
            ("new", "POST") => Some("ingest"),
            _ => None,
        };
    }

    if parts.pid.is_none() {
        return (method == "GET").then_some("findObjects");
    }

    if parts.sdef.is_some() {
        return match (parts.method.is_some(), method) {
            (true, "GET" | "POST") => Some("getDissemination"),
            (false, "GET") => Some("listMethods"),
            _ => None,
        };
    }

    if parts.datastream.is_some() {
        return match (parts.view.as_deref(), method) {
            (Some("content"), "GET") => Some("getDatastreamDissemination"),
            (Some("history"), "GET") => Some("getDatastreamHistory"),
            (None, "GET") => Some("getDatastream"),
            (None, "POST") => Some("addDatastream"),
            (None, "PUT") => Some("modifyDatastream"),
            (None, "DELETE") => Some("purgeDatastream"),
            _ => None,
        };
    }

    match (parts.view.as_deref(), method) {
        (Some("datastreams"), "GET") => Some("listDatastreams"),
        (Some("methods"), "GET") => Some("listMethods"),
        (Some("objectXML"), "GET") => Some("getObjectXML"),
        (Some("export"), "GET") => Some("export"),
        (Some("versions"), "GET") => Some("getObjectHistory"),
        (Some("validate"), "GET") => Some("validate"),
        (Some("relationships"), "GET") => Some("getRelationships"),
        (None, "GET") => Some("getObjectProfile"),
        (None, "POST") => Some("ingest"),
        (None, "PUT") => Some("modifyObject"),
        (None, "DELETE") => Some("purgeObject"),
        _ => None,
    }
}

/// Decides one request of an [Operation] on the resource its path and parameters name.
#[derive(Clone)]
pub struct OperationFilter {
    operation: Operation,
    builder: ContextBuilder,
    mapper: ResourceAttributeMapper,
}

impl OperationFilter {
    /// A filter for `operation`.
    pub fn new(operation: Operation, builder: ContextBuilder) -> Self {
        Self {
            operation,
            builder,
            mapper: ResourceAttributeMapper,
        }
    }

    /// The filter of the known operation `name`.
    pub fn named(name: &str, builder: ContextBuilder) -> Option<Self> {
        OPERATIONS
            .iter()
            .find(|operation| operation.action.name == name)
            .map(|operation| Self::new(*operation, builder))
    }

    /// The action decided for.
    pub fn action(&self) -> Action {
        self.operation.action
    }

    /// The context builder.
    pub fn builder(&self) -> &ContextBuilder {
        &self.builder
    }

    /// The resource attributes of `request`.
    pub fn resource(&self, request: &PepRequest) -> Result<AttributeSet, Error> {
        let parts = PathParts::parse(request.path_info())?;

        match self.operation.scope {
            ResourceScope::Repository => Ok(AttributeSet::default()),
            ResourceScope::OptionalObject => Ok(self.mapper.map(request, &parts)),
            ResourceScope::Object => {
                let resource = self.mapper.map(request, &parts);
                if !resource.contains(repository::OBJECT_PID) {
                    return Err(error::bad_request(format!(
                        "{} requires an object: {}",
                        self.operation.action.name,
                        request.path_info()
                    )));
                }
                Ok(resource)
            }
        }
    }
}

impl Filter for OperationFilter {
    fn operation(&self) -> &str {
        self.operation.action.name
    }

    fn handle_request(&self, request: &PepRequest) -> Result<Option<RequestContext>, Error> {
        let resource = self.resource(request)?;
        Ok(Some(self.builder.build(
            request,
            &self.operation.action,
            &resource,
        )))
    }
}

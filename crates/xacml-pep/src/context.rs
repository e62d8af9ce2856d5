//! Building XACML request contexts for repository operations.

use std::sync::Arc;

use time::{OffsetDateTime, UtcOffset};
use xacml_common::{
    attribute::{AttributeSet, AttributeValue},
    context::{RequestContext, RequestContextBuilder},
    id::{repository, xacml},
};

use crate::{
    mapper::namespace,
    path::resource_id,
    request::{PepRequest, REPRESENTED_USER_HEADER},
};

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> OffsetDateTime;
}

/// The system clock.
#[derive(Clone, Copy, Default, Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock stopped at one instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// The API family of an operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Api {
    /// Read access.
    Access,
    /// Management.
    Management,
}

impl Api {
    /// The `api` action attribute value.
    pub fn uri(self) -> &'static str {
        match self {
            Self::Access => repository::API_A,
            Self::Management => repository::API_M,
        }
    }
}

/// A repository operation as seen by policy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Action {
    /// The operation name, e.g. `getDatastream`.
    pub name: &'static str,
    /// The API family.
    pub api: Api,
}

impl Action {
    /// An action of `api` named `name`.
    pub const fn new(name: &'static str, api: Api) -> Self {
        Self { name, api }
    }

    /// The `action-id` value, e.g. `urn:fedora:names:fedora:2.1:action:id-getDatastream`.
    pub fn id(&self) -> String {
        format!("{}{}", repository::ACTION_ID_PREFIX, self.name)
    }
}

/// Builds request contexts from requests, actions and resource attributes.
///
/// Contexts are deterministic for a given request and clock.
#[derive(Clone)]
pub struct ContextBuilder {
    clock: Arc<dyn Clock>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// A builder using the system clock.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for the environment's current time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The context of `request` performing `action` on the resource described by `resource`.
    ///
    /// The hierarchical `resource-id` is derived from the object, datastream and
    /// dissemination attributes of `resource`.
    pub fn build(
        &self,
        request: &PepRequest,
        action: &Action,
        resource: &AttributeSet,
    ) -> RequestContext {
        let mut builder = self.principal(request, action).resource_attributes(resource);

        if let Some(resource_id) = hierarchical_id(resource) {
            builder = builder.resource_attribute(xacml::RESOURCE_ID, AttributeValue::string(resource_id));
        }

        builder.build()
    }

    /// The context of `request` performing `action` on one object, or one of its datastreams.
    ///
    /// Used to decide on the entries of a search result, where request parameters describe
    /// the search rather than the entry.
    pub fn build_for_resource(
        &self,
        request: &PepRequest,
        action: &Action,
        pid: &str,
        datastream: Option<&str>,
    ) -> RequestContext {
        let mut resource = AttributeSet::default();
        resource.insert(repository::OBJECT_PID, AttributeValue::string(pid));
        if let Some(namespace) = namespace(pid) {
            resource.insert(repository::OBJECT_NAMESPACE, AttributeValue::string(namespace));
        }
        if let Some(datastream) = datastream {
            resource.insert(repository::DATASTREAM_ID, AttributeValue::string(datastream));
        }

        self.build(request, action, &resource)
    }

    /// Subject, action and environment of `request`.
    fn principal(&self, request: &PepRequest, action: &Action) -> RequestContextBuilder {
        let mut builder = RequestContext::builder();

        if let Some(user) = request.remote_user() {
            builder = builder
                .subject_attribute(xacml::SUBJECT_ID, AttributeValue::string(user))
                .subject_attribute(repository::SUBJECT_LOGIN_ID, AttributeValue::string(user));
        }
        if let Some(represented) = request.header(REPRESENTED_USER_HEADER) {
            builder = builder.subject_attribute(
                repository::SUBJECT_REPRESENTED_USER,
                AttributeValue::string(represented),
            );
        }
        for role in request.roles() {
            builder = builder.subject_attribute(repository::SUBJECT_ROLE, AttributeValue::string(role));
        }

        let action_id = action.id();
        builder = builder
            .action_attribute(xacml::ACTION_ID, AttributeValue::string(&action_id))
            .action_attribute(repository::ACTION_ID, AttributeValue::string(action_id))
            .action_attribute(repository::ACTION_API, AttributeValue::string(action.api.uri()));

        let now = self.clock.now().to_offset(UtcOffset::UTC);
        builder = builder
            .environment_attribute(xacml::CURRENT_DATETIME, AttributeValue::DateTime(now))
            .environment_attribute(xacml::CURRENT_DATE, AttributeValue::Date(now.date()))
            .environment_attribute(xacml::CURRENT_TIME, AttributeValue::Time(now.time()))
            .environment_attribute(
                repository::ENV_METHOD,
                AttributeValue::string(request.effective_method().as_str()),
            )
            .environment_attribute(
                repository::ENV_SECURITY,
                AttributeValue::string(if request.is_secure() { "secure" } else { "insecure" }),
            );
        if let Some(addr) = request.remote_addr() {
            builder = builder
                .environment_attribute(repository::ENV_CLIENT_IP, AttributeValue::string(addr.to_string()));
        }

        builder
    }
}

fn hierarchical_id(resource: &AttributeSet) -> Option<String> {
    let first = |id: &str| resource.get(id).first().map(AttributeValue::encode);

    let pid = first(repository::OBJECT_PID)?;
    let datastream = first(repository::DATASTREAM_ID);
    let sdef = first(repository::SDEF_PID);
    let method = first(repository::DISSEMINATOR_METHOD);

    Some(resource_id(
        &pid,
        datastream.as_deref(),
        sdef.as_deref().zip(method.as_deref()),
    ))
}

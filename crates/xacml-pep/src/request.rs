//! The enforcement point's view of an incoming HTTP request.

use std::net::IpAddr;

use http::{header::HeaderName, HeaderMap, HeaderValue, Method};
use tracing::warn;

/// Header that lets clients tunnel a method through `POST`.
pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// Header naming the user an authenticated login acts on behalf of.
pub const REPRESENTED_USER_HEADER: &str = "x-represented-user";

/// Request extension carrying the authenticated user name.
#[derive(Clone, Debug)]
pub struct RemoteUser(pub String);

/// Request extension carrying the peer address.
#[derive(Clone, Copy, Debug)]
pub struct RemoteAddr(pub IpAddr);

/// Request extension carrying the roles of the authenticated user.
#[derive(Clone, Debug, Default)]
pub struct UserRoles(pub Vec<String>);

/// Method, path, parameters, headers and the authenticated principal of one request.
#[derive(Clone, Debug)]
pub struct PepRequest {
    method: Method,
    path_info: String,
    params: Vec<(String, String)>,
    headers: HeaderMap,
    remote_user: Option<String>,
    remote_addr: Option<IpAddr>,
    roles: Vec<String>,
    secure: bool,
}

impl PepRequest {
    /// A request without parameters, headers or principal.
    pub fn new(method: Method, path_info: impl Into<String>) -> Self {
        Self {
            method,
            path_info: path_info.into(),
            params: vec![],
            headers: HeaderMap::new(),
            remote_user: None,
            remote_addr: None,
            roles: vec![],
            secure: false,
        }
    }

    /// Capture the parts of an `http` request that enforcement looks at.
    ///
    /// The principal is read from the [RemoteUser], [RemoteAddr] and [UserRoles] extensions
    /// that the authentication layer attaches.
    pub fn from_http<B>(request: &http::Request<B>) -> Self {
        let uri = request.uri();
        let mut pep_request = Self::new(request.method().clone(), uri.path());

        if let Some(query) = uri.query() {
            pep_request = pep_request.with_query(query);
        }

        pep_request.headers = request.headers().clone();
        pep_request.secure = uri.scheme() == Some(&http::uri::Scheme::HTTPS);

        let extensions = request.extensions();
        pep_request.remote_user = extensions.get::<RemoteUser>().map(|user| user.0.clone());
        pep_request.remote_addr = extensions.get::<RemoteAddr>().map(|addr| addr.0);
        pep_request.roles = extensions
            .get::<UserRoles>()
            .map(|roles| roles.0.clone())
            .unwrap_or_default();

        pep_request
    }

    /// Add the parameters of an `application/x-www-form-urlencoded` query string.
    pub fn with_query(mut self, query: &str) -> Self {
        self.params.extend(
            form_urlencoded::parse(query.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned())),
        );
        self
    }

    /// Add one parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(name, "ignoring invalid header"),
        }
        self
    }

    /// Set the authenticated user.
    pub fn with_remote_user(mut self, user: impl Into<String>) -> Self {
        self.remote_user = Some(user.into());
        self
    }

    /// Set the peer address.
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Add a role of the authenticated user.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Mark the request as received over a secure transport.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// The method the request was received with.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The method the client asked for, honouring `X-HTTP-Method-Override`.
    pub fn effective_method(&self) -> Method {
        let Some(value) = self.header(METHOD_OVERRIDE_HEADER) else {
            return self.method.clone();
        };

        match Method::from_bytes(value.trim().to_ascii_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                warn!(value, "ignoring invalid method override");
                self.method.clone()
            }
        }
    }

    /// The request path below the servlet root.
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    /// The first value of parameter `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params(name).next()
    }

    /// Every value of parameter `name`, in request order.
    pub fn params<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.params
            .iter()
            .filter(move |(param, _)| param == name)
            .map(|(_, value)| value.as_str())
    }

    /// All parameters, in request order.
    pub fn all_params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The first value of header `name`, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The authenticated user.
    pub fn remote_user(&self) -> Option<&str> {
        self.remote_user.as_deref()
    }

    /// The peer address.
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    /// Roles of the authenticated user.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Whether the request arrived over a secure transport.
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

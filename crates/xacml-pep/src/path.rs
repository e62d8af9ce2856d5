//! Positional parsing of repository API paths.

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::error::{self, Error};

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}:\d{2}(\.\d{1,3})?Z)?$")
        .expect("date pattern should compile")
});

/// Second tokens that name an operation rather than an object.
const OPERATION_KEYWORDS: &[&str] = &["nextPID", "new"];

/// Trailing tokens that select a view of the addressed object or datastream.
const VIEW_KEYWORDS: &[&str] = &[
    "content",
    "history",
    "objectXML",
    "export",
    "versions",
    "validate",
    "relationships",
];

/// The components of a repository API path such as `/objects/demo:1/datastreams/DC`.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct PathParts {
    /// The first token, e.g. `objects`, `get` or `risearch`.
    pub endpoint: String,
    /// An object-less operation keyword in place of the pid, e.g. `nextPID`.
    pub keyword: Option<String>,
    /// The object PID.
    pub pid: Option<String>,
    /// The datastream id.
    pub datastream: Option<String>,
    /// The service definition PID of a dissemination.
    pub sdef: Option<String>,
    /// The dissemination method.
    pub method: Option<String>,
    /// The as-of date, verbatim.
    pub as_of: Option<String>,
    /// A trailing view keyword, including the bare collection keywords
    /// `datastreams` and `methods`.
    pub view: Option<String>,
}

impl PathParts {
    /// Parse `path`. Malformed paths are rejected with [Error::BadRequest].
    ///
    /// Segments are percent-decoded one by one, so a decoded segment containing `/` cannot
    /// name a PID, datastream or method and is rejected.
    pub fn parse(path: &str) -> Result<Self, Error> {
        let tokens = path
            .split('/')
            .filter(|token| !token.is_empty())
            .map(|token| {
                let token = percent_decode_str(token)
                    .decode_utf8()
                    .map_err(|_| error::bad_request(format!("path is not UTF-8: {path}")))?;
                if token.contains('/') {
                    return Err(error::bad_request(format!(
                        "encoded slash in path segment {token}"
                    )));
                }
                Ok(token.into_owned())
            })
            .collect::<Result<Vec<String>, Error>>()?;

        let mut tokens = tokens.into_iter().peekable();

        let Some(endpoint) = tokens.next() else {
            return Err(error::bad_request("empty path"));
        };

        let mut parts = PathParts {
            endpoint,
            ..Default::default()
        };

        let Some(second) = tokens.next() else {
            return Ok(parts);
        };

        if OPERATION_KEYWORDS.contains(&second.as_str()) {
            parts.keyword = Some(second);
            return match tokens.next() {
                Some(token) => Err(error::bad_request(format!(
                    "unexpected path segment {token} in {path}"
                ))),
                None => Ok(parts),
            };
        }

        if !second.contains(':') {
            return Err(error::bad_request(format!("not a PID: {second}")));
        }
        parts.pid = Some(second);

        while let Some(token) = tokens.next() {
            match token.as_str() {
                "datastreams" => match tokens.peek() {
                    Some(next) if !is_date(next) => parts.set_datastream(tokens.next(), path)?,
                    _ => parts.view = Some(token),
                },
                "methods" => match tokens.next() {
                    Some(sdef) if sdef.contains(':') => {
                        parts.sdef = Some(sdef);
                        if tokens.peek().is_some_and(|next| !is_date(next)) {
                            parts.method = tokens.next();
                        }
                    }
                    Some(sdef) => {
                        return Err(error::bad_request(format!(
                            "not a service definition PID: {sdef}"
                        )))
                    }
                    None => parts.view = Some(token),
                },
                _ if is_date(&token) => parts.as_of = Some(token),
                _ if token.contains(':') => {
                    let Some(method) = tokens.next() else {
                        return Err(error::bad_request(format!(
                            "dissemination of {token} without a method"
                        )));
                    };
                    parts.sdef = Some(token);
                    parts.method = Some(method);
                }
                _ if VIEW_KEYWORDS.contains(&token.as_str()) => parts.view = Some(token),
                _ => parts.set_datastream(Some(token), path)?,
            }
        }

        Ok(parts)
    }

    /// The hierarchical `resource-id` of the addressed resource, `/pid[/ds|/sdef/method]`.
    ///
    /// `None` when the path addresses no object.
    pub fn resource_id(&self) -> Option<String> {
        let pid = self.pid.as_deref()?;
        Some(resource_id(
            pid,
            self.datastream.as_deref(),
            self.sdef.as_deref().zip(self.method.as_deref()),
        ))
    }

    fn set_datastream(&mut self, datastream: Option<String>, path: &str) -> Result<(), Error> {
        if let Some(existing) = &self.datastream {
            return Err(error::bad_request(format!(
                "second datastream after {existing} in {path}"
            )));
        }
        self.datastream = datastream;
        Ok(())
    }
}

/// Whether `token` has the shape of an as-of date.
pub fn is_date(token: &str) -> bool {
    DATE_PATTERN.is_match(token)
}

/// Build a hierarchical `resource-id`.
pub fn resource_id(pid: &str, datastream: Option<&str>, dissemination: Option<(&str, &str)>) -> String {
    match (datastream, dissemination) {
        (Some(datastream), _) => format!("/{pid}/{datastream}"),
        (None, Some((sdef, method))) => format!("/{pid}/{sdef}/{method}"),
        (None, None) => format!("/{pid}"),
    }
}

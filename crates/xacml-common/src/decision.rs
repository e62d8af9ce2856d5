//! Decision results returned by a policy decision point.

use serde::{Deserialize, Serialize};

use crate::id::xacml;

/// The outcome of evaluating one request.
#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Hash, Debug)]
pub enum Decision {
    /// Access is granted.
    Permit,
    /// Access is refused.
    Deny,
    /// Evaluation failed; no decision could be made.
    Indeterminate,
    /// No policy applied to the request.
    NotApplicable,
}

impl Decision {
    /// Whether self is [Self::Permit].
    pub fn is_permit(self) -> bool {
        matches!(self, Self::Permit)
    }

    /// Whether self is [Self::Deny].
    pub fn is_deny(self) -> bool {
        matches!(self, Self::Deny)
    }
}

impl From<bool> for Decision {
    fn from(value: bool) -> Self {
        match value {
            false => Self::Deny,
            true => Self::Permit,
        }
    }
}

/// The status accompanying a decision.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub enum Status {
    /// Evaluation completed.
    Ok,
    /// Evaluation reported an error.
    Error {
        /// An XACML status code URI.
        code: String,
        /// Human readable detail.
        message: String,
    },
}

impl Status {
    /// An error status with the given code.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Whether self is [Self::Ok].
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// The status code URI.
    pub fn code(&self) -> &str {
        match self {
            Self::Ok => xacml::STATUS_OK,
            Self::Error { code, .. } => code,
        }
    }
}

/// One decision, correlated to the resource it was made for.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct DecisionResult {
    /// The `resource-id` of the evaluated request, if the evaluator reported one.
    pub resource_id: Option<String>,

    /// The decision.
    pub decision: Decision,

    /// The evaluation status.
    pub status: Status,
}

impl DecisionResult {
    /// A successful result.
    pub fn new(resource_id: Option<String>, decision: Decision) -> Self {
        Self {
            resource_id,
            decision,
            status: Status::Ok,
        }
    }

    /// An indeterminate result carrying an error status.
    pub fn indeterminate(resource_id: Option<String>, status: Status) -> Self {
        Self {
            resource_id,
            decision: Decision::Indeterminate,
            status,
        }
    }

    /// Whether the result grants access.
    ///
    /// Anything other than an OK `Permit` reads as not permitted.
    pub fn is_permitted(&self) -> bool {
        self.status.is_ok() && self.decision.is_permit()
    }
}

//! XACML policy documents.
//!
//! [document] extracts the parts of a policy that matter for indexing and evaluation,
//! [schema] decides whether a document is an acceptable policy at all.

pub mod document;
pub mod schema;
mod xsd;

pub use document::{
    CategoryTarget, Effect, PolicyDocument, PolicyError, PolicyKind, PolicyMetadata, Rule, Target,
    TargetMatch,
};
pub use schema::{SchemaSource, SchemaValidator, ValidationError};

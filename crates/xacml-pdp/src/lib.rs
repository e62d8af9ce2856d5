//! `xacml-pdp` is the decision side of the XACML pipeline.
//!
//! Policies live in a [store::PolicyStore]. A [index::PolicyIndex] narrows the stored policies
//! down to the candidates that could possibly apply to a request, and the
//! [pdp::PolicyDecisionPoint] evaluates those candidates with the reference
//! [engine::TargetEvaluator].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod index;
pub mod pdp;
pub mod store;

pub use error::Error;

//! `xacml-pep` is the enforcement side of the XACML pipeline.
//!
//! A [request::PepRequest] describes an incoming repository API call. The [context] module
//! turns it into a [RequestContext](xacml_common::context::RequestContext), operation
//! [filter]s decide whether the call may proceed at all, and search-style responses are
//! rewritten by the [rewrite] module so that only permitted entries remain.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod path;
pub mod request;
pub mod rewrite;

pub use error::Error;

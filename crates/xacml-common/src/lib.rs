//! `xacml-common` defines the datatypes and algorithms shared by the policy decision point
//! and the policy enforcement point.
//!
//! The central types are the typed XACML attribute model ([attribute]), the immutable
//! request context handed from the enforcement side to the decision side ([context]),
//! decision results ([decision]) and the analysis of XACML policy documents ([policy]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use serde::de::{Error, Visitor};

pub mod attribute;
pub mod config;
pub mod context;
pub mod decision;
pub mod evaluator;
pub mod id;
pub mod index_map;
pub mod policy;

#[derive(Default)]
struct FromStrVisitor<T> {
    expecting: &'static str,
    phantom: PhantomData<T>,
}

impl<T> FromStrVisitor<T> {
    pub fn new(expecting: &'static str) -> Self {
        Self {
            expecting,
            phantom: PhantomData,
        }
    }
}

impl<T: FromStr> Visitor<'_> for FromStrVisitor<T>
where
    T::Err: Display,
{
    type Value = T;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.expecting)
    }

    fn visit_str<E: Error>(self, str: &str) -> Result<Self::Value, E> {
        T::from_str(str).map_err(|msg| E::custom(msg))
    }
}

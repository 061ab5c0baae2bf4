//! Basic types and definitions shared by the Quarry crates.
//!
//! This crate declares the vocabulary the query-translation engine is written
//! in: organization and project identifiers, metric resource identifiers
//! (MRIs), and metric units. It intentionally contains no query logic.

#![warn(missing_docs)]

pub mod macros;
pub mod metrics;
pub mod organization;
pub mod project;

//! Compiles transaction queries against the metrics store.
//!
//! Callers pose queries in terms of public fields such as `transaction.duration`
//! and public functions such as `p75` or `failure_rate`. The metrics store knows
//! none of these names: it keeps one generic value column per entity, scoped by
//! an integer `metric_id`, with tag keys and values hashed through a string
//! indexer. [`compile_query`] bridges the two worlds. It resolves every metric,
//! tag key and tag value reference through a [`MetricIndexer`], rewrites
//! aggregates into conditional expressions over the value column, and seals the
//! result into a [`CompiledQuery`](quarry_snql::CompiledQuery) for a single
//! storage entity.
//!
//! Resolution is strict for metrics and tag keys: an unindexed name aborts the
//! compile, since the query could never be answered. Tag values resolve weakly
//! instead. A value that was never recorded cannot match any stored row, so it
//! compiles to a predicate that matches nothing.
//!
//! The [`QueryBuilder`] exposes the compilation steps individually for callers
//! that need histogram parameters or assemble queries incrementally. In dry run
//! mode the builder validates a request without consulting the indexer, using a
//! sentinel index for every name.

#![warn(missing_docs)]

pub mod constants;

mod builder;
mod error;
mod filters;
mod functions;
mod resolver;
mod thresholds;

pub use self::builder::*;
pub use self::error::*;
pub use self::filters::*;
pub use self::functions::*;
pub use self::resolver::*;
pub use self::thresholds::*;

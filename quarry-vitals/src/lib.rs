//! Organization-wide web and mobile vitals.
//!
//! The vitals overview answers one question per organization: how are the
//! key user experience measurements doing across all projects? It compiles
//! two metrics queries over the trailing seven days, one aggregated across
//! the organization and one broken down by project, covering the 75th
//! percentiles of LCP, FCP and the application start times together with
//! their sample counts.
//!
//! Raw query results are cached per organization with a fixed time to live
//! through an injected [`VitalsCache`]. Per-project access filtering is
//! applied after cache retrieval, so one cached value serves callers with
//! different project access. Organizations above the project limit receive
//! the canonical empty [`VitalsSnapshot`] instead of a misleading partial
//! aggregate.

#![warn(missing_docs)]

mod cache;
mod error;
mod overview;
mod snapshot;

pub use self::cache::*;
pub use self::error::*;
pub use self::overview::*;
pub use self::snapshot::*;

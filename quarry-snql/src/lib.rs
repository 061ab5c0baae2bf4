//! Structured query model for the metrics storage service.
//!
//! The query engine compiles user-facing queries down to the value types in
//! this crate. A [`CompiledQuery`] addresses exactly one storage entity and
//! carries selected [`Expr`]essions, [`Condition`]s, the time range, and the
//! organization and project scope. It is handed to a [`StorageExecutor`],
//! which returns flat result rows.
//!
//! Expressions and conditions serialize as self-describing JSON for the wire
//! and render as text in the storage dialect for diagnostics:
//!
//! ```
//! use quarry_snql::{Condition, Expr, Op};
//!
//! let condition = Condition::new(
//!     Expr::column("metric_id"),
//!     Op::In,
//!     Expr::array([Expr::from(1i64), Expr::from(2i64)]),
//! );
//! assert_eq!(condition.to_string(), "metric_id IN [1, 2]");
//! ```

#![warn(missing_docs)]

mod condition;
mod executor;
mod expr;
mod query;

pub use self::condition::*;
pub use self::executor::*;
pub use self::expr::*;
pub use self::query::*;

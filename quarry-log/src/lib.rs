//! Error reporting and logging facade for Quarry.
//!
//! # Setup
//!
//! To enable logging, invoke the `init` function with a `LogConfig`. The
//! configuration implements `serde` traits, so it can be obtained from
//! configuration files. Initialization requires the `init` feature.
//!
//! # Logging
//!
//! The basic use is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the
//! highest-priority log messages and `trace!` the lowest. The log messages are
//! filtered by configuring the log level to exclude messages with a lower
//! priority.
//!
//! ```
//! quarry_log::info!("startup complete");
//! ```
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer
//! short and precise log messages over verbose text. Choose the log level
//! according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Logging Error Types
//!
//! To log error types including their causes, use the [`LogError`] wrapper. It
//! formats the error with all its sources:
//!
//! ```
//! use std::io::{Error, ErrorKind};
//! use quarry_log::LogError;
//!
//! let custom_error = Error::new(ErrorKind::Other, "oh no!");
//! quarry_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro `init_test!`
//! that should be called at the beginning of the test method. It requires the
//! `test` feature, enables test mode of the logger, and customizes log levels
//! for the current crate.

#![warn(missing_docs)]

mod utils;
pub use utils::*;

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
pub use test::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{Level, debug, error, info, trace, warn};

//! Type definitions for metric identifiers.
//!
//! Metrics are addressed by metric resource identifiers (MRIs) of the form
//! `<type>:<namespace>/<name>@<unit>`. MRIs carry everything a query needs to
//! know about a metric short of its numeric index in the store.

use std::borrow::Cow;

mod mri;
mod units;

pub use self::mri::*;
pub use self::units::*;

/// Maximum length of a metric name, in bytes.
pub const METRIC_NAME_MAX_SIZE: usize = 150;

/// Validates a metric name without normalizing it.
///
/// This is a relaxed check that only requires the name to start with an ASCII
/// letter. All other characters can be fixed up by
/// [`try_normalize_metric_name`].
pub fn can_be_valid_metric_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic())
}

/// Normalizes a metric name to the allowed character set.
///
/// Invalid characters are replaced with underscores, runs of invalid
/// characters collapse into a single underscore, and overlong names are
/// truncated to [`METRIC_NAME_MAX_SIZE`]. Returns `None` if the name cannot
/// be fixed up, for instance because it does not start with a letter.
pub fn try_normalize_metric_name(name: &str) -> Option<Cow<'_, str>> {
    if !can_be_valid_metric_name(name) {
        return None;
    }

    if name.len() <= METRIC_NAME_MAX_SIZE && name.chars().all(is_valid_metric_char) {
        return Some(Cow::Borrowed(name));
    }

    let mut normalized = String::with_capacity(name.len().min(METRIC_NAME_MAX_SIZE));
    let mut last_valid = true;
    for c in name.chars() {
        if normalized.len() >= METRIC_NAME_MAX_SIZE {
            break;
        }

        if is_valid_metric_char(c) {
            normalized.push(c);
            last_valid = true;
        } else if last_valid {
            normalized.push('_');
            last_valid = false;
        }
    }

    Some(Cow::Owned(normalized))
}

fn is_valid_metric_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

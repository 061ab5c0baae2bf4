//! Contains the [`OrganizationId`] type.

use serde::{Deserialize, Serialize};

/// The unique identifier of a Sentry organization.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct OrganizationId(u64);

impl OrganizationId {
    /// Creates an organization id from its numeric value.
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value of this organization id.
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

//! What to do when a destination tag already exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PushError;

/// Behaviour for tags that already exist in the destination registry.
///
/// Selected once per run and applied to every tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Replace the existing tag.
    #[default]
    Overwrite,

    /// Fail the whole run.
    Error,

    /// Leave the existing tag alone.
    Skip,

    /// Merge indexes, keeping existing entries on platform conflicts.
    #[serde(rename = "merge-with-retain")]
    MergeRetainExisting,

    /// Merge indexes, replacing existing entries on platform conflicts.
    #[serde(rename = "merge-with-overwrite")]
    MergeOverwriteExisting,
}

impl ConflictPolicy {
    /// Every policy, in flag order.
    pub const ALL: [Self; 5] = [
        Self::Overwrite,
        Self::Error,
        Self::Skip,
        Self::MergeRetainExisting,
        Self::MergeOverwriteExisting,
    ];

    /// Returns the flag value for this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Error => "error",
            Self::Skip => "skip",
            Self::MergeRetainExisting => "merge-with-retain",
            Self::MergeOverwriteExisting => "merge-with-overwrite",
        }
    }

    /// Returns true for the two merge policies.
    #[must_use]
    pub const fn is_merge(self) -> bool {
        matches!(
            self,
            Self::MergeRetainExisting | Self::MergeOverwriteExisting
        )
    }

    /// Returns true if the policy needs to know which tags already exist.
    #[must_use]
    pub const fn needs_existing_tags(self) -> bool {
        !matches!(self, Self::Overwrite)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PushError::InvalidConfig {
                reason: format!(
                    "unknown on-existing-tag mode '{s}', expected one of: {}",
                    Self::ALL.map(Self::as_str).join(", ")
                ),
            })
    }
}

/// Outcome of applying a [`ConflictPolicy`] to one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Push the tag.
    Proceed,
    /// Do nothing; the tag still counts as done.
    Skip,
    /// Fail the run.
    Abort,
}

/// Decides what to do with a tag given whether it exists in the destination.
///
/// # Examples
///
/// ```
/// use ferry_push::{decide, ConflictPolicy, Decision};
///
/// assert_eq!(decide(ConflictPolicy::Skip, true), Decision::Skip);
/// assert_eq!(decide(ConflictPolicy::Error, false), Decision::Proceed);
/// ```
#[must_use]
pub const fn decide(policy: ConflictPolicy, exists: bool) -> Decision {
    match (policy, exists) {
        (ConflictPolicy::Error, true) => Decision::Abort,
        (ConflictPolicy::Skip, true) => Decision::Skip,
        _ => Decision::Proceed,
    }
}

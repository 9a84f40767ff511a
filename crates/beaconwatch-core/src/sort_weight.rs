//! Composite, lexicographically ordered ranking keys.
//!
//! A [`SortWeight`] is either a primitive sub-key (integer or float) or an
//! ordered list of sub-keys. Lists compare like tuples: the first differing
//! position decides, and a strict prefix sorts before the longer list.
//!
//! All weights that are compared against each other must be built from the same
//! schema. Comparing an integer against a float (or a primitive against a list)
//! at the same position is a programming error: [`SortWeight::try_cmp`] reports
//! it, and the [`Ord`] implementation panics.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when comparing sort weights.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortWeightError {
    /// Two sub-keys at the same position have different kinds.
    #[error("sort weight kind mismatch: cannot compare {left} with {right}")]
    KindMismatch {
        /// Kind of the left-hand sub-key.
        left: &'static str,
        /// Kind of the right-hand sub-key.
        right: &'static str,
    },
}

/// A composite ranking key. Ascending order means "better".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortWeight {
    /// Integer sub-key.
    Int(i64),
    /// Floating point sub-key.
    Float(f64),
    /// Ordered list of sub-keys, compared lexicographically.
    List(Vec<SortWeight>),
}

impl SortWeight {
    /// Builds an integer sub-key.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Int(value)
    }

    /// Builds a float sub-key.
    #[must_use]
    pub const fn float(value: f64) -> Self {
        Self::Float(value)
    }

    /// Builds a list key from its sub-keys, in precedence order.
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Self>) -> Self {
        Self::List(items.into_iter().collect())
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::List(_) => "list",
        }
    }

    /// Compares two weights, reporting schema mismatches instead of panicking.
    ///
    /// # Errors
    ///
    /// Returns [`SortWeightError::KindMismatch`] when two sub-keys at the same
    /// position are of different kinds.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, SortWeightError> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Ok(a.total_cmp(b)),
            (Self::List(a), Self::List(b)) => {
                for (left, right) in a.iter().zip(b) {
                    let ordering = left.try_cmp(right)?;
                    if ordering != Ordering::Equal {
                        return Ok(ordering);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (left, right) => Err(SortWeightError::KindMismatch {
                left: left.kind(),
                right: right.kind(),
            }),
        }
    }
}

impl PartialEq for SortWeight {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.try_cmp(other), Ok(Ordering::Equal))
    }
}

impl Eq for SortWeight {}

impl PartialOrd for SortWeight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortWeight {
    /// # Panics
    ///
    /// Panics when the two weights were not built from the same schema.
    fn cmp(&self, other: &Self) -> Ordering {
        match self.try_cmp(other) {
            Ok(ordering) => ordering,
            Err(err) => panic!("{err}"),
        }
    }
}

impl From<i64> for SortWeight {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SortWeight {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<Self>> for SortWeight {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}

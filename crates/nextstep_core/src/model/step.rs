//! Step domain model.
//!
//! # Responsibility
//! - Define the node type of the per-owner step sequence.
//! - Provide shape validation that does not need storage access.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes afterwards.
//! - `left`/`right` are the only mutable ordering state.
//! - `None` is the "no neighbor" sentinel; on the wire it is `-1`.
//!
//! # See also
//! - `crate::model::chain` for sequence-level checks

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned step identity.
pub type StepId = i64;

/// Opaque owner identity supplied by the user subsystem.
pub type OwnerId = i64;

/// Wire value used for "no neighbor in this direction".
pub const NO_NEIGHBOR: i64 = -1;

/// Shape or reference errors that make a step unusable as a list node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepValidationError {
    /// Neighbor id is zero or negative.
    InvalidNeighborId(StepId),
    /// Step names itself as a neighbor.
    SelfReference(StepId),
    /// Left and right point at the same step.
    SameNeighbors(StepId),
    /// Neighbor does not exist in the store.
    NeighborNotFound(StepId),
    /// Neighbor exists but belongs to another owner.
    CrossOwner {
        neighbor: StepId,
        expected: OwnerId,
        actual: OwnerId,
    },
}

impl Display for StepValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNeighborId(id) => write!(f, "invalid neighbor id: {id}"),
            Self::SelfReference(id) => write!(f, "step {id} cannot be its own neighbor"),
            Self::SameNeighbors(id) => {
                write!(f, "left and right neighbor must differ, both are {id}")
            }
            Self::NeighborNotFound(id) => write!(f, "neighbor step not found: {id}"),
            Self::CrossOwner {
                neighbor,
                expected,
                actual,
            } => write!(
                f,
                "neighbor step {neighbor} belongs to owner {actual}, expected owner {expected}"
            ),
        }
    }
}

impl Error for StepValidationError {}

/// Persisted step: one node of an owner's sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    pub description: String,
    #[serde(with = "neighbor_sentinel")]
    pub left: Option<StepId>,
    #[serde(with = "neighbor_sentinel")]
    pub right: Option<StepId>,
    pub owner: OwnerId,
}

impl Step {
    /// Returns whether this step starts its owner's sequence.
    pub fn is_head(&self) -> bool {
        self.left.is_none()
    }

    /// Returns whether this step ends its owner's sequence.
    pub fn is_tail(&self) -> bool {
        self.right.is_none()
    }

    /// Checks neighbor shape against this step's own identity.
    pub fn validate(&self) -> Result<(), StepValidationError> {
        validate_neighbors(Some(self.id), self.left, self.right)
    }
}

/// Insert request for a step that has no identity yet.
///
/// The caller picks `left`/`right`; the repository checks that the pair is
/// currently adjacent in the owner's sequence before inserting between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStep {
    pub name: String,
    pub description: String,
    #[serde(with = "neighbor_sentinel", default)]
    pub left: Option<StepId>,
    #[serde(with = "neighbor_sentinel", default)]
    pub right: Option<StepId>,
    pub owner: OwnerId,
}

impl NewStep {
    /// Creates a detached request (both neighbors are sentinels).
    pub fn new(owner: OwnerId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            left: None,
            right: None,
            owner,
        }
    }

    /// Sets the requested left neighbor.
    pub fn after(mut self, left: StepId) -> Self {
        self.left = Some(left);
        self
    }

    /// Sets the requested right neighbor.
    pub fn before(mut self, right: StepId) -> Self {
        self.right = Some(right);
        self
    }

    pub fn validate(&self) -> Result<(), StepValidationError> {
        validate_neighbors(None, self.left, self.right)
    }
}

fn validate_neighbors(
    own_id: Option<StepId>,
    left: Option<StepId>,
    right: Option<StepId>,
) -> Result<(), StepValidationError> {
    for neighbor in [left, right].into_iter().flatten() {
        if neighbor <= 0 {
            return Err(StepValidationError::InvalidNeighborId(neighbor));
        }
        if Some(neighbor) == own_id {
            return Err(StepValidationError::SelfReference(neighbor));
        }
    }
    if let (Some(left), Some(right)) = (left, right) {
        if left == right {
            return Err(StepValidationError::SameNeighbors(left));
        }
    }
    Ok(())
}

/// Maps `Option<StepId>` to the integer sentinel form used by API clients.
mod neighbor_sentinel {
    use super::{StepId, NO_NEIGHBOR};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<StepId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.unwrap_or(NO_NEIGHBOR))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<StepId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<i64>::deserialize(deserializer)?;
        Ok(raw.filter(|value| *value >= 0))
    }
}

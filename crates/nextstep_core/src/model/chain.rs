//! In-memory arena view of one owner's step sequence.
//!
//! # Responsibility
//! - Index steps by identity and walk them in sequence order.
//! - Detect broken linked-list invariants in loaded data.
//!
//! # Invariants
//! - A valid chain has exactly one head and one tail (or no steps at all).
//! - `a.right == Some(b)` holds iff `b.left == Some(a)`.
//! - Every step is reachable from the head.

use crate::model::step::{OwnerId, Step, StepId};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Broken linked-list invariant found in persisted steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainViolation {
    /// Owner has steps but none without a left neighbor.
    NoHead(OwnerId),
    /// More than one step has no left neighbor.
    MultipleHeads { owner: OwnerId, heads: Vec<StepId> },
    /// More than one step has no right neighbor.
    MultipleTails { owner: OwnerId, tails: Vec<StepId> },
    /// Neighbor reference points at a missing step.
    DanglingNeighbor { step: StepId, neighbor: StepId },
    /// Neighbor reference points at another owner's step.
    CrossOwner { step: StepId, neighbor: StepId },
    /// `step` links to `neighbor` but not the other way round.
    AsymmetricLink { step: StepId, neighbor: StepId },
    /// Walking right from the head revisits `step`.
    Cycle { step: StepId },
    /// Steps not reachable from the head.
    Unreachable { owner: OwnerId, steps: Vec<StepId> },
}

impl Display for ChainViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoHead(owner) => write!(f, "owner {owner} has steps but no head"),
            Self::MultipleHeads { owner, heads } => {
                write!(f, "owner {owner} has multiple heads: {heads:?}")
            }
            Self::MultipleTails { owner, tails } => {
                write!(f, "owner {owner} has multiple tails: {tails:?}")
            }
            Self::DanglingNeighbor { step, neighbor } => {
                write!(f, "step {step} references missing neighbor {neighbor}")
            }
            Self::CrossOwner { step, neighbor } => {
                write!(f, "step {step} references neighbor {neighbor} of another owner")
            }
            Self::AsymmetricLink { step, neighbor } => {
                write!(f, "link {step} -> {neighbor} is not mirrored")
            }
            Self::Cycle { step } => write!(f, "cycle detected at step {step}"),
            Self::Unreachable { owner, steps } => {
                write!(f, "owner {owner} has steps unreachable from head: {steps:?}")
            }
        }
    }
}

impl Error for ChainViolation {}

/// Steps of one owner indexed by identity.
#[derive(Debug, Clone)]
pub struct StepChain {
    owner: OwnerId,
    nodes: BTreeMap<StepId, Step>,
}

impl StepChain {
    /// Builds a chain from `steps`, keeping only those owned by `owner`.
    pub fn for_owner(owner: OwnerId, steps: impl IntoIterator<Item = Step>) -> Self {
        let nodes = steps
            .into_iter()
            .filter(|step| step.owner == owner)
            .map(|step| (step.id, step))
            .collect();
        Self { owner, nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First step without a left neighbor, lowest id first.
    pub fn head(&self) -> Option<&Step> {
        self.nodes.values().find(|step| step.is_head())
    }

    /// First step without a right neighbor, lowest id first.
    pub fn tail(&self) -> Option<&Step> {
        self.nodes.values().find(|step| step.is_tail())
    }

    /// Returns steps in sequence order, head first.
    pub fn ordered(&self) -> Result<Vec<&Step>, ChainViolation> {
        self.verify_links()?;
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let head = self.single_head()?;
        let mut visited = HashSet::with_capacity(self.nodes.len());
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if !visited.insert(id) {
                return Err(ChainViolation::Cycle { step: id });
            }
            let Some(step) = self.nodes.get(&id) else {
                break;
            };
            ordered.push(step);
            cursor = step.right;
        }

        if ordered.len() != self.nodes.len() {
            let steps = self
                .nodes
                .keys()
                .filter(|id| !visited.contains(id))
                .copied()
                .collect();
            return Err(ChainViolation::Unreachable {
                owner: self.owner,
                steps,
            });
        }
        Ok(ordered)
    }

    /// Checks head/tail uniqueness, link symmetry and reachability.
    pub fn verify(&self) -> Result<(), ChainViolation> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let tails: Vec<StepId> = self
            .nodes
            .values()
            .filter(|step| step.is_tail())
            .map(|step| step.id)
            .collect();
        if tails.len() > 1 {
            return Err(ChainViolation::MultipleTails {
                owner: self.owner,
                tails,
            });
        }
        self.ordered().map(|_| ())
    }

    fn single_head(&self) -> Result<StepId, ChainViolation> {
        let heads: Vec<StepId> = self
            .nodes
            .values()
            .filter(|step| step.is_head())
            .map(|step| step.id)
            .collect();
        match heads.as_slice() {
            [] => Err(ChainViolation::NoHead(self.owner)),
            [head] => Ok(*head),
            _ => Err(ChainViolation::MultipleHeads {
                owner: self.owner,
                heads,
            }),
        }
    }

    fn verify_links(&self) -> Result<(), ChainViolation> {
        for step in self.nodes.values() {
            if let Some(right) = step.right {
                let neighbor = self.nodes.get(&right).ok_or(ChainViolation::DanglingNeighbor {
                    step: step.id,
                    neighbor: right,
                })?;
                if neighbor.left != Some(step.id) {
                    return Err(ChainViolation::AsymmetricLink {
                        step: step.id,
                        neighbor: right,
                    });
                }
            }
            if let Some(left) = step.left {
                let neighbor = self.nodes.get(&left).ok_or(ChainViolation::DanglingNeighbor {
                    step: step.id,
                    neighbor: left,
                })?;
                if neighbor.right != Some(step.id) {
                    return Err(ChainViolation::AsymmetricLink {
                        step: step.id,
                        neighbor: left,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Verifies every owner's chain in a flat step listing.
///
/// Cross-owner references are reported before per-owner checks so they are
/// not misread as dangling neighbors.
pub fn verify_all(steps: &[Step]) -> Result<(), ChainViolation> {
    let owners: BTreeMap<StepId, OwnerId> = steps.iter().map(|step| (step.id, step.owner)).collect();
    for step in steps {
        for neighbor in [step.left, step.right].into_iter().flatten() {
            match owners.get(&neighbor) {
                None => {
                    return Err(ChainViolation::DanglingNeighbor {
                        step: step.id,
                        neighbor,
                    })
                }
                Some(owner) if *owner != step.owner => {
                    return Err(ChainViolation::CrossOwner {
                        step: step.id,
                        neighbor,
                    })
                }
                Some(_) => {}
            }
        }
    }

    let distinct_owners: HashSet<OwnerId> = owners.values().copied().collect();
    for owner in distinct_owners {
        StepChain::for_owner(owner, steps.iter().cloned()).verify()?;
    }
    Ok(())
}

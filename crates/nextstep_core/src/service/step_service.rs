//! Step sequence use-case service.
//!
//! # Responsibility
//! - Provide stable entry points for the HTTP/CLI boundary.
//! - Resolve positional requests (append, insert-after) into explicit
//!   neighbor pairs before delegating to the repository.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/relink contracts.
//! - Service layer remains storage-agnostic.

use crate::model::chain::StepChain;
use crate::model::step::{NewStep, OwnerId, Step, StepId};
use crate::repo::step_repo::{RepoError, RepoResult, StepRepository};
use log::warn;

/// Attempts made by `append_step` before a conflict is returned.
const MAX_APPEND_ATTEMPTS: usize = 3;

/// Use-case service wrapper for step sequence operations.
pub struct StepService<R: StepRepository> {
    repo: R,
}

impl<R: StepRepository> StepService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a step at explicitly chosen neighbors.
    pub fn create_step(&self, step: &NewStep) -> RepoResult<Step> {
        self.repo.create_step(step)
    }

    /// Appends a step after the owner's current tail.
    ///
    /// # Contract
    /// - The first step of an owner becomes both head and tail.
    /// - A concurrent append that wins the tail slot causes a re-read and
    ///   retry; after `MAX_APPEND_ATTEMPTS` the conflict is returned.
    pub fn append_step(
        &self,
        owner: OwnerId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> RepoResult<Step> {
        let mut request = NewStep::new(owner, name, description);
        let mut attempt = 1;
        loop {
            let chain = self.chain(owner)?;
            chain.verify()?;
            request.left = chain.tail().map(|tail| tail.id);

            match self.repo.create_step(&request) {
                Err(err) if err.is_retryable() && attempt < MAX_APPEND_ATTEMPTS => {
                    warn!(
                        "event=step_append module=service status=retry owner={} attempt={} error={}",
                        owner, attempt, err
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Inserts a step directly after `anchor`, in front of its current
    /// right neighbor.
    pub fn insert_after(
        &self,
        anchor: StepId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> RepoResult<Step> {
        let anchor_step = self
            .repo
            .get_step(anchor)?
            .ok_or(RepoError::NotFound(anchor))?;
        let mut request = NewStep::new(anchor_step.owner, name, description).after(anchor);
        request.right = anchor_step.right;
        self.repo.create_step(&request)
    }

    pub fn get_step(&self, id: StepId) -> RepoResult<Option<Step>> {
        self.repo.get_step(id)
    }

    /// Lists every step in store order.
    pub fn list_steps(&self) -> RepoResult<Vec<Step>> {
        self.repo.list_steps()
    }

    /// Returns an owner's steps head first.
    ///
    /// Returns `RepoError::BrokenChain` when persisted links are inconsistent.
    pub fn sequence(&self, owner: OwnerId) -> RepoResult<Vec<Step>> {
        let chain = self.chain(owner)?;
        chain.verify()?;
        Ok(chain.ordered()?.into_iter().cloned().collect())
    }

    /// Updates text fields and, when neighbors changed, moves the step.
    pub fn update_step(&self, step: &Step) -> RepoResult<()> {
        self.repo.update_step(step)
    }

    pub fn delete_step(&self, id: StepId) -> RepoResult<()> {
        self.repo.delete_step(id)
    }

    fn chain(&self, owner: OwnerId) -> RepoResult<StepChain> {
        Ok(StepChain::for_owner(
            owner,
            self.repo.list_owner_steps(owner)?,
        ))
    }
}

//! Vote storage and the karma-delta protocol.

use std::sync::Arc;

use crate::db::models::{VoteKind, VoteTarget};
use crate::error::{ChatError, ChatResult};
use crate::services::{UserId, VoteStore};

/// Applies votes and keeps karma and the cached tally consistent with them.
///
/// The store swaps the vote and moves both counters by the difference in one
/// transaction, so concurrent votes on the same target never lose an update
/// and a failed increment never leaves a vote behind.
#[derive(Clone)]
pub struct VoteLedger {
    votes: Arc<dyn VoteStore>,
}

impl VoteLedger {
    pub fn new(votes: Arc<dyn VoteStore>) -> Self {
        Self { votes }
    }

    /// Resolve a votable row and its author.
    pub async fn target(&self, kind: VoteKind, target_id: i64) -> ChatResult<Option<VoteTarget>> {
        self.votes.vote_target(kind, target_id).await
    }

    /// Record `value` (-1, 0 to retract, +1) as the voter's vote on `target`.
    /// Returns the delta applied to the owner's karma and the target's tally.
    pub async fn apply_vote(
        &self,
        voter_id: UserId,
        target: &VoteTarget,
        value: i64,
    ) -> ChatResult<i64> {
        if voter_id == target.owner_id {
            return Err(ChatError::SelfVote);
        }
        if !(-1..=1).contains(&value) {
            return Err(ChatError::Invalid(
                "Vote value must be -1, 0 or 1".to_string(),
            ));
        }

        let previous = self.votes.exchange_vote(voter_id, target, value).await?;
        let delta = value - previous.unwrap_or(0);

        tracing::debug!(
            voter_id,
            target_kind = target.kind.as_str(),
            target_id = target.id,
            value,
            delta,
            "Vote applied"
        );
        Ok(delta)
    }

    pub async fn vote_count(&self, kind: VoteKind, target_id: i64) -> ChatResult<i64> {
        self.votes.vote_count(kind, target_id).await
    }

    pub async fn user_vote(
        &self,
        voter_id: UserId,
        kind: VoteKind,
        target_id: i64,
    ) -> ChatResult<Option<i64>> {
        self.votes.get_vote(voter_id, kind, target_id).await
    }
}

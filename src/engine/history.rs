use std::sync::Arc;

use serde::Serialize;

use crate::{
    error::Result,
    model::{
        candidate::{CandidateId, Roster},
        id::{ApiId, Id},
        vote::VoteRecord,
    },
    store::Store,
};

const COMPLETED: &str = "Completed";

/// A committed vote as shown to the voter who cast it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub vote_id: ApiId,
    pub candidate_id: CandidateId,
    pub candidate: String,
    pub party: String,
    /// `YYYY-MM-DD`, UTC.
    pub date: String,
    /// `HH:MM`, UTC.
    pub time: String,
    pub method: &'static str,
    pub status: &'static str,
}

impl HistoryEntry {
    fn new(vote: &VoteRecord, roster: &Roster) -> Self {
        // A candidate withdrawn from the roster still shows by ID.
        let (candidate, party) = match roster.get(&vote.candidate_id) {
            Some(candidate) => (candidate.name.clone(), candidate.party.clone()),
            None => (vote.candidate_id.clone(), String::new()),
        };
        Self {
            vote_id: vote.id.into(),
            candidate_id: vote.candidate_id.clone(),
            candidate,
            party,
            date: vote.cast_at.format("%Y-%m-%d").to_string(),
            time: vote.cast_at.format("%H:%M").to_string(),
            method: vote.method.label(),
            status: COMPLETED,
        }
    }
}

/// Read-only view over committed votes.
#[derive(Clone)]
pub struct VotingHistory {
    store: Arc<dyn Store>,
    roster: Arc<Roster>,
}

impl VotingHistory {
    pub fn new(store: Arc<dyn Store>, roster: Arc<Roster>) -> Self {
        Self { store, roster }
    }

    /// The voter's votes, most recent first.
    pub async fn list_for_voter(&self, voter_id: Id) -> Result<Vec<VoteRecord>> {
        self.store.votes_for_voter(voter_id).await
    }

    pub async fn entries_for_voter(&self, voter_id: Id) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .list_for_voter(voter_id)
            .await?
            .iter()
            .map(|vote| HistoryEntry::new(vote, &self.roster))
            .collect())
    }
}

//! Poll record and the vote transform.

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A time-bounded poll.
///
/// `votes` maps a choice index (as a string, e.g. `"0"`) to the ids of the
/// voters who picked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub author: String,
    pub channel: String,
    pub prompt: String,
    pub choices: Vec<String>,
    /// Unix epoch seconds at which results are delivered.
    pub expiry: i64,
    pub id: String,
    pub votes: BTreeMap<String, Vec<String>>,
}

impl Poll {
    /// Create a poll with no votes.
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        channel: impl Into<String>,
        prompt: impl Into<String>,
        choices: Vec<String>,
        expiry: i64,
    ) -> Self {
        Self {
            author: author.into(),
            channel: channel.into(),
            prompt: prompt.into(),
            choices,
            expiry,
            id: id.into(),
            votes: BTreeMap::new(),
        }
    }

    /// Returns a copy of this poll with `voter` voting for `choice`.
    ///
    /// The voter is removed from every other choice first, so re-voting
    /// moves the vote instead of adding a second one.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::InvalidChoice`] when `choice` is not an index
    /// into `choices`.
    pub fn with_vote(&self, choice: usize, voter: &str) -> Result<Poll> {
        if choice >= self.choices.len() {
            return Err(BotError::InvalidChoice {
                choice,
                available: self.choices.len(),
            });
        }

        let mut votes = self.votes.clone();
        for voters in votes.values_mut() {
            voters.retain(|existing| existing != voter);
        }
        votes.retain(|_, voters| !voters.is_empty());
        votes
            .entry(choice.to_string())
            .or_default()
            .push(voter.to_owned());

        Ok(Poll {
            votes,
            ..self.clone()
        })
    }

    /// Number of votes cast for `choice`.
    pub fn vote_count(&self, choice: usize) -> usize {
        self.votes
            .get(&choice.to_string())
            .map_or(0, Vec::len)
    }

    /// Total votes across all choices.
    pub fn total_votes(&self) -> usize {
        (0..self.choices.len()).map(|idx| self.vote_count(idx)).sum()
    }

    /// Whether the poll is due for delivery at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry <= now
    }
}

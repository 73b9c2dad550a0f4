//! Bot ↔ human handoff state per participant.
//!
//! ```text
//!   bot ──request──▶ waiting ──first exchange──▶ human ──end──▶ bot
//!    ▲                  │
//!    └── no admin ──────┘   (decided before the state is recorded)
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ws::{ParticipantId, WaitingEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffState {
    #[default]
    Bot,
    Waiting,
    Human,
}

impl HandoffState {
    /// Chat traffic in this state goes to the operator, never to the NLU service.
    pub fn routes_to_human(self) -> bool {
        matches!(self, Self::Waiting | Self::Human)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    #[error("a handoff is already {0:?} for this participant")]
    AlreadyPending(HandoffState),

    #[error("no handoff in progress for this participant")]
    NotRequested,

    #[error("handoff is waiting for the operator and has not started")]
    NotStarted,
}

/// Result of a handoff request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Operator notified; participant is now waiting
    Queued,
    /// Nobody to hand off to; participant stays with the bot
    NoAgent,
}

#[derive(Debug, Clone)]
struct Slot {
    state: HandoffState,
    history: Value,
    requested_at: DateTime<Utc>,
}

/// Absence of an entry means `Bot`.
#[derive(Debug, Default)]
pub struct HandoffTable {
    slots: HashMap<ParticipantId, Slot>,
}

impl HandoffTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &str) -> HandoffState {
        self.slots.get(id).map(|s| s.state).unwrap_or_default()
    }

    pub fn routes_to_human(&self, id: &str) -> bool {
        self.state(id).routes_to_human()
    }

    /// A new request is only valid from `Bot`.
    pub fn ensure_can_request(&self, id: &str) -> Result<(), HandoffError> {
        match self.state(id) {
            HandoffState::Bot => Ok(()),
            other => Err(HandoffError::AlreadyPending(other)),
        }
    }

    /// `bot → waiting` when the operator was reached, otherwise stay in `bot`.
    pub fn request(
        &mut self,
        id: &str,
        history: Value,
        admin_reached: bool,
    ) -> Result<RequestOutcome, HandoffError> {
        self.ensure_can_request(id)?;
        if !admin_reached {
            self.slots.remove(id);
            return Ok(RequestOutcome::NoAgent);
        }
        self.slots.insert(
            id.to_string(),
            Slot {
                state: HandoffState::Waiting,
                history,
                requested_at: Utc::now(),
            },
        );
        Ok(RequestOutcome::Queued)
    }

    /// A message was exchanged between participant and operator.
    /// `waiting → human`; `human` stays `human`.
    pub fn record_exchange(&mut self, id: &str) -> Result<HandoffState, HandoffError> {
        let slot = self.slots.get_mut(id).ok_or(HandoffError::NotRequested)?;
        slot.state = HandoffState::Human;
        Ok(slot.state)
    }

    /// `human → bot`.
    pub fn end(&mut self, id: &str) -> Result<(), HandoffError> {
        match self.state(id) {
            HandoffState::Human => {
                self.slots.remove(id);
                Ok(())
            }
            HandoffState::Waiting => Err(HandoffError::NotStarted),
            HandoffState::Bot => Err(HandoffError::NotRequested),
        }
    }

    /// Drop all state for a participant (disconnect).
    pub fn remove(&mut self, id: &str) -> HandoffState {
        self.slots.remove(id).map(|s| s.state).unwrap_or_default()
    }

    /// Return every waiting or live handoff to `bot`. Yields the affected
    /// participants in id order.
    pub fn release_all(&mut self) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self.slots.drain().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }

    /// Participants waiting for the operator, oldest request first.
    pub fn waiting(&self) -> Vec<WaitingEntry> {
        let mut waiting: Vec<(&ParticipantId, &Slot)> = self
            .slots
            .iter()
            .filter(|(_, s)| s.state == HandoffState::Waiting)
            .collect();
        waiting.sort_by(|a, b| a.1.requested_at.cmp(&b.1.requested_at).then(a.0.cmp(b.0)));
        waiting
            .into_iter()
            .map(|(id, slot)| WaitingEntry {
                user_id: id.clone(),
                history: slot.history.clone(),
                requested_at: slot.requested_at.to_rfc3339(),
            })
            .collect()
    }

    /// (waiting, human)
    pub fn counts(&self) -> (usize, usize) {
        self.slots.values().fold((0, 0), |(w, h), s| match s.state {
            HandoffState::Waiting => (w + 1, h),
            HandoffState::Human => (w, h + 1),
            HandoffState::Bot => (w, h),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_is_bot() {
        let table = HandoffTable::new();
        assert_eq!(table.state("BN0001"), HandoffState::Bot);
        assert!(!table.routes_to_human("BN0001"));
    }

    #[test]
    fn test_full_cycle() {
        let mut table = HandoffTable::new();
        assert_eq!(
            table.request("BN0001", json!([]), true),
            Ok(RequestOutcome::Queued)
        );
        assert_eq!(table.state("BN0001"), HandoffState::Waiting);
        assert!(table.routes_to_human("BN0001"));

        assert_eq!(table.record_exchange("BN0001"), Ok(HandoffState::Human));
        assert_eq!(table.record_exchange("BN0001"), Ok(HandoffState::Human));

        table.end("BN0001").unwrap();
        assert_eq!(table.state("BN0001"), HandoffState::Bot);
    }

    #[test]
    fn test_no_agent_stays_bot() {
        let mut table = HandoffTable::new();
        assert_eq!(
            table.request("g-1", json!(null), false),
            Ok(RequestOutcome::NoAgent)
        );
        assert_eq!(table.state("g-1"), HandoffState::Bot);
        assert!(table.waiting().is_empty());
    }

    #[test]
    fn test_no_direct_bot_to_human() {
        let mut table = HandoffTable::new();
        assert_eq!(
            table.record_exchange("BN0001"),
            Err(HandoffError::NotRequested)
        );
        assert_eq!(table.state("BN0001"), HandoffState::Bot);
    }

    #[test]
    fn test_waiting_cannot_end() {
        let mut table = HandoffTable::new();
        table.request("BN0001", json!([]), true).unwrap();
        assert_eq!(table.end("BN0001"), Err(HandoffError::NotStarted));
        assert_eq!(table.state("BN0001"), HandoffState::Waiting);
        assert_eq!(table.end("BN0002"), Err(HandoffError::NotRequested));
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let mut table = HandoffTable::new();
        table.request("BN0001", json!([]), true).unwrap();
        assert_eq!(
            table.request("BN0001", json!([]), true),
            Err(HandoffError::AlreadyPending(HandoffState::Waiting))
        );
        table.record_exchange("BN0001").unwrap();
        assert_eq!(
            table.request("BN0001", json!([]), false),
            Err(HandoffError::AlreadyPending(HandoffState::Human))
        );
        assert_eq!(table.state("BN0001"), HandoffState::Human);
    }

    #[test]
    fn test_waiting_list_and_counts() {
        let mut table = HandoffTable::new();
        table
            .request("BN0001", json!([{"from": "user", "text": "hi"}]), true)
            .unwrap();
        table.request("g-7", json!([]), true).unwrap();
        table.request("BN0002", json!([]), true).unwrap();
        table.record_exchange("BN0002").unwrap();

        let waiting = table.waiting();
        let ids: Vec<&str> = waiting.iter().map(|w| w.user_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"BN0001") && ids.contains(&"g-7"));
        let entry = waiting.iter().find(|w| w.user_id == "BN0001").unwrap();
        assert_eq!(entry.history[0]["text"], "hi");
        assert_eq!(table.counts(), (2, 1));
    }

    #[test]
    fn test_release_all_returns_everyone_to_bot() {
        let mut table = HandoffTable::new();
        table.request("g-7", json!([]), true).unwrap();
        table.request("BN0001", json!([]), true).unwrap();
        table.record_exchange("BN0001").unwrap();

        assert_eq!(table.release_all(), vec!["BN0001", "g-7"]);
        assert_eq!(table.counts(), (0, 0));
        assert_eq!(table.state("BN0001"), HandoffState::Bot);
        assert!(table.release_all().is_empty());
    }

    #[test]
    fn test_remove_purges() {
        let mut table = HandoffTable::new();
        table.request("BN0001", json!([]), true).unwrap();
        table.record_exchange("BN0001").unwrap();
        assert_eq!(table.remove("BN0001"), HandoffState::Human);
        assert_eq!(table.state("BN0001"), HandoffState::Bot);
        assert_eq!(table.remove("BN0001"), HandoffState::Bot);
    }
}

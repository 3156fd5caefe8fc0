//! The waiting line and the paired roster.
//!
//! Entrants wait in arrival order. When the roster is empty and at least
//! two entrants are waiting, the front two are moved into the roster as a
//! [`Pairing`]. The roster holds one pairing at a time and doubles as the
//! in-flight guard: nobody else is paired until the lobby releases it.
//!
//! ```text
//! not queued ──join──→ waiting ──try_pair──→ paired ──release──→ (gone)
//!                        │
//!                        └──leave / clear──→ (gone)
//! ```

use std::collections::VecDeque;

use quatro_protocol::{ParticipantId, ParticipantProfile, QueueRow, QueueStatus};
use tokio::time::Instant;

use crate::MatchError;

/// A participant in the waiting line or the roster.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub profile: ParticipantProfile,
    pub joined_at: Instant,
    pub last_activity: Instant,
    pub status: QueueStatus,
}

impl QueueEntry {
    pub fn participant_id(&self) -> ParticipantId {
        self.profile.participant_id
    }
}

/// Two entrants taken off the front of the line, in arrival order.
/// `first` moves first in the resulting session.
#[derive(Debug, Clone)]
pub struct Pairing {
    pub first: ParticipantProfile,
    pub second: ParticipantProfile,
}

/// Owns the waiting line and the roster.
pub struct Matchmaker {
    waiting: VecDeque<QueueEntry>,
    roster: Option<[QueueEntry; 2]>,
    max_size: usize,
}

impl Matchmaker {
    pub fn new(max_size: usize) -> Self {
        Self {
            waiting: VecDeque::new(),
            roster: None,
            max_size,
        }
    }

    /// Appends a waiting entry and returns its 1-based position.
    ///
    /// The caller checks the one-session rule and passes the result as
    /// `in_session`, because sessions live in the coordinator.
    ///
    /// # Errors
    /// - [`MatchError::AlreadyInSession`] if `in_session`
    /// - [`MatchError::AlreadyQueued`] if the participant is waiting or paired
    /// - [`MatchError::QueueFull`] if the line is at capacity
    pub fn join(
        &mut self,
        profile: ParticipantProfile,
        in_session: bool,
    ) -> Result<usize, MatchError> {
        let participant_id = profile.participant_id;
        if in_session {
            return Err(MatchError::AlreadyInSession(participant_id));
        }
        if self.is_queued(&participant_id) || self.is_paired(&participant_id) {
            return Err(MatchError::AlreadyQueued(participant_id));
        }
        if self.waiting.len() >= self.max_size {
            return Err(MatchError::QueueFull { max: self.max_size });
        }

        let now = Instant::now();
        self.waiting.push_back(QueueEntry {
            profile,
            joined_at: now,
            last_activity: now,
            status: QueueStatus::Waiting,
        });
        let position = self.waiting.len();
        tracing::info!(%participant_id, position, "joined queue");
        Ok(position)
    }

    /// Removes a waiting entry.
    ///
    /// # Errors
    /// [`MatchError::NotQueued`] if the participant is not waiting.
    pub fn leave(&mut self, participant_id: ParticipantId) -> Result<QueueEntry, MatchError> {
        let index = self
            .waiting
            .iter()
            .position(|e| e.participant_id() == participant_id)
            .ok_or(MatchError::NotQueued(participant_id))?;
        let entry = self
            .waiting
            .remove(index)
            .ok_or(MatchError::NotQueued(participant_id))?;
        tracing::info!(%participant_id, "left queue");
        Ok(entry)
    }

    /// Forms the next pairing if the roster is free and two entrants wait.
    pub fn try_pair(&mut self) -> Option<Pairing> {
        if self.roster.is_some() || self.waiting.len() < 2 {
            return None;
        }
        let mut first = self.waiting.pop_front()?;
        let mut second = self.waiting.pop_front()?;
        first.status = QueueStatus::Paired;
        second.status = QueueStatus::Paired;

        let pairing = Pairing {
            first: first.profile.clone(),
            second: second.profile.clone(),
        };
        tracing::info!(
            first = %first.participant_id(),
            second = %second.participant_id(),
            still_waiting = self.waiting.len(),
            "pairing formed"
        );
        self.roster = Some([first, second]);
        Some(pairing)
    }

    /// Frees the roster if `participant_id` is on it. Returns whether it was.
    pub fn release(&mut self, participant_id: ParticipantId) -> bool {
        if self.is_paired(&participant_id) {
            self.roster = None;
            tracing::debug!(%participant_id, "roster released");
            true
        } else {
            false
        }
    }

    /// Refreshes a paired participant's activity timestamp.
    ///
    /// # Errors
    /// [`MatchError::NotPaired`] if the participant is not on the roster.
    pub fn renew(&mut self, participant_id: ParticipantId) -> Result<(), MatchError> {
        let entry = self
            .roster
            .iter_mut()
            .flatten()
            .find(|e| e.participant_id() == participant_id)
            .ok_or(MatchError::NotPaired(participant_id))?;
        entry.last_activity = Instant::now();
        Ok(())
    }

    /// Empties the waiting line. The roster is untouched.
    pub fn clear(&mut self) -> Vec<QueueEntry> {
        let cleared: Vec<QueueEntry> = self.waiting.drain(..).collect();
        tracing::info!(cleared = cleared.len(), "queue cleared");
        cleared
    }

    pub fn is_queued(&self, participant_id: &ParticipantId) -> bool {
        self.waiting
            .iter()
            .any(|e| e.participant_id() == *participant_id)
    }

    pub fn is_paired(&self, participant_id: &ParticipantId) -> bool {
        self.roster
            .iter()
            .flatten()
            .any(|e| e.participant_id() == *participant_id)
    }

    /// Number of waiting entries.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// The waiting line as broadcast to observers.
    pub fn snapshot(&self) -> Vec<QueueRow> {
        self.waiting
            .iter()
            .enumerate()
            .map(|(i, e)| QueueRow {
                position: i + 1,
                participant_id: e.participant_id(),
                display_name: e.profile.display_name.clone(),
                avatar: e.profile.avatar.clone(),
                status: e.status,
            })
            .collect()
    }

    /// The currently paired participants, first mover first.
    pub fn roster(&self) -> Vec<ParticipantProfile> {
        self.roster
            .iter()
            .flatten()
            .map(|e| e.profile.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: u64) -> ParticipantProfile {
        ParticipantProfile {
            participant_id: ParticipantId(id),
            display_name: format!("player{id}"),
            avatar: None,
        }
    }

    fn pid(id: u64) -> ParticipantId {
        ParticipantId(id)
    }

    #[test]
    fn test_join_alone_does_not_pair() {
        let mut queue = Matchmaker::new(25);
        assert_eq!(queue.join(profile(1), false), Ok(1));

        assert!(queue.try_pair().is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.roster().is_empty());
    }

    #[test]
    fn test_try_pair_is_fifo() {
        let mut queue = Matchmaker::new(25);
        for id in 1..=4 {
            queue.join(profile(id), false).unwrap();
        }

        let pairing = queue.try_pair().unwrap();
        assert_eq!(pairing.first.participant_id, pid(1));
        assert_eq!(pairing.second.participant_id, pid(2));

        let waiting: Vec<_> = queue.snapshot().iter().map(|r| r.participant_id).collect();
        assert_eq!(waiting, vec![pid(3), pid(4)]);
    }

    #[test]
    fn test_try_pair_waits_for_roster_release() {
        let mut queue = Matchmaker::new(25);
        for id in 1..=4 {
            queue.join(profile(id), false).unwrap();
        }
        queue.try_pair().unwrap();
        assert!(queue.try_pair().is_none(), "roster still occupied");

        assert!(queue.release(pid(2)));
        let next = queue.try_pair().unwrap();
        assert_eq!(next.first.participant_id, pid(3));
        assert_eq!(next.second.participant_id, pid(4));
    }

    #[test]
    fn test_join_duplicate_rejected() {
        let mut queue = Matchmaker::new(25);
        queue.join(profile(1), false).unwrap();
        assert_eq!(
            queue.join(profile(1), false),
            Err(MatchError::AlreadyQueued(pid(1)))
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_join_while_paired_rejected() {
        let mut queue = Matchmaker::new(25);
        queue.join(profile(1), false).unwrap();
        queue.join(profile(2), false).unwrap();
        queue.try_pair().unwrap();

        assert_eq!(
            queue.join(profile(1), true),
            Err(MatchError::AlreadyInSession(pid(1)))
        );
        // A roster entry whose session is already gone still blocks a rejoin.
        assert_eq!(
            queue.join(profile(2), false),
            Err(MatchError::AlreadyQueued(pid(2)))
        );
    }

    #[test]
    fn test_join_in_session_rejected() {
        let mut queue = Matchmaker::new(25);
        assert_eq!(
            queue.join(profile(1), true),
            Err(MatchError::AlreadyInSession(pid(1)))
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_join_full_queue_rejected() {
        let mut queue = Matchmaker::new(2);
        queue.join(profile(1), false).unwrap();
        queue.join(profile(2), false).unwrap();
        assert_eq!(
            queue.join(profile(3), false),
            Err(MatchError::QueueFull { max: 2 })
        );
    }

    #[test]
    fn test_leave_removes_and_reports_missing() {
        let mut queue = Matchmaker::new(25);
        queue.join(profile(1), false).unwrap();
        queue.join(profile(2), false).unwrap();

        let entry = queue.leave(pid(1)).unwrap();
        assert_eq!(entry.participant_id(), pid(1));
        assert_eq!(queue.snapshot()[0].position, 1);
        assert_eq!(queue.leave(pid(1)).unwrap_err(), MatchError::NotQueued(pid(1)));
    }

    #[test]
    fn test_renew_only_for_paired() {
        let mut queue = Matchmaker::new(25);
        queue.join(profile(1), false).unwrap();
        assert_eq!(queue.renew(pid(1)), Err(MatchError::NotPaired(pid(1))));

        queue.join(profile(2), false).unwrap();
        queue.try_pair().unwrap();
        assert_eq!(queue.renew(pid(1)), Ok(()));
    }

    #[test]
    fn test_clear_keeps_roster() {
        let mut queue = Matchmaker::new(25);
        for id in 1..=3 {
            queue.join(profile(id), false).unwrap();
        }
        queue.try_pair().unwrap();

        let cleared = queue.clear();
        assert_eq!(cleared.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.roster().len(), 2);
    }

    #[test]
    fn test_release_unknown_is_false() {
        let mut queue = Matchmaker::new(25);
        assert!(!queue.release(pid(1)));
    }
}

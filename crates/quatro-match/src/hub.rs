//! Outbound event routing.
//!
//! The hub is the only thing the lobby knows about connections: one
//! unbounded sender per participant, plus observer groups per session.
//! The connection handler owns the matching receiver and writes whatever
//! arrives to the socket, so the lobby never awaits a slow client.

use std::collections::{HashMap, HashSet};

use quatro_protocol::{ParticipantId, Recipient, ServerEvent, SessionId};
use tokio::sync::mpsc;

/// Sending half of a participant's outbound queue.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
pub struct Hub {
    outboxes: HashMap<ParticipantId, Outbox>,
    groups: HashMap<SessionId, HashSet<ParticipantId>>,
    admins: HashSet<ParticipantId>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, participant_id: ParticipantId, outbox: Outbox, is_admin: bool) {
        self.outboxes.insert(participant_id, outbox);
        if is_admin {
            self.admins.insert(participant_id);
        }
    }

    /// Forgets a participant everywhere, including session groups.
    pub fn unregister(&mut self, participant_id: ParticipantId) {
        self.outboxes.remove(&participant_id);
        self.admins.remove(&participant_id);
        for members in self.groups.values_mut() {
            members.remove(&participant_id);
        }
    }

    pub fn is_connected(&self, participant_id: &ParticipantId) -> bool {
        self.outboxes.contains_key(participant_id)
    }

    pub fn has_admins(&self) -> bool {
        !self.admins.is_empty()
    }

    pub fn join_group(&mut self, session_id: SessionId, participant_id: ParticipantId) {
        self.groups.entry(session_id).or_default().insert(participant_id);
    }

    /// Dissolves a session's group.
    pub fn drop_group(&mut self, session_id: SessionId) {
        self.groups.remove(&session_id);
    }

    #[cfg(test)]
    pub(crate) fn group_size(&self, session_id: &SessionId) -> usize {
        self.groups.get(session_id).map_or(0, HashSet::len)
    }

    /// Delivers `event` to every participant `recipient` names.
    ///
    /// Closed outboxes are skipped: the participant's disconnect is
    /// already on its way to the lobby.
    pub fn send(&self, recipient: Recipient, event: ServerEvent) {
        match recipient {
            Recipient::Participant(participant_id) => self.deliver(&participant_id, event),
            Recipient::All => {
                for outbox in self.outboxes.values() {
                    let _ = outbox.send(event.clone());
                }
            }
            Recipient::Session(session_id) => {
                if let Some(members) = self.groups.get(&session_id) {
                    for participant_id in members {
                        self.deliver(participant_id, event.clone());
                    }
                }
            }
            Recipient::Admins => {
                for participant_id in &self.admins {
                    self.deliver(participant_id, event.clone());
                }
            }
        }
    }

    fn deliver(&self, participant_id: &ParticipantId, event: ServerEvent) {
        if let Some(outbox) = self.outboxes.get(participant_id) {
            if outbox.send(event).is_err() {
                tracing::debug!(%participant_id, "outbox closed, dropping event");
            }
        }
    }
}

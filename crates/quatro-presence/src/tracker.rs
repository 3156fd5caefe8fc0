//! Per-connection activity records and active/inactive classification.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use quatro_protocol::{ParticipantId, PresenceRow, PresenceStatus};
use tokio::time::Instant;

use crate::{Identity, PresenceError};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Presence classification settings.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// A connected participant silent for longer than this is reported as
    /// inactive. Default: 60 seconds.
    pub idle_threshold: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// ActivityRecord
// ---------------------------------------------------------------------------

/// The presence side-table entry for one connected participant.
///
/// Created on connect, touched on every inbound event, removed on
/// disconnect. Independent of the lobby's inactivity deadlines: a
/// participant may be idle here while still holding a queue slot.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub identity: Identity,
    pub connected_at: Instant,
    pub last_seen: Instant,
    /// Wall-clock twin of `last_seen`, for display.
    pub last_seen_unix_ms: u64,
}

impl ActivityRecord {
    fn new(identity: Identity) -> Self {
        let now = Instant::now();
        Self {
            identity,
            connected_at: now,
            last_seen: now,
            last_seen_unix_ms: unix_millis(),
        }
    }

    /// Classifies this record as of `now`.
    pub fn status_at(&self, now: Instant, threshold: Duration) -> PresenceStatus {
        if now.saturating_duration_since(self.last_seen) > threshold {
            PresenceStatus::Inactive
        } else {
            PresenceStatus::Active
        }
    }
}

// ---------------------------------------------------------------------------
// PresenceTracker
// ---------------------------------------------------------------------------

/// Tracks every connected participant.
///
/// Read-only with respect to queue and session state; the lobby consults
/// it for identities and feeds its rows into admin snapshots.
pub struct PresenceTracker {
    records: HashMap<ParticipantId, ActivityRecord>,
    config: PresenceConfig,
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            records: HashMap::new(),
            config,
        }
    }

    /// Admits a freshly resolved connection.
    ///
    /// # Errors
    /// [`PresenceError::AlreadyConnected`] if the participant already
    /// holds a connection.
    pub fn connect(
        &mut self,
        identity: Identity,
    ) -> Result<&ActivityRecord, PresenceError> {
        let participant_id = identity.participant_id();
        if self.records.contains_key(&participant_id) {
            return Err(PresenceError::AlreadyConnected(participant_id));
        }

        tracing::info!(
            %participant_id,
            name = identity.display_name(),
            privileged = identity.is_privileged,
            "participant connected"
        );
        Ok(self
            .records
            .entry(participant_id)
            .or_insert(ActivityRecord::new(identity)))
    }

    /// Records inbound activity.
    ///
    /// # Errors
    /// [`PresenceError::NotFound`] if the participant is not connected.
    pub fn touch(&mut self, participant_id: ParticipantId) -> Result<(), PresenceError> {
        let record = self
            .records
            .get_mut(&participant_id)
            .ok_or(PresenceError::NotFound(participant_id))?;
        record.last_seen = Instant::now();
        record.last_seen_unix_ms = unix_millis();
        Ok(())
    }

    /// Drops the record and returns it.
    ///
    /// # Errors
    /// [`PresenceError::NotFound`] if the participant is not connected.
    pub fn disconnect(
        &mut self,
        participant_id: ParticipantId,
    ) -> Result<ActivityRecord, PresenceError> {
        let record = self
            .records
            .remove(&participant_id)
            .ok_or(PresenceError::NotFound(participant_id))?;
        tracing::info!(
            %participant_id,
            connected_for = ?record.connected_at.elapsed(),
            "participant disconnected"
        );
        Ok(record)
    }

    pub fn get(&self, participant_id: &ParticipantId) -> Option<&ActivityRecord> {
        self.records.get(participant_id)
    }

    pub fn identity(&self, participant_id: &ParticipantId) -> Option<&Identity> {
        self.records.get(participant_id).map(|r| &r.identity)
    }

    /// Returns `true` if the participant is connected with privileges.
    pub fn is_privileged(&self, participant_id: &ParticipantId) -> bool {
        self.identity(participant_id)
            .is_some_and(|identity| identity.is_privileged)
    }

    /// Per-participant rows as of `now`, ordered by participant id.
    pub fn rows_at(&self, now: Instant) -> Vec<PresenceRow> {
        let mut rows: Vec<PresenceRow> = self
            .records
            .values()
            .map(|record| PresenceRow {
                participant_id: record.identity.participant_id(),
                display_name: record.identity.display_name().to_owned(),
                avatar: record.identity.profile.avatar.clone(),
                status: record.status_at(now, self.config.idle_threshold),
                last_activity: record.last_seen_unix_ms,
            })
            .collect();
        rows.sort_by_key(|row| row.participant_id);
        rows
    }

    /// `(online, inactive)` counts as of `now`. Every connected
    /// participant counts as online, idle or not.
    pub fn counts_at(&self, now: Instant) -> (usize, usize) {
        let inactive = self
            .records
            .values()
            .filter(|r| {
                r.status_at(now, self.config.idle_threshold) == PresenceStatus::Inactive
            })
            .count();
        (self.records.len(), inactive)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Milliseconds since the unix epoch, saturating at 0 for clocks set
/// before 1970.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use quatro_protocol::ParticipantProfile;

    use super::*;

    fn identity(id: u64, privileged: bool) -> Identity {
        Identity {
            profile: ParticipantProfile {
                participant_id: ParticipantId(id),
                display_name: format!("user{id}"),
                avatar: None,
            },
            is_privileged: privileged,
        }
    }

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(PresenceConfig::default())
    }

    #[test]
    fn test_connect_creates_record() {
        let mut presence = tracker();
        let record = presence.connect(identity(1, false)).unwrap();
        assert_eq!(record.identity.participant_id(), ParticipantId(1));
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let mut presence = tracker();
        presence.connect(identity(1, false)).unwrap();
        let result = presence.connect(identity(1, false));
        assert!(matches!(result, Err(PresenceError::AlreadyConnected(p)) if p == ParticipantId(1)));
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn test_touch_unknown_is_not_found() {
        let mut presence = tracker();
        assert!(matches!(
            presence.touch(ParticipantId(9)),
            Err(PresenceError::NotFound(_))
        ));
    }

    #[test]
    fn test_disconnect_removes_record() {
        let mut presence = tracker();
        presence.connect(identity(1, false)).unwrap();

        let record = presence.disconnect(ParticipantId(1)).unwrap();
        assert_eq!(record.identity.participant_id(), ParticipantId(1));
        assert!(presence.is_empty());
        assert!(presence.disconnect(ParticipantId(1)).is_err());
    }

    #[test]
    fn test_classification_uses_threshold() {
        let mut presence = tracker();
        presence.connect(identity(1, false)).unwrap();
        presence.connect(identity(2, false)).unwrap();

        let now = Instant::now();
        assert_eq!(presence.counts_at(now), (2, 0));

        let later = now + Duration::from_secs(61);
        assert_eq!(presence.counts_at(later), (2, 2));
        assert!(
            presence
                .rows_at(later)
                .iter()
                .all(|row| row.status == PresenceStatus::Inactive)
        );
    }

    #[test]
    fn test_touch_refreshes_last_seen() {
        let mut presence = tracker();
        presence.connect(identity(1, false)).unwrap();
        let before = presence.get(&ParticipantId(1)).unwrap().last_seen;

        presence.touch(ParticipantId(1)).unwrap();
        let after = presence.get(&ParticipantId(1)).unwrap().last_seen;
        assert!(after >= before);
    }

    #[test]
    fn test_rows_are_ordered_by_participant() {
        let mut presence = tracker();
        for id in [5, 2, 9] {
            presence.connect(identity(id, false)).unwrap();
        }
        let ids: Vec<u64> = presence
            .rows_at(Instant::now())
            .iter()
            .map(|row| row.participant_id.0)
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_is_privileged() {
        let mut presence = tracker();
        presence.connect(identity(1, true)).unwrap();
        presence.connect(identity(2, false)).unwrap();

        assert!(presence.is_privileged(&ParticipantId(1)));
        assert!(!presence.is_privileged(&ParticipantId(2)));
        assert!(!presence.is_privileged(&ParticipantId(3)));
    }
}

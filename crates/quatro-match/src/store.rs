//! Persistence seam.
//!
//! Match history and cumulative player stats live in an external store.
//! The lobby only ever reaches it through [`MatchStore`], from a
//! background worker, so a slow or failing store degrades history and
//! scores but never stalls a game in progress.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use quatro_engine::Difficulty;
use quatro_protocol::{
    FinishReason, HistoryRow, LeaderboardRow, ParticipantId, ParticipantProfile, RecordId, Seat,
    SessionId, SessionMode,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Finished,
}

/// Written when a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMatchRecord {
    pub session_id: SessionId,
    pub mode: SessionMode,
    /// First mover first.
    pub seats: [Seat; 2],
    pub difficulty: Option<Difficulty>,
    /// Unix milliseconds.
    pub started_at: u64,
}

/// Written when a session finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecordUpdate {
    pub status: MatchStatus,
    pub winner: Option<Seat>,
    pub reason: FinishReason,
    /// The board in its `/`-separated string form.
    pub final_board: String,
    pub move_count: usize,
    pub started_at: u64,
    pub finished_at: u64,
}

/// A stored match: the opening record with the final update applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: RecordId,
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub seats: [Seat; 2],
    pub difficulty: Option<Difficulty>,
    pub status: MatchStatus,
    pub winner: Option<Seat>,
    pub reason: Option<FinishReason>,
    pub final_board: Option<String>,
    pub move_count: usize,
    pub started_at: u64,
    pub finished_at: Option<u64>,
}

impl MatchRecord {
    /// The listing form of a finished record; `None` while still active.
    pub fn history_row(&self) -> Option<HistoryRow> {
        if self.status != MatchStatus::Finished {
            return None;
        }
        Some(HistoryRow {
            session_id: self.session_id,
            mode: self.mode,
            seats: self.seats,
            difficulty: self.difficulty,
            winner: self.winner,
            reason: self.reason?,
            final_board: self.final_board.clone()?,
            move_count: self.move_count,
            started_at: self.started_at,
            finished_at: self.finished_at?,
        })
    }

    fn involves(&self, participant_id: ParticipantId) -> bool {
        self.seats.contains(&Seat::Human(participant_id))
    }
}

/// Increments applied to a participant's cumulative stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsDelta {
    pub wins: u32,
    pub losses: u32,
    pub points: u64,
}

impl StatsDelta {
    pub fn win(points: u64) -> Self {
        Self {
            wins: 1,
            losses: 0,
            points,
        }
    }

    pub fn loss() -> Self {
        Self {
            wins: 0,
            losses: 1,
            points: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// MatchStore
// ---------------------------------------------------------------------------

/// What the lobby needs from persistence.
///
/// Single-document upserts only; nothing here needs a transaction.
pub trait MatchStore: Send + Sync + 'static {
    /// Makes sure an account row exists for a connecting participant and
    /// refreshes its display fields.
    fn upsert_account(
        &self,
        profile: &ParticipantProfile,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_match_record(
        &self,
        record: NewMatchRecord,
    ) -> impl Future<Output = Result<RecordId, StoreError>> + Send;

    fn update_match_record(
        &self,
        id: RecordId,
        update: MatchRecordUpdate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn increment_user_stats(
        &self,
        participant_id: ParticipantId,
        delta: StatsDelta,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Highest points first.
    fn find_top_by_points(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeaderboardRow>, StoreError>> + Send;

    fn count_accounts(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Finished matches `participant_id` played in, most recently
    /// finished first.
    fn find_history(
        &self,
        participant_id: ParticipantId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MatchRecord>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Clones share the same data.
///
/// Used by the default server and by tests; [`MemoryStore::set_unavailable`]
/// makes every call fail, to exercise the degraded path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_record: u64,
    records: HashMap<RecordId, MatchRecord>,
    accounts: HashMap<ParticipantId, Account>,
    unavailable: bool,
}

/// A stored account with cumulative stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub profile: ParticipantProfile,
    pub wins: u32,
    pub losses: u32,
    pub points: u64,
}

impl Account {
    fn new(profile: ParticipantProfile) -> Self {
        Self {
            profile,
            wins: 0,
            losses: 0,
            points: 0,
        }
    }
}

impl MemoryInner {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable("memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    /// All records, oldest first.
    pub async fn records(&self) -> Vec<MatchRecord> {
        let inner = self.inner.lock().await;
        let mut records: Vec<MatchRecord> = inner.records.values().cloned().collect();
        records.sort_by_key(|r| r.id.0);
        records
    }

    pub async fn account(&self, participant_id: ParticipantId) -> Option<Account> {
        self.inner.lock().await.accounts.get(&participant_id).cloned()
    }
}

impl MatchStore for MemoryStore {
    async fn upsert_account(&self, profile: &ParticipantProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        inner
            .accounts
            .entry(profile.participant_id)
            .and_modify(|account| account.profile = profile.clone())
            .or_insert_with(|| Account::new(profile.clone()));
        Ok(())
    }

    async fn create_match_record(&self, record: NewMatchRecord) -> Result<RecordId, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        inner.next_record += 1;
        let id = RecordId(inner.next_record);
        inner.records.insert(
            id,
            MatchRecord {
                id,
                session_id: record.session_id,
                mode: record.mode,
                seats: record.seats,
                difficulty: record.difficulty,
                status: MatchStatus::Active,
                winner: None,
                reason: None,
                final_board: None,
                move_count: 0,
                started_at: record.started_at,
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn update_match_record(
        &self,
        id: RecordId,
        update: MatchRecordUpdate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(StoreError::RecordNotFound(id))?;
        record.status = update.status;
        record.winner = update.winner;
        record.reason = Some(update.reason);
        record.final_board = Some(update.final_board);
        record.move_count = update.move_count;
        record.started_at = update.started_at;
        record.finished_at = Some(update.finished_at);
        Ok(())
    }

    async fn increment_user_stats(
        &self,
        participant_id: ParticipantId,
        delta: StatsDelta,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check()?;
        let account = inner.accounts.entry(participant_id).or_insert_with(|| {
            Account::new(ParticipantProfile {
                participant_id,
                display_name: participant_id.to_string(),
                avatar: None,
            })
        });
        account.wins += delta.wins;
        account.losses += delta.losses;
        account.points += delta.points;
        Ok(())
    }

    async fn find_top_by_points(&self, limit: usize) -> Result<Vec<LeaderboardRow>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        let mut accounts: Vec<&Account> = inner.accounts.values().collect();
        accounts.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then(b.wins.cmp(&a.wins))
                .then(a.profile.participant_id.cmp(&b.profile.participant_id))
        });
        Ok(accounts
            .into_iter()
            .take(limit)
            .map(|a| LeaderboardRow {
                participant_id: a.profile.participant_id,
                display_name: a.profile.display_name.clone(),
                avatar: a.profile.avatar.clone(),
                wins: a.wins,
                losses: a.losses,
                points: a.points,
            })
            .collect())
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        Ok(inner.accounts.len() as u64)
    }

    async fn find_history(
        &self,
        participant_id: ParticipantId,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, StoreError> {
        let inner = self.inner.lock().await;
        inner.check()?;
        let mut records: Vec<&MatchRecord> = inner
            .records
            .values()
            .filter(|r| r.status == MatchStatus::Finished && r.involves(participant_id))
            .collect();
        records.sort_by(|a, b| b.finished_at.cmp(&a.finished_at).then(b.id.0.cmp(&a.id.0)));
        Ok(records.into_iter().take(limit).cloned().collect())
    }
}

//! Background persistence worker.
//!
//! The lobby hands the recorder jobs over an unbounded channel and never
//! waits for them. Jobs run one at a time in submission order, so a
//! match record is always created before it is updated, and stats are
//! always written before the leaderboard that reflects them is read.
//! Failures are logged and dropped; the live game has already moved on.

use std::collections::HashMap;

use quatro_protocol::{
    HistoryRow, LeaderboardRow, ParticipantId, ParticipantProfile, RecordId, SessionId,
};
use tokio::sync::mpsc;

use crate::store::{MatchRecordUpdate, MatchStore, NewMatchRecord, StatsDelta, StoreError};

pub(crate) enum StoreJob {
    UpsertAccount(ParticipantProfile),
    OpenRecord(NewMatchRecord),
    CloseRecord {
        session_id: SessionId,
        update: MatchRecordUpdate,
    },
    /// Applies stat deltas, then refreshes the leaderboard.
    ApplyResult(Vec<(ParticipantId, StatsDelta)>),
    RefreshLeaderboard,
    CountAccounts,
    /// Lists `subject`'s finished matches for `requester`.
    History {
        requester: ParticipantId,
        subject: ParticipantId,
        limit: usize,
    },
}

/// Results the lobby caches for later broadcasts.
#[derive(Debug)]
pub(crate) enum StoreReport {
    Leaderboard(Vec<LeaderboardRow>),
    Accounts(u64),
    History {
        requester: ParticipantId,
        subject: ParticipantId,
        rows: Result<Vec<HistoryRow>, StoreError>,
    },
}

struct Recorder<S> {
    store: S,
    leaderboard_size: usize,
    /// Live session → its persisted record.
    records: HashMap<SessionId, RecordId>,
    reports: mpsc::UnboundedSender<StoreReport>,
}

impl<S: MatchStore> Recorder<S> {
    async fn run(mut self, mut jobs: mpsc::UnboundedReceiver<StoreJob>) {
        while let Some(job) = jobs.recv().await {
            self.handle(job).await;
        }
        tracing::debug!("recorder stopped");
    }

    async fn handle(&mut self, job: StoreJob) {
        match job {
            StoreJob::UpsertAccount(profile) => {
                if let Err(e) = self.store.upsert_account(&profile).await {
                    tracing::warn!(participant_id = %profile.participant_id, error = %e, "account upsert failed");
                }
            }
            StoreJob::OpenRecord(record) => {
                let session_id = record.session_id;
                match self.store.create_match_record(record).await {
                    Ok(record_id) => {
                        tracing::debug!(%session_id, %record_id, "match record created");
                        self.records.insert(session_id, record_id);
                    }
                    Err(e) => {
                        tracing::warn!(%session_id, error = %e, "match record creation failed");
                    }
                }
            }
            StoreJob::CloseRecord { session_id, update } => {
                let Some(record_id) = self.records.remove(&session_id) else {
                    tracing::warn!(%session_id, "no match record to finalize");
                    return;
                };
                if let Err(e) = self.store.update_match_record(record_id, update).await {
                    tracing::warn!(%session_id, %record_id, error = %e, "match record update failed");
                }
            }
            StoreJob::ApplyResult(deltas) => {
                for (participant_id, delta) in deltas {
                    if let Err(e) = self.store.increment_user_stats(participant_id, delta).await {
                        tracing::warn!(%participant_id, error = %e, "stats update failed");
                    }
                }
                self.refresh_leaderboard().await;
            }
            StoreJob::RefreshLeaderboard => self.refresh_leaderboard().await,
            StoreJob::CountAccounts => match self.store.count_accounts().await {
                Ok(total) => {
                    let _ = self.reports.send(StoreReport::Accounts(total));
                }
                Err(e) => tracing::warn!(error = %e, "account count failed"),
            },
            StoreJob::History {
                requester,
                subject,
                limit,
            } => {
                let rows: Result<Vec<HistoryRow>, StoreError> = self
                    .store
                    .find_history(subject, limit)
                    .await
                    .map(|records| records.iter().filter_map(|r| r.history_row()).collect());
                if let Err(e) = &rows {
                    tracing::warn!(%subject, error = %e, "history query failed");
                }
                let _ = self.reports.send(StoreReport::History {
                    requester,
                    subject,
                    rows,
                });
            }
        }
    }

    async fn refresh_leaderboard(&self) {
        match self.store.find_top_by_points(self.leaderboard_size).await {
            Ok(rows) => {
                let _ = self.reports.send(StoreReport::Leaderboard(rows));
            }
            Err(e) => tracing::warn!(error = %e, "leaderboard query failed"),
        }
    }
}

/// Starts the worker and returns its job queue.
pub(crate) fn spawn_recorder<S: MatchStore>(
    store: S,
    leaderboard_size: usize,
    reports: mpsc::UnboundedSender<StoreReport>,
) -> mpsc::UnboundedSender<StoreJob> {
    let (tx, rx) = mpsc::unbounded_channel();
    let recorder = Recorder {
        store,
        leaderboard_size,
        records: HashMap::new(),
        reports,
    };
    tokio::spawn(recorder.run(rx));
    tx
}

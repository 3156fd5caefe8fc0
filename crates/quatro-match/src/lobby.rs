//! The lobby actor: the single owner of all matchmaking and session state.
//!
//! Every mutation runs inside one tokio task, fed by an mpsc command
//! channel. Connection handlers talk to it through a cloneable
//! [`LobbyHandle`]; commands that need an answer carry a oneshot reply.
//! Because only this task touches the queue, the roster, the session map,
//! and the deadline registries, no two mutations ever interleave and no
//! locks are needed.
//!
//! Besides commands, the actor's `select!` loop also wakes for:
//! - inactivity deadlines (one per in-session participant)
//! - bot turns (one per human-vs-bot session whose bot is "thinking")
//! - reports from the persistence worker (leaderboard, account count,
//!   history answers)
//! - the periodic admin snapshot
//!
//! ```text
//!   handler ──LobbyHandle──→ [ commands ] ─┐
//!   DeadlineRegistry ──────→ [ expiries ] ─┼─→ Lobby (select!) ──→ Hub ──→ outboxes
//!   recorder ──────────────→ [ reports  ] ─┘        │
//!                                                   └──→ recorder (jobs)
//! ```

use quatro_engine::Difficulty;
use quatro_presence::{Identity, PresenceConfig, PresenceTracker};
use quatro_protocol::{
    AdminSnapshot, ClientEvent, FinishReason, LeaderboardRow, ParticipantId,
    ParticipantProfile, Recipient, ServerEvent, SessionId, SessionMode,
};
use quatro_timer::{DeadlineRegistry, Expired, jittered};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::coordinator::{Challenger, Coordinator, MoveOutcome, Outcome};
use crate::hub::{Hub, Outbox};
use crate::queue::Matchmaker;
use crate::recorder::{StoreJob, StoreReport, spawn_recorder};
use crate::store::MatchStore;
use crate::{LobbyConfig, MatchError};

/// Capacity of the command channel. Senders wait when it is full.
const COMMAND_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) enum LobbyCommand {
    Connect {
        identity: Identity,
        outbox: Outbox,
        reply: oneshot::Sender<Result<(), MatchError>>,
    },
    Disconnect {
        participant_id: ParticipantId,
        reply: oneshot::Sender<()>,
    },
    Event {
        participant_id: ParticipantId,
        event: ClientEvent,
        reply: oneshot::Sender<Result<(), MatchError>>,
    },
    Inspect {
        reply: oneshot::Sender<LobbyInfo>,
    },
    Shutdown,
}

/// Point-in-time counters, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyInfo {
    pub connected: usize,
    pub queue_size: usize,
    pub roster: Vec<ParticipantId>,
    pub active_sessions: usize,
    /// Armed inactivity deadlines.
    pub inactivity_deadlines: usize,
    /// Bot turns waiting on their thinking delay.
    pub pending_bot_turns: usize,
}

// ---------------------------------------------------------------------------
// LobbyHandle
// ---------------------------------------------------------------------------

/// Cloneable handle to the lobby actor.
///
/// Every method fails with [`MatchError::Unavailable`] once the actor
/// has stopped.
#[derive(Clone)]
pub struct LobbyHandle {
    sender: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> LobbyCommand,
    ) -> Result<T, MatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| MatchError::Unavailable)?;
        reply_rx.await.map_err(|_| MatchError::Unavailable)
    }

    /// Admits a resolved participant. Outbound events for them are pushed
    /// to `outbox` from now on, starting with the current queue, roster,
    /// and leaderboard.
    pub async fn connect(&self, identity: Identity, outbox: Outbox) -> Result<(), MatchError> {
        self.request(|reply| LobbyCommand::Connect {
            identity,
            outbox,
            reply,
        })
        .await?
    }

    /// Reports that a participant's connection is gone. Forfeits any
    /// session they were in and drops them from the queue.
    pub async fn disconnect(&self, participant_id: ParticipantId) -> Result<(), MatchError> {
        self.request(|reply| LobbyCommand::Disconnect {
            participant_id,
            reply,
        })
        .await
    }

    /// Submits one client event on behalf of `participant_id`.
    pub async fn submit(
        &self,
        participant_id: ParticipantId,
        event: ClientEvent,
    ) -> Result<(), MatchError> {
        self.request(|reply| LobbyCommand::Event {
            participant_id,
            event,
            reply,
        })
        .await?
    }

    pub async fn info(&self) -> Result<LobbyInfo, MatchError> {
        self.request(|reply| LobbyCommand::Inspect { reply }).await
    }

    /// Stops the actor. Pending deadlines are dropped with it.
    pub async fn shutdown(&self) -> Result<(), MatchError> {
        self.sender
            .send(LobbyCommand::Shutdown)
            .await
            .map_err(|_| MatchError::Unavailable)
    }
}

/// The event, if any, a connection should send back after `event` was
/// handled with `result`.
///
/// Move rejections become `move_rejected`. Requests whose success is
/// already visible through other events (moves, heartbeats, state
/// queries) get no reply on success.
pub fn reply_for(event: &ClientEvent, result: &Result<(), MatchError>) -> Option<ServerEvent> {
    match (event, result) {
        (ClientEvent::SubmitMove { session_id, .. }, Err(err)) => Some(ServerEvent::MoveRejected {
            session_id: *session_id,
            reason: err.reason().to_owned(),
        }),
        (ClientEvent::Heartbeat, _) => None,
        (
            ClientEvent::SubmitMove { .. }
            | ClientEvent::QueueState
            | ClientEvent::MatchHistory { .. }
            | ClientEvent::AdminSnapshot,
            Ok(()),
        ) => None,
        (_, Ok(())) => Some(ServerEvent::ok(event.name())),
        (_, Err(err)) => Some(ServerEvent::rejected(event.name(), err.reason())),
    }
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

struct Lobby {
    config: LobbyConfig,
    presence: PresenceTracker,
    queue: Matchmaker,
    sessions: Coordinator,
    hub: Hub,
    inactivity: DeadlineRegistry<ParticipantId>,
    bot_turns: DeadlineRegistry<SessionId>,
    jobs: mpsc::UnboundedSender<StoreJob>,
    rng: StdRng,
    leaderboard: Vec<LeaderboardRow>,
    total_accounts: Option<u64>,
}

struct Inboxes {
    commands: mpsc::Receiver<LobbyCommand>,
    inactivity: mpsc::UnboundedReceiver<Expired<ParticipantId>>,
    bot_turns: mpsc::UnboundedReceiver<Expired<SessionId>>,
    reports: mpsc::UnboundedReceiver<StoreReport>,
}

/// Starts the lobby actor and its persistence worker.
pub fn spawn_lobby<S: MatchStore>(config: LobbyConfig, store: S) -> LobbyHandle {
    let (sender, commands) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (reports_tx, reports) = mpsc::unbounded_channel();
    let jobs = spawn_recorder(store, config.leaderboard_size, reports_tx);
    let (inactivity, inactivity_rx) = DeadlineRegistry::new();
    let (bot_turns, bot_turns_rx) = DeadlineRegistry::new();

    let rng = match config.bot_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let lobby = Lobby {
        presence: PresenceTracker::new(PresenceConfig {
            idle_threshold: config.presence_idle(),
        }),
        queue: Matchmaker::new(config.max_queue_size),
        sessions: Coordinator::new(),
        hub: Hub::new(),
        inactivity,
        bot_turns,
        jobs,
        rng,
        leaderboard: Vec::new(),
        total_accounts: None,
        config,
    };
    lobby.submit_job(StoreJob::RefreshLeaderboard);
    lobby.submit_job(StoreJob::CountAccounts);

    tokio::spawn(lobby.run(Inboxes {
        commands,
        inactivity: inactivity_rx,
        bot_turns: bot_turns_rx,
        reports,
    }));
    LobbyHandle { sender }
}

async fn next_tick(interval: &mut Option<time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Lobby {
    async fn run(mut self, mut inboxes: Inboxes) {
        tracing::info!(
            max_queue_size = self.config.max_queue_size,
            inactivity_timeout = ?self.config.inactivity_timeout(),
            "lobby started"
        );

        let mut admin_tick = self.config.admin_snapshot_interval().map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                command = inboxes.commands.recv() => match command {
                    Some(LobbyCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(expired) = inboxes.inactivity.recv() => self.on_inactivity(expired),
                Some(expired) = inboxes.bot_turns.recv() => self.on_bot_turn(expired),
                Some(report) = inboxes.reports.recv() => self.on_report(report),
                _ = next_tick(&mut admin_tick) => self.on_admin_tick(),
            }
        }

        self.inactivity.clear();
        self.bot_turns.clear();
        tracing::info!(sessions = self.sessions.len(), "lobby stopped");
    }

    fn handle_command(&mut self, command: LobbyCommand) {
        match command {
            LobbyCommand::Connect {
                identity,
                outbox,
                reply,
            } => {
                let _ = reply.send(self.connect(identity, outbox));
            }
            LobbyCommand::Disconnect {
                participant_id,
                reply,
            } => {
                self.disconnect(participant_id);
                let _ = reply.send(());
            }
            LobbyCommand::Event {
                participant_id,
                event,
                reply,
            } => {
                let result = self.handle_event(participant_id, event);
                if let Err(err) = &result {
                    tracing::debug!(%participant_id, error = %err, "request rejected");
                }
                let _ = reply.send(result);
            }
            LobbyCommand::Inspect { reply } => {
                let _ = reply.send(self.info());
            }
            LobbyCommand::Shutdown => {}
        }
    }

    // -- connection lifecycle ----------------------------------------------

    fn connect(&mut self, identity: Identity, outbox: Outbox) -> Result<(), MatchError> {
        let participant_id = identity.participant_id();
        let is_admin = identity.is_privileged;
        let profile = identity.profile.clone();

        self.presence
            .connect(identity)
            .map_err(|_| MatchError::AlreadyConnected(participant_id))?;
        self.hub.register(participant_id, outbox, is_admin);
        self.submit_job(StoreJob::UpsertAccount(profile));

        let to = Recipient::Participant(participant_id);
        self.hub.send(to, self.queue_event());
        self.hub.send(to, self.roster_event());
        self.hub.send(
            to,
            ServerEvent::LeaderboardUpdated {
                rows: self.leaderboard.clone(),
            },
        );
        if is_admin {
            self.hub.send(to, ServerEvent::AdminSnapshot(self.snapshot()));
        }
        Ok(())
    }

    fn disconnect(&mut self, participant_id: ParticipantId) {
        if self.presence.disconnect(participant_id).is_err() {
            tracing::debug!(%participant_id, "disconnect for unknown participant");
            return;
        }

        self.inactivity.cancel(&participant_id);
        let left_queue = self.queue.leave(participant_id).is_ok();
        if let Some((session_id, outcome)) =
            self.sessions.forfeit(participant_id, FinishReason::Disconnect)
        {
            self.finish(session_id, outcome);
        } else if left_queue {
            self.broadcast_queue();
        }
        self.hub.unregister(participant_id);
    }

    // -- client events -----------------------------------------------------

    fn handle_event(
        &mut self,
        participant_id: ParticipantId,
        event: ClientEvent,
    ) -> Result<(), MatchError> {
        self.presence
            .touch(participant_id)
            .map_err(|_| MatchError::NotConnected(participant_id))?;

        match event {
            ClientEvent::Hello { .. } => Err(MatchError::AlreadyConnected(participant_id)),
            ClientEvent::JoinQueue => self.join_queue(participant_id),
            ClientEvent::LeaveQueue => {
                self.queue.leave(participant_id)?;
                self.broadcast_queue();
                Ok(())
            }
            ClientEvent::StartBotSession { difficulty } => {
                self.start_bot_session(participant_id, difficulty)
            }
            ClientEvent::SubmitMove { session_id, column } => {
                let outcome =
                    self.sessions
                        .apply_move(session_id, participant_id, column, &self.hub)?;
                self.renew(participant_id)?;
                self.after_move(session_id, outcome);
                Ok(())
            }
            ClientEvent::Resign { session_id } => {
                let outcome = self.sessions.resign(session_id, participant_id)?;
                self.finish(session_id, outcome);
                Ok(())
            }
            ClientEvent::Heartbeat => self.renew(participant_id),
            ClientEvent::QueueState => {
                let to = Recipient::Participant(participant_id);
                self.hub.send(to, self.queue_event());
                self.hub.send(to, self.roster_event());
                Ok(())
            }
            ClientEvent::MatchHistory {
                participant_id: subject,
            } => {
                let subject = subject.unwrap_or(participant_id);
                if subject != participant_id {
                    self.require_admin(participant_id)?;
                }
                self.submit_job(StoreJob::History {
                    requester: participant_id,
                    subject,
                    limit: self.config.history_size,
                });
                Ok(())
            }
            ClientEvent::ClearQueue => {
                self.require_admin(participant_id)?;
                let cleared = self.queue.clear();
                tracing::info!(%participant_id, cleared = cleared.len(), "queue cleared by admin");
                self.broadcast_queue();
                Ok(())
            }
            ClientEvent::RemoveFromQueue {
                participant_id: target,
            } => {
                self.require_admin(participant_id)?;
                self.queue
                    .leave(target)
                    .map_err(|_| MatchError::TargetNotQueued(target))?;
                tracing::info!(%participant_id, %target, "participant removed from queue by admin");
                self.broadcast_queue();
                Ok(())
            }
            ClientEvent::AdminSnapshot => {
                self.require_admin(participant_id)?;
                self.submit_job(StoreJob::CountAccounts);
                self.hub.send(
                    Recipient::Participant(participant_id),
                    ServerEvent::AdminSnapshot(self.snapshot()),
                );
                Ok(())
            }
        }
    }

    fn profile_of(&self, participant_id: ParticipantId) -> Result<ParticipantProfile, MatchError> {
        self.presence
            .identity(&participant_id)
            .map(|identity| identity.profile.clone())
            .ok_or(MatchError::NotConnected(participant_id))
    }

    fn require_admin(&self, participant_id: ParticipantId) -> Result<(), MatchError> {
        if self.presence.is_privileged(&participant_id) {
            Ok(())
        } else {
            Err(MatchError::NotPermitted)
        }
    }

    fn join_queue(&mut self, participant_id: ParticipantId) -> Result<(), MatchError> {
        let profile = self.profile_of(participant_id)?;
        let in_session = self.sessions.session_of(participant_id).is_some();
        self.queue.join(profile, in_session)?;
        self.pump_queue();
        self.broadcast_queue();
        Ok(())
    }

    fn start_bot_session(
        &mut self,
        participant_id: ParticipantId,
        difficulty: Difficulty,
    ) -> Result<(), MatchError> {
        if self.sessions.session_of(participant_id).is_some() {
            return Err(MatchError::AlreadyInSession(participant_id));
        }
        if self.queue.is_queued(&participant_id) {
            return Err(MatchError::AlreadyQueued(participant_id));
        }
        let profile = self.profile_of(participant_id)?;
        let session_id =
            self.sessions
                .create_session(profile, Challenger::Bot(difficulty), &mut self.hub)?;
        self.on_session_started(session_id);
        Ok(())
    }

    /// Resets the participant's inactivity deadline.
    fn renew(&mut self, participant_id: ParticipantId) -> Result<(), MatchError> {
        if self.sessions.session_of(participant_id).is_none() {
            return Err(MatchError::NotPaired(participant_id));
        }
        self.inactivity
            .arm(participant_id, self.config.inactivity_timeout());
        // Bot-session players are in a session but not on the roster.
        let _ = self.queue.renew(participant_id);
        Ok(())
    }

    // -- pairing and sessions ----------------------------------------------

    /// Starts sessions for as long as the matchmaker produces pairings.
    fn pump_queue(&mut self) {
        while let Some(pairing) = self.queue.try_pair() {
            let first = pairing.first.participant_id;
            match self.sessions.create_session(
                pairing.first,
                Challenger::Human(pairing.second),
                &mut self.hub,
            ) {
                Ok(session_id) => self.on_session_started(session_id),
                Err(err) => {
                    tracing::warn!(%first, error = %err, "pairing could not start a session");
                    self.queue.release(first);
                }
            }
        }
    }

    fn on_session_started(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        let record = session.new_record();
        let humans: Vec<ParticipantId> = session.humans().collect();

        self.submit_job(StoreJob::OpenRecord(record));
        for participant_id in humans {
            self.inactivity
                .arm(participant_id, self.config.inactivity_timeout());
        }
    }

    fn after_move(&mut self, session_id: SessionId, outcome: MoveOutcome) {
        match outcome {
            MoveOutcome::Continue => {}
            MoveOutcome::BotToMove => {
                let (min, max) = self.config.bot_think_range();
                let delay = jittered(&mut self.rng, min, max);
                self.bot_turns.arm(session_id, delay);
            }
            MoveOutcome::Finished(outcome) => self.finish(session_id, outcome),
        }
    }

    /// Runs the finalize sequence once per session; later calls for the
    /// same session do nothing.
    fn finish(&mut self, session_id: SessionId, outcome: Outcome) {
        let Some(finished) = self.sessions.finalize(session_id, outcome, &mut self.hub) else {
            tracing::debug!(%session_id, "session already finished");
            return;
        };

        self.bot_turns.cancel(&session_id);
        for participant_id in finished.session.humans() {
            self.inactivity.cancel(&participant_id);
        }

        self.submit_job(StoreJob::CloseRecord {
            session_id,
            update: finished.record_update(),
        });

        if finished.session.mode != SessionMode::HumanPair {
            return;
        }

        let deltas = finished.stats_deltas(self.config.win_points);
        if deltas.is_empty() {
            self.submit_job(StoreJob::RefreshLeaderboard);
        } else {
            self.submit_job(StoreJob::ApplyResult(deltas));
        }

        let mut released = false;
        for participant_id in finished.session.humans() {
            released |= self.queue.release(participant_id);
        }
        if released {
            self.pump_queue();
        }
        self.broadcast_queue();
    }

    // -- timers ------------------------------------------------------------

    fn on_inactivity(&mut self, expired: Expired<ParticipantId>) {
        if !self.inactivity.confirm(&expired) {
            return;
        }
        let participant_id = expired.key;
        tracing::info!(%participant_id, "participant inactive");

        self.hub.send(
            Recipient::All,
            ServerEvent::ParticipantMarkedInactive { participant_id },
        );
        if let Some((session_id, outcome)) =
            self.sessions.forfeit(participant_id, FinishReason::Inactivity)
        {
            self.finish(session_id, outcome);
        } else if self.queue.release(participant_id) {
            self.pump_queue();
            self.broadcast_queue();
        }
    }

    fn on_bot_turn(&mut self, expired: Expired<SessionId>) {
        if !self.bot_turns.confirm(&expired) {
            return;
        }
        let session_id = expired.key;
        match self
            .sessions
            .play_bot_turn(session_id, &mut self.rng, &self.hub)
        {
            Ok(outcome) => self.after_move(session_id, outcome),
            Err(err) => tracing::debug!(%session_id, error = %err, "bot turn skipped"),
        }
    }

    fn on_report(&mut self, report: StoreReport) {
        match report {
            StoreReport::Leaderboard(rows) => {
                self.hub.send(
                    Recipient::All,
                    ServerEvent::LeaderboardUpdated { rows: rows.clone() },
                );
                self.leaderboard = rows;
            }
            StoreReport::Accounts(total) => self.total_accounts = Some(total),
            StoreReport::History {
                requester,
                subject,
                rows,
            } => {
                if !self.hub.is_connected(&requester) {
                    tracing::debug!(%requester, "history requester gone");
                    return;
                }
                let event = match rows {
                    Ok(rows) => ServerEvent::MatchHistory {
                        participant_id: subject,
                        rows,
                    },
                    Err(_) => ServerEvent::rejected("match_history", "History is unavailable"),
                };
                self.hub.send(Recipient::Participant(requester), event);
            }
        }
    }

    fn on_admin_tick(&mut self) {
        self.submit_job(StoreJob::CountAccounts);
        if self.hub.has_admins() {
            self.hub
                .send(Recipient::Admins, ServerEvent::AdminSnapshot(self.snapshot()));
        }
    }

    // -- views -------------------------------------------------------------

    fn queue_event(&self) -> ServerEvent {
        ServerEvent::QueueSnapshotUpdated {
            queue: self.queue.snapshot(),
            queue_size: self.queue.len(),
            max_size: self.queue.max_size(),
        }
    }

    fn roster_event(&self) -> ServerEvent {
        ServerEvent::PairedRosterUpdated {
            roster: self.queue.roster(),
        }
    }

    fn broadcast_queue(&self) {
        self.hub.send(Recipient::All, self.queue_event());
        self.hub.send(Recipient::All, self.roster_event());
    }

    fn snapshot(&self) -> AdminSnapshot {
        let now = Instant::now();
        let (online_count, inactive_count) = self.presence.counts_at(now);
        AdminSnapshot {
            online_count,
            inactive_count,
            queue_size: self.queue.len(),
            total_accounts: self.total_accounts,
            online_users: self.presence.rows_at(now),
            queue: self.queue.snapshot(),
            roster: self.queue.roster(),
            active_sessions: self.sessions.len(),
        }
    }

    fn info(&self) -> LobbyInfo {
        LobbyInfo {
            connected: self.presence.len(),
            queue_size: self.queue.len(),
            roster: self
                .queue
                .roster()
                .iter()
                .map(|p| p.participant_id)
                .collect(),
            active_sessions: self.sessions.len(),
            inactivity_deadlines: self.inactivity.len(),
            pending_bot_turns: self.bot_turns.len(),
        }
    }

    fn submit_job(&self, job: StoreJob) {
        if self.jobs.send(job).is_err() {
            tracing::warn!("recorder stopped, persistence job dropped");
        }
    }
}

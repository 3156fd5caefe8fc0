//! Live sessions and the turn state machine.
//!
//! The coordinator owns every active [`Session`] and the index from
//! participant to session that enforces one session per participant.
//! It validates and applies moves, decides outcomes, and notifies session
//! observers through the [`Hub`]. It does not persist, score, or touch
//! the queue; the lobby does that with the [`FinishedSession`] that
//! [`Coordinator::finalize`] hands back.
//!
//! ```text
//!   create_session ──→ Active ──finalize──→ Finished (removed)
//!                        │  ↑
//!                        └──┘ apply_move / play_bot_turn
//! ```

use std::collections::HashMap;

use quatro_engine::{Board, BotStrategy, COLS, Difficulty, Token};
use quatro_presence::unix_millis;
use quatro_protocol::{
    FinishReason, LastMove, Opponent, ParticipantId, ParticipantProfile, Recipient,
    Seat, ServerEvent, SessionId, SessionMode,
};
use rand::Rng;

use crate::store::{MatchRecordUpdate, MatchStatus, NewMatchRecord, StatsDelta};
use crate::{Hub, MatchError};

/// Display name used for the bot seat.
pub const BOT_NAME: &str = "Bot";

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Finished,
}

/// One side of a session as shown to the other side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSide {
    pub seat: Seat,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl SessionSide {
    fn human(profile: ParticipantProfile) -> Self {
        Self {
            seat: Seat::Human(profile.participant_id),
            display_name: profile.display_name,
            avatar: profile.avatar,
        }
    }

    fn bot() -> Self {
        Self {
            seat: Seat::Bot,
            display_name: BOT_NAME.to_owned(),
            avatar: None,
        }
    }
}

/// Who takes the second seat of a new session.
#[derive(Debug, Clone)]
pub enum Challenger {
    Human(ParticipantProfile),
    Bot(Difficulty),
}

/// One game. Side 0 plays [`Token::A`] and moves first.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub mode: SessionMode,
    sides: [SessionSide; 2],
    board: Board,
    turn: Token,
    status: SessionStatus,
    started_at: u64,
    finished_at: Option<u64>,
    move_count: usize,
    last_move: Option<LastMove>,
    bot: Option<BotStrategy>,
}

impl Session {
    fn side(&self, token: Token) -> &SessionSide {
        match token {
            Token::A => &self.sides[0],
            Token::B => &self.sides[1],
        }
    }

    pub fn seat_of(&self, token: Token) -> Seat {
        self.side(token).seat
    }

    pub fn token_of(&self, seat: Seat) -> Option<Token> {
        [Token::A, Token::B]
            .into_iter()
            .find(|&token| self.seat_of(token) == seat)
    }

    /// The seat allowed to move next.
    pub fn turn_holder(&self) -> Seat {
        self.seat_of(self.turn)
    }

    /// The seat facing `seat`. Returns `seat` itself if it is not in this
    /// session, which callers rule out beforehand.
    pub fn opponent_of(&self, seat: Seat) -> Seat {
        match self.token_of(seat) {
            Some(token) => self.seat_of(token.other()),
            None => seat,
        }
    }

    /// Human participants, first mover first.
    pub fn humans(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.sides.iter().filter_map(|side| side.seat.participant())
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn move_count(&self) -> usize {
        self.move_count
    }

    pub fn last_move(&self) -> Option<LastMove> {
        self.last_move
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.bot.map(|bot| bot.difficulty())
    }

    /// The opening record persisted when the session starts.
    pub fn new_record(&self) -> NewMatchRecord {
        NewMatchRecord {
            session_id: self.id,
            mode: self.mode,
            seats: [self.sides[0].seat, self.sides[1].seat],
            difficulty: self.difficulty(),
            started_at: self.started_at,
        }
    }

    fn started_event(&self, token: Token) -> ServerEvent {
        let opponent = self.side(token.other());
        ServerEvent::SessionStarted {
            session_id: self.id,
            mode: self.mode,
            you_are: token,
            opponent: Opponent {
                seat: opponent.seat,
                display_name: opponent.display_name.clone(),
                avatar: opponent.avatar.clone(),
            },
            board: self.board,
            turn: self.turn_holder(),
            difficulty: self.difficulty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a session ended. `winner` is `None` exactly for draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Option<Seat>,
    pub reason: FinishReason,
}

impl Outcome {
    pub fn win(winner: Seat) -> Self {
        Self {
            winner: Some(winner),
            reason: FinishReason::Win,
        }
    }

    pub fn draw() -> Self {
        Self {
            winner: None,
            reason: FinishReason::Draw,
        }
    }

    /// `winner` takes the session because the other side resigned, left,
    /// or went silent.
    pub fn forfeit(winner: Seat, reason: FinishReason) -> Self {
        Self {
            winner: Some(winner),
            reason,
        }
    }

    pub fn is_draw(&self) -> bool {
        self.winner.is_none()
    }
}

/// What the caller must do after a move lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// A human is to move next.
    Continue,
    /// The bot is to move next; schedule its turn.
    BotToMove,
    /// The move ended the session; finalize with this outcome.
    Finished(Outcome),
}

/// A session removed from the active set, for persistence and scoring.
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub session: Session,
    pub outcome: Outcome,
}

impl FinishedSession {
    pub fn record_update(&self) -> MatchRecordUpdate {
        MatchRecordUpdate {
            status: MatchStatus::Finished,
            winner: self.outcome.winner,
            reason: self.outcome.reason,
            final_board: self.session.board.to_string(),
            move_count: self.session.move_count,
            started_at: self.session.started_at,
            finished_at: self.session.finished_at.unwrap_or_else(unix_millis),
        }
    }

    /// Score changes for this result. Empty for draws and for bot
    /// sessions, which never affect stats.
    pub fn stats_deltas(&self, win_points: u64) -> Vec<(ParticipantId, StatsDelta)> {
        if self.session.mode != SessionMode::HumanPair {
            return Vec::new();
        }
        let Some(winner) = self.outcome.winner else {
            return Vec::new();
        };
        let loser = self.session.opponent_of(winner);
        match (winner.participant(), loser.participant()) {
            (Some(winner), Some(loser)) => vec![
                (winner, StatsDelta::win(win_points)),
                (loser, StatsDelta::loss()),
            ],
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    sessions: HashMap<SessionId, Session>,
    /// A participant is in at most one session (key invariant).
    participant_sessions: HashMap<ParticipantId, SessionId>,
    next_id: u64,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            participant_sessions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Starts a session with `first` moving first, joins every human to
    /// the session's observer group, and sends each of them
    /// `session_started`.
    ///
    /// # Errors
    /// [`MatchError::AlreadyInSession`] if either human already plays.
    pub fn create_session(
        &mut self,
        first: ParticipantProfile,
        challenger: Challenger,
        hub: &mut Hub,
    ) -> Result<SessionId, MatchError> {
        self.ensure_free(first.participant_id)?;
        let (second, mode, bot) = match challenger {
            Challenger::Human(profile) => {
                self.ensure_free(profile.participant_id)?;
                if profile.participant_id == first.participant_id {
                    return Err(MatchError::AlreadyInSession(profile.participant_id));
                }
                (SessionSide::human(profile), SessionMode::HumanPair, None)
            }
            Challenger::Bot(difficulty) => (
                SessionSide::bot(),
                SessionMode::HumanVsBot,
                Some(BotStrategy::new(difficulty)),
            ),
        };

        let id = SessionId(self.next_id);
        self.next_id += 1;
        let session = Session {
            id,
            mode,
            sides: [SessionSide::human(first), second],
            board: Board::new(),
            turn: Token::A,
            status: SessionStatus::Active,
            started_at: unix_millis(),
            finished_at: None,
            move_count: 0,
            last_move: None,
            bot,
        };

        for token in [Token::A, Token::B] {
            if let Some(participant_id) = session.seat_of(token).participant() {
                self.participant_sessions.insert(participant_id, id);
                hub.join_group(id, participant_id);
                hub.send(
                    Recipient::Participant(participant_id),
                    session.started_event(token),
                );
            }
        }

        tracing::info!(
            session_id = %id,
            ?mode,
            first = %session.seat_of(Token::A),
            second = %session.seat_of(Token::B),
            "session started"
        );
        self.sessions.insert(id, session);
        Ok(id)
    }

    fn ensure_free(&self, participant_id: ParticipantId) -> Result<(), MatchError> {
        if self.participant_sessions.contains_key(&participant_id) {
            Err(MatchError::AlreadyInSession(participant_id))
        } else {
            Ok(())
        }
    }

    /// Applies a human move.
    ///
    /// All checks run before the board is touched, so a rejected move
    /// leaves the board and the turn exactly as they were.
    ///
    /// # Errors
    /// - [`MatchError::SessionNotFound`] if the session is not active
    /// - [`MatchError::NotInSession`] if the participant does not play in it
    /// - [`MatchError::NotYourTurn`] if it is the other side's turn
    /// - [`MatchError::InvalidColumn`] if `column` is outside `0..7`
    /// - [`MatchError::ColumnFull`] if the column has no room
    pub fn apply_move(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
        column: i64,
        hub: &Hub,
    ) -> Result<MoveOutcome, MatchError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(MatchError::SessionNotFound(session_id))?;
        let seat = Seat::Human(participant_id);
        if session.token_of(seat).is_none() {
            return Err(MatchError::NotInSession(participant_id, session_id));
        }
        if session.turn_holder() != seat {
            return Err(MatchError::NotYourTurn);
        }
        let column = usize::try_from(column)
            .ok()
            .filter(|&c| c < COLS)
            .ok_or(MatchError::InvalidColumn(column))?;

        play(session, column, hub)
    }

    /// Plays the bot's turn in a human-vs-bot session.
    ///
    /// # Errors
    /// - [`MatchError::SessionNotFound`] if the session already ended
    /// - [`MatchError::NotYourTurn`] if it is not the bot's turn
    pub fn play_bot_turn<R: Rng + ?Sized>(
        &mut self,
        session_id: SessionId,
        rng: &mut R,
        hub: &Hub,
    ) -> Result<MoveOutcome, MatchError> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(MatchError::SessionNotFound(session_id))?;
        let Some(bot) = session.bot else {
            return Err(MatchError::NotYourTurn);
        };
        if session.turn_holder() != Seat::Bot {
            return Err(MatchError::NotYourTurn);
        }

        match bot.choose_move(&session.board, session.turn, rng) {
            Some(column) => {
                tracing::debug!(%session_id, column, difficulty = %bot.difficulty(), "bot moves");
                play(session, column, hub)
            }
            // No legal column: the board is full.
            None => Ok(MoveOutcome::Finished(Outcome::draw())),
        }
    }

    /// The outcome of `participant_id` resigning.
    ///
    /// # Errors
    /// - [`MatchError::SessionNotFound`] if the session is not active
    /// - [`MatchError::NotInSession`] if the participant does not play in it
    pub fn resign(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<Outcome, MatchError> {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or(MatchError::SessionNotFound(session_id))?;
        let seat = Seat::Human(participant_id);
        if session.token_of(seat).is_none() {
            return Err(MatchError::NotInSession(participant_id, session_id));
        }
        Ok(Outcome::forfeit(session.opponent_of(seat), FinishReason::Resign))
    }

    /// The session `participant_id` forfeits by leaving or going silent,
    /// if they are in one.
    pub fn forfeit(
        &self,
        participant_id: ParticipantId,
        reason: FinishReason,
    ) -> Option<(SessionId, Outcome)> {
        let session_id = self.session_of(participant_id)?;
        let session = self.sessions.get(&session_id)?;
        let winner = session.opponent_of(Seat::Human(participant_id));
        Some((session_id, Outcome::forfeit(winner, reason)))
    }

    /// Ends a session. The first call for a session removes it, releases
    /// its participants, notifies its observers, and returns it. Every
    /// later call returns `None` and does nothing.
    pub fn finalize(
        &mut self,
        session_id: SessionId,
        outcome: Outcome,
        hub: &mut Hub,
    ) -> Option<FinishedSession> {
        let mut session = self.sessions.remove(&session_id)?;
        session.status = SessionStatus::Finished;
        session.finished_at = Some(unix_millis());

        for participant_id in session.humans() {
            self.participant_sessions.remove(&participant_id);
        }

        hub.send(
            Recipient::Session(session_id),
            ServerEvent::SessionFinished {
                session_id,
                winner: outcome.winner,
                draw: outcome.is_draw(),
                reason: outcome.reason,
                board: session.board,
            },
        );
        hub.drop_group(session_id);

        tracing::info!(
            %session_id,
            winner = ?outcome.winner,
            reason = %outcome.reason,
            moves = session.move_count,
            "session finished"
        );
        Some(FinishedSession { session, outcome })
    }

    pub fn session_of(&self, participant_id: ParticipantId) -> Option<SessionId> {
        self.participant_sessions.get(&participant_id).copied()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Drops the turn holder's token, passes the turn, broadcasts the board,
/// and reports what happens next.
fn play(session: &mut Session, column: usize, hub: &Hub) -> Result<MoveOutcome, MatchError> {
    let token = session.turn;
    let seat = session.seat_of(token);
    let row = session
        .board
        .drop_token(column, token)
        .map_err(|_| MatchError::ColumnFull(column))?;

    let last_move = LastMove {
        seat,
        token,
        row,
        column,
    };
    session.move_count += 1;
    session.last_move = Some(last_move);
    session.turn = token.other();

    hub.send(
        Recipient::Session(session.id),
        ServerEvent::BoardUpdated {
            session_id: session.id,
            board: session.board,
            turn: session.turn_holder(),
            last_move,
            move_count: session.move_count,
        },
    );

    if session.board.is_winning_drop(row, column, token) {
        return Ok(MoveOutcome::Finished(Outcome::win(seat)));
    }
    if session.board.is_full() {
        return Ok(MoveOutcome::Finished(Outcome::draw()));
    }
    if session.turn_holder() == Seat::Bot {
        Ok(MoveOutcome::BotToMove)
    } else {
        Ok(MoveOutcome::Continue)
    }
}

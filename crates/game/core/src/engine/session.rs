use crate::chess::{self, Move, Position, TerminalStatus};
use crate::clock::Clock;
use crate::config::GameConfig;
use crate::engine::{
    CommittedMove, GameRecord, GameResult, Rejection, SessionEvent, SessionSnapshot,
    SessionStatus, Step, TerminalRecord,
};
use crate::outcome::{EndReason, Outcome};
use crate::types::{Color, GameId, Participant, ParticipantId, Timestamp};

/// Longest chat message relayed between participants.
pub const MAX_CHAT_CHARS: usize = 500;

/// Activity closer than this to the last recorded sign of life is ignored,
/// so chatty connections do not produce a new version each time.
pub const ACTIVITY_RESOLUTION_MS: u64 = 1_000;

/// Errors raised when a persisted record cannot be turned back into a session.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RestoreError {
    #[error("{0:?} game has no black participant")]
    MissingOpponent(SessionStatus),

    #[error("completed game has no result")]
    MissingResult,

    #[error("game that is not completed carries a result")]
    UnexpectedResult,

    #[error("committed history has {history} plies but the clock side to move disagrees")]
    TurnMismatch { history: u32 },
}

/// The live aggregate for one game.
///
/// Every mutating operation takes the caller's notion of `now` and returns a
/// [`Step`]. A rejected step leaves the session untouched apart from a
/// lazily detected flag-fall, which completes the game first.
#[derive(Clone, Debug)]
pub struct GameSession {
    record: GameRecord,
}

impl GameSession {
    /// New game waiting for its second participant.
    pub fn new(
        game_id: GameId,
        white: Participant,
        config: GameConfig,
        created_at: Timestamp,
    ) -> Self {
        let clock = Clock::new(config.base_time_ms, config.increment_ms);
        Self {
            record: GameRecord {
                game_id,
                config,
                white,
                black: None,
                status: SessionStatus::Pending,
                position: Position::new(),
                clock,
                moves: Vec::new(),
                draw_agreed: [false; 2],
                last_seen: [Some(created_at), None],
                created_at,
                activated_at: None,
                result: None,
                version: 0,
            },
        }
    }

    /// New game with both participants present and the clock running.
    pub fn started(
        game_id: GameId,
        white: Participant,
        black: Participant,
        config: GameConfig,
        now: Timestamp,
    ) -> Self {
        let mut session = Self::new(game_id, white, config, now);
        session.activate(black, now);
        session
    }

    /// Rebuild a session from its checkpoint.
    pub fn from_record(record: GameRecord) -> Result<Self, RestoreError> {
        match record.status {
            SessionStatus::Pending => {}
            SessionStatus::Active | SessionStatus::Completed if record.black.is_none() => {
                return Err(RestoreError::MissingOpponent(record.status));
            }
            _ => {}
        }
        match (record.status, record.result.is_some()) {
            (SessionStatus::Completed, false) => return Err(RestoreError::MissingResult),
            (SessionStatus::Pending | SessionStatus::Active, true) => {
                return Err(RestoreError::UnexpectedResult);
            }
            _ => {}
        }
        if record.status == SessionStatus::Active
            && record.clock.running() != Some(record.position.turn())
        {
            return Err(RestoreError::TurnMismatch {
                history: record.plies(),
            });
        }
        Ok(Self { record })
    }

    pub fn to_record(&self) -> GameRecord {
        self.record.clone()
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn game_id(&self) -> GameId {
        self.record.game_id
    }

    pub fn status(&self) -> SessionStatus {
        self.record.status
    }

    pub fn position(&self) -> &Position {
        &self.record.position
    }

    pub fn clock(&self) -> &Clock {
        &self.record.clock
    }

    pub fn moves(&self) -> &[CommittedMove] {
        &self.record.moves
    }

    pub fn plies(&self) -> u32 {
        self.record.plies()
    }

    pub fn version(&self) -> u64 {
        self.record.version
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.record.result.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.record.status == SessionStatus::Completed
    }

    pub fn participant(&self, color: Color) -> Option<&Participant> {
        match color {
            Color::White => Some(&self.record.white),
            Color::Black => self.record.black.as_ref(),
        }
    }

    /// Seat of `id`, if seated.
    pub fn seat_of(&self, id: &ParticipantId) -> Option<Color> {
        if self.record.white.id == *id {
            Some(Color::White)
        } else if self.record.black.as_ref().is_some_and(|b| b.id == *id) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Terminal record for a completed session; `None` while play continues.
    pub fn terminal_record(&self) -> Option<TerminalRecord> {
        let record = &self.record;
        let result = record.result?;
        let black = record.black.clone()?;
        Some(TerminalRecord {
            game_id: record.game_id,
            outcome: result.outcome,
            reason: result.reason,
            white: record.white.clone(),
            black,
            final_fen: record.position.fen(),
            moves: record.moves.clone(),
            completed_at: result.completed_at,
        })
    }

    pub fn snapshot(&self, now: Timestamp) -> SessionSnapshot {
        let record = &self.record;
        let draw_offered_by = match record.draw_agreed {
            [true, false] => Some(Color::White),
            [false, true] => Some(Color::Black),
            _ => None,
        };
        SessionSnapshot {
            game_id: record.game_id,
            status: record.status,
            fen: record.position.fen(),
            turn: record.position.turn(),
            ply: record.plies(),
            clock: record.clock.elapsed(now),
            running: record.clock.running(),
            last_move: record.moves.last().map(|m| m.uci.clone()),
            draw_offered_by,
            result: record.result,
            version: record.version,
            taken_at: now,
        }
    }

    /// Seat the second participant and start white's clock.
    pub fn activate(&mut self, black: Participant, now: Timestamp) -> Step {
        if self.record.status != SessionStatus::Pending {
            return Step::rejected(match self.record.status {
                SessionStatus::Completed => Rejection::GameCompleted,
                _ => Rejection::AlreadyActive,
            });
        }
        if black.id == self.record.white.id {
            return Step::rejected(Rejection::NotAParticipant);
        }

        let record = &mut self.record;
        record.black = Some(black);
        record.status = SessionStatus::Active;
        record.activated_at = Some(now);
        record.last_seen[Color::Black.index()] = Some(now);
        record.clock = record.clock.start(record.position.turn(), now);
        record.version += 1;

        Step::accepted(vec![SessionEvent::Activated {
            fen: record.position.fen(),
            clock: record.clock.elapsed(now),
        }])
    }

    pub fn submit_move(&mut self, participant: &ParticipantId, mv: Move, now: Timestamp) -> Step {
        let mover = match self.admit(participant, now) {
            Ok(color) => color,
            Err(step) => return step,
        };
        if mover != self.record.position.turn() {
            return Step::rejected(Rejection::NotYourTurn);
        }
        let expected = self.record.plies() + 1;
        if mv.seq != expected {
            return Step::rejected(Rejection::SequenceMismatch { expected });
        }
        let successor = match chess::apply(&self.record.position, &mv) {
            Ok(successor) => successor,
            Err(reason) => return Step::rejected(Rejection::IllegalMove { reason }),
        };

        let record = &mut self.record;
        let think_time_ms = record
            .clock
            .last_tick()
            .map(|tick| now.millis_since(tick))
            .unwrap_or(0);
        record.clock = record.clock.on_move_committed(mover, now);
        record.position = successor;
        record.moves.push(CommittedMove {
            ply: expected,
            color: mover,
            uci: mv.to_uci(),
            think_time_ms,
            committed_at: now,
        });
        record.draw_agreed = [false; 2];
        record.last_seen[mover.index()] = Some(now);
        record.version += 1;

        let mut events = vec![SessionEvent::MoveCommitted {
            ply: expected,
            color: mover,
            uci: mv.to_uci(),
            fen: record.position.fen(),
            clock: record.clock.elapsed(now),
        }];

        let status = chess::terminal_status(&record.position);
        if let Some(reason) = EndReason::from_status(status) {
            let outcome = match status {
                TerminalStatus::Checkmate => Outcome::win_for(mover),
                _ => Outcome::Draw,
            };
            events.push(self.finish(outcome, reason, now));
        }
        Step::accepted(events)
    }

    pub fn resign(&mut self, participant: &ParticipantId, now: Timestamp) -> Step {
        let side = match self.admit(participant, now) {
            Ok(color) => color,
            Err(step) => return step,
        };
        let terminal = self.finish(
            Outcome::win_for(side.opposite()),
            EndReason::Resignation,
            now,
        );
        Step::accepted(vec![terminal])
    }

    /// Record this side's agreement to a draw. If the opponent already agreed,
    /// the game ends drawn.
    pub fn offer_draw(&mut self, participant: &ParticipantId, now: Timestamp) -> Step {
        let side = match self.admit(participant, now) {
            Ok(color) => color,
            Err(step) => return step,
        };
        if self.record.draw_agreed[side.index()] {
            return Step::rejected(Rejection::DrawAlreadyOffered);
        }
        self.agree_to_draw(side, now)
    }

    /// Accept the opponent's offer. With no offer pending this stands as an
    /// offer of its own, so two independent acceptances also draw.
    pub fn accept_draw(&mut self, participant: &ParticipantId, now: Timestamp) -> Step {
        let side = match self.admit(participant, now) {
            Ok(color) => color,
            Err(step) => return step,
        };
        if self.record.draw_agreed[side.index()] {
            return Step::rejected(Rejection::DrawAlreadyOffered);
        }
        self.agree_to_draw(side, now)
    }

    pub fn decline_draw(&mut self, participant: &ParticipantId, now: Timestamp) -> Step {
        let side = match self.admit(participant, now) {
            Ok(color) => color,
            Err(step) => return step,
        };
        if !self.record.draw_agreed[side.opposite().index()] {
            return Step::rejected(Rejection::NoDrawOffer);
        }
        self.record.draw_agreed = [false; 2];
        self.record.version += 1;
        Step::accepted(vec![SessionEvent::DrawDeclined { by: side }])
    }

    /// Claim the win because the opponent, who is on move, has been inactive
    /// for at least the configured abandonment window.
    pub fn claim_abandonment(&mut self, participant: &ParticipantId, now: Timestamp) -> Step {
        let claimer = match self.admit(participant, now) {
            Ok(color) => color,
            Err(step) => return step,
        };
        let absent = claimer.opposite();
        if self.record.position.turn() != absent {
            return Step::rejected(Rejection::AbandonmentNotApplicable);
        }

        let idle_since = self.idle_since(absent);
        let idle_ms = now.millis_since(idle_since);
        let window = self.record.config.abandonment_window_ms;
        if idle_ms < window {
            return Step::rejected(Rejection::AbandonmentTooEarly {
                remaining_ms: window - idle_ms,
            });
        }

        let terminal = self.finish(
            Outcome::Abandoned {
                beneficiary: claimer,
            },
            EndReason::Abandonment,
            now,
        );
        Step::accepted(vec![terminal])
    }

    /// Complete the game if the side to move has run out of time.
    pub fn check_clock(&mut self, now: Timestamp) -> Step {
        if self.record.status != SessionStatus::Active {
            return Step::default();
        }
        match self.record.clock.has_flagged(now) {
            Some(side) => {
                let terminal = self.finish(Outcome::timeout_against(side), EndReason::FlagFall, now);
                Step::accepted(vec![terminal])
            }
            None => Step::default(),
        }
    }

    pub fn chat(&mut self, participant: &ParticipantId, text: &str, now: Timestamp) -> Step {
        let Some(from) = self.seat_of(participant) else {
            return Step::rejected(Rejection::NotAParticipant);
        };
        if self.is_completed() {
            return Step::rejected(Rejection::GameCompleted);
        }
        let text = text.trim();
        if text.is_empty() {
            return Step::rejected(Rejection::EmptyMessage);
        }
        if text.chars().count() > MAX_CHAT_CHARS {
            return Step::rejected(Rejection::MessageTooLong {
                max: MAX_CHAT_CHARS,
            });
        }
        self.note_activity(from, now);
        Step::accepted(vec![SessionEvent::Chat {
            from,
            text: text.to_string(),
        }])
    }

    /// Note connection activity, which holds off abandonment claims.
    /// Returns whether the record changed.
    pub fn record_activity(&mut self, participant: &ParticipantId, now: Timestamp) -> bool {
        match self.seat_of(participant) {
            Some(side) if !self.is_completed() => self.note_activity(side, now),
            _ => false,
        }
    }

    /// Advance `side`'s last sign of life. Part of the persisted record, so
    /// it bumps the version.
    fn note_activity(&mut self, side: Color, now: Timestamp) -> bool {
        let seen = &mut self.record.last_seen[side.index()];
        let advanced = seen.is_none_or(|seen| now.millis_since(seen) >= ACTIVITY_RESOLUTION_MS);
        if advanced {
            *seen = Some(now);
            self.record.version += 1;
        }
        advanced
    }

    /// Common guard for participant operations on an active game.
    fn admit(&mut self, participant: &ParticipantId, now: Timestamp) -> Result<Color, Step> {
        let side = self
            .seat_of(participant)
            .ok_or(Step::rejected(Rejection::NotAParticipant))?;
        match self.record.status {
            SessionStatus::Active => {}
            SessionStatus::Completed => return Err(Step::rejected(Rejection::GameCompleted)),
            status => return Err(Step::rejected(Rejection::NotStarted { status })),
        }
        if let Some(flagged) = self.record.clock.has_flagged(now) {
            let terminal = self.finish(Outcome::timeout_against(flagged), EndReason::FlagFall, now);
            return Err(Step {
                rejection: Some(Rejection::Flagged { side: flagged }),
                events: vec![terminal],
            });
        }
        Ok(side)
    }

    fn agree_to_draw(&mut self, side: Color, now: Timestamp) -> Step {
        self.record.draw_agreed[side.index()] = true;
        self.record.last_seen[side.index()] = Some(now);
        self.record.version += 1;
        if self.record.draw_agreed == [true, true] {
            let terminal = self.finish(Outcome::Draw, EndReason::Agreement, now);
            Step::accepted(vec![terminal])
        } else {
            Step::accepted(vec![SessionEvent::DrawOffered { by: side }])
        }
    }

    /// Latest sign of life from `side`: its last activity or the last committed
    /// move, whichever is later.
    fn idle_since(&self, side: Color) -> Timestamp {
        let record = &self.record;
        let last_move = record
            .moves
            .last()
            .map(|m| m.committed_at)
            .or(record.activated_at)
            .unwrap_or(record.created_at);
        record.last_seen[side.index()]
            .map(|seen| seen.max(last_move))
            .unwrap_or(last_move)
    }

    fn finish(&mut self, outcome: Outcome, reason: EndReason, now: Timestamp) -> SessionEvent {
        let record = &mut self.record;
        let result = GameResult {
            outcome,
            reason,
            completed_at: now,
        };
        record.status = SessionStatus::Completed;
        record.clock = record.clock.stop(now);
        record.draw_agreed = [false; 2];
        record.result = Some(result);
        record.version += 1;
        SessionEvent::Terminal {
            result,
            final_fen: record.position.fen(),
            plies: record.plies(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::RejectReason;
    use crate::types::Address;

    const T0: Timestamp = Timestamp(1_700_000_000_000);

    fn alice() -> Participant {
        Participant::new("alice", Address([0xaa; 20]))
    }

    fn bob() -> Participant {
        Participant::new("bob", Address([0xbb; 20]))
    }

    fn session(config: GameConfig) -> GameSession {
        GameSession::started(GameId(42), alice(), bob(), config, T0)
    }

    fn mv(uci: &str, seq: u32) -> Move {
        Move::from_uci(uci, seq).unwrap()
    }

    #[test]
    fn pending_until_activated() {
        let mut game = GameSession::new(GameId(1), alice(), GameConfig::default(), T0);
        assert_eq!(game.status(), SessionStatus::Pending);
        let step = game.submit_move(&alice().id, mv("e2e4", 1), T0);
        assert_eq!(
            step.rejection,
            Some(Rejection::NotStarted {
                status: SessionStatus::Pending
            })
        );

        assert!(game.activate(bob(), T0).is_accepted());
        assert_eq!(game.status(), SessionStatus::Active);
        assert_eq!(game.activate(bob(), T0).rejection, Some(Rejection::AlreadyActive));
    }

    #[test]
    fn accepted_move_advances_position_and_clock() {
        let mut game = session(GameConfig::with_time_control(60_000, 1_000));
        let step = game.submit_move(&alice().id, mv("e2e4", 1), T0.plus_millis(2_500));
        assert!(step.is_accepted());
        assert_eq!(game.plies(), 1);
        assert_eq!(game.position().turn(), Color::Black);
        assert_eq!(game.moves()[0].think_time_ms, 2_500);
        assert_eq!(game.clock().stored_ms(Color::White), 58_500);
        assert_eq!(game.clock().running(), Some(Color::Black));
    }

    #[test]
    fn rejections_leave_state_untouched() {
        let mut game = session(GameConfig::default());
        let before = game.to_record();

        let wrong_turn = game.submit_move(&bob().id, mv("e7e5", 1), T0);
        assert_eq!(wrong_turn.rejection, Some(Rejection::NotYourTurn));

        let illegal = game.submit_move(&alice().id, mv("e2e5", 1), T0);
        assert_eq!(
            illegal.rejection,
            Some(Rejection::IllegalMove {
                reason: RejectReason::IllegalGeometry
            })
        );

        let stale = game.submit_move(&alice().id, mv("e2e4", 3), T0);
        assert_eq!(
            stale.rejection,
            Some(Rejection::SequenceMismatch { expected: 1 })
        );

        let stranger = ParticipantId::new("mallory");
        let outsider = game.submit_move(&stranger, mv("e2e4", 1), T0);
        assert_eq!(outsider.rejection, Some(Rejection::NotAParticipant));

        assert_eq!(game.to_record(), before);
    }

    #[test]
    fn duplicate_submission_for_same_ply_is_rejected() {
        let mut game = session(GameConfig::default());
        assert!(game.submit_move(&alice().id, mv("e2e4", 1), T0).is_accepted());
        let again = game.submit_move(&alice().id, mv("d2d4", 1), T0);
        assert_eq!(again.rejection, Some(Rejection::NotYourTurn));
        assert_eq!(game.plies(), 1);
    }

    #[test]
    fn flag_fall_with_no_moves_completes_game() {
        let mut game = session(GameConfig::with_time_control(60_000, 0));
        let late = T0.plus_millis(60_000);
        let step = game.submit_move(&alice().id, mv("e2e4", 1), late);

        assert_eq!(
            step.rejection,
            Some(Rejection::Flagged { side: Color::White })
        );
        let result = step.terminal().copied().unwrap();
        assert_eq!(result.outcome, Outcome::BlackTimeout);
        assert_eq!(result.outcome.winner(), Some(Color::Black));
        assert_eq!(game.status(), SessionStatus::Completed);
        assert_eq!(game.plies(), 0);
    }

    #[test]
    fn completed_game_rejects_everything() {
        let mut game = session(GameConfig::default());
        game.resign(&alice().id, T0);
        let version = game.version();

        let step = game.submit_move(&bob().id, mv("e7e5", 1), T0);
        assert_eq!(step.rejection, Some(Rejection::GameCompleted));
        assert!(step.events.is_empty());
        assert_eq!(
            game.resign(&bob().id, T0).rejection,
            Some(Rejection::GameCompleted)
        );
        assert_eq!(
            game.chat(&bob().id, "gg", T0).rejection,
            Some(Rejection::GameCompleted)
        );
        assert!(game.check_clock(T0.plus_millis(10_000_000)).events.is_empty());
        assert_eq!(game.version(), version);
    }

    #[test]
    fn resignation_awards_opponent() {
        let mut game = session(GameConfig::default());
        let step = game.resign(&bob().id, T0.plus_millis(10));
        let result = step.terminal().unwrap();
        assert_eq!(result.outcome, Outcome::WhiteWins);
        assert_eq!(result.reason, EndReason::Resignation);
    }

    #[test]
    fn checkmate_completes_game() {
        let mut game = session(GameConfig::default());
        let line = ["f2f3", "e7e5", "g2g4", "d8h4"];
        let mut last = Step::default();
        for (i, uci) in line.iter().enumerate() {
            let player = if i % 2 == 0 { alice().id } else { bob().id };
            last = game.submit_move(&player, mv(uci, i as u32 + 1), T0.plus_millis(i as u64));
            assert!(last.is_accepted());
        }
        let result = last.terminal().unwrap();
        assert_eq!(result.outcome, Outcome::BlackWins);
        assert_eq!(result.reason, EndReason::Checkmate);
    }

    #[test]
    fn both_acceptances_draw() {
        let mut game = session(GameConfig::default());
        let first = game.accept_draw(&alice().id, T0);
        assert_eq!(
            first.events,
            vec![SessionEvent::DrawOffered { by: Color::White }]
        );
        assert_eq!(
            game.accept_draw(&alice().id, T0).rejection,
            Some(Rejection::DrawAlreadyOffered)
        );
        let second = game.accept_draw(&bob().id, T0);
        let result = second.terminal().unwrap();
        assert_eq!(result.outcome, Outcome::Draw);
        assert_eq!(result.reason, EndReason::Agreement);
    }

    #[test]
    fn committed_move_withdraws_draw_offer() {
        let mut game = session(GameConfig::default());
        game.offer_draw(&alice().id, T0);
        assert_eq!(game.snapshot(T0).draw_offered_by, Some(Color::White));
        game.submit_move(&alice().id, mv("e2e4", 1), T0);
        assert_eq!(game.snapshot(T0).draw_offered_by, None);
        assert_eq!(
            game.decline_draw(&bob().id, T0).rejection,
            Some(Rejection::NoDrawOffer)
        );
    }

    #[test]
    fn decline_clears_offer() {
        let mut game = session(GameConfig::default());
        game.offer_draw(&bob().id, T0);
        let step = game.decline_draw(&alice().id, T0);
        assert_eq!(
            step.events,
            vec![SessionEvent::DrawDeclined { by: Color::White }]
        );
        assert_eq!(game.status(), SessionStatus::Active);
    }

    #[test]
    fn abandonment_requires_window_and_opponent_on_move() {
        let config = GameConfig::with_time_control(u64::MAX / 4, 0).with_abandonment_window(5_000);
        let mut game = session(config);

        assert_eq!(
            game.claim_abandonment(&alice().id, T0.plus_millis(10_000))
                .rejection,
            Some(Rejection::AbandonmentNotApplicable)
        );

        game.submit_move(&alice().id, mv("e2e4", 1), T0.plus_millis(1_000));
        assert_eq!(
            game.claim_abandonment(&alice().id, T0.plus_millis(4_000))
                .rejection,
            Some(Rejection::AbandonmentTooEarly { remaining_ms: 2_000 })
        );

        game.record_activity(&bob().id, T0.plus_millis(4_000));
        assert!(
            !game
                .claim_abandonment(&alice().id, T0.plus_millis(8_000))
                .is_accepted()
        );

        let step = game.claim_abandonment(&alice().id, T0.plus_millis(9_000));
        let result = step.terminal().unwrap();
        assert_eq!(
            result.outcome,
            Outcome::Abandoned {
                beneficiary: Color::White
            }
        );
    }

    #[test]
    fn check_clock_detects_flag_without_move() {
        let mut game = session(GameConfig::with_time_control(1_000, 0));
        assert!(game.check_clock(T0.plus_millis(500)).events.is_empty());
        let step = game.check_clock(T0.plus_millis(1_000));
        assert_eq!(step.terminal().unwrap().outcome, Outcome::BlackTimeout);
        assert_eq!(game.clock().running(), None);
    }

    #[test]
    fn chat_is_relayed_but_validated() {
        let mut game = session(GameConfig::default());
        let step = game.chat(&bob().id, "  good luck ", T0);
        assert_eq!(
            step.events,
            vec![SessionEvent::Chat {
                from: Color::Black,
                text: "good luck".to_string()
            }]
        );
        assert_eq!(
            game.chat(&bob().id, "   ", T0).rejection,
            Some(Rejection::EmptyMessage)
        );
        let long = "x".repeat(MAX_CHAT_CHARS + 1);
        assert_eq!(
            game.chat(&bob().id, &long, T0).rejection,
            Some(Rejection::MessageTooLong {
                max: MAX_CHAT_CHARS
            })
        );
    }

    #[test]
    fn activity_is_part_of_the_persisted_record() {
        let mut game = session(GameConfig::default());
        let version = game.version();

        assert!(game.record_activity(&alice().id, T0.plus_millis(5_000)));
        assert_eq!(game.version(), version + 1);
        assert_eq!(
            game.to_record().last_seen[Color::White.index()],
            Some(T0.plus_millis(5_000))
        );

        // Within the resolution nothing changes.
        assert!(!game.record_activity(&alice().id, T0.plus_millis(5_400)));
        assert_eq!(game.version(), version + 1);

        game.chat(&bob().id, "hi", T0.plus_millis(7_000));
        assert_eq!(game.version(), version + 2);

        let restored = GameSession::from_record(game.to_record()).unwrap();
        assert_eq!(restored.version(), game.version());
        assert_eq!(
            restored.to_record().last_seen,
            [Some(T0.plus_millis(5_000)), Some(T0.plus_millis(7_000))]
        );
    }

    #[test]
    fn record_round_trip_resumes_identically() {
        let mut game = session(GameConfig::default());
        game.submit_move(&alice().id, mv("e2e4", 1), T0.plus_millis(100));
        game.submit_move(&bob().id, mv("c7c5", 2), T0.plus_millis(200));

        let restored = GameSession::from_record(game.to_record()).unwrap();
        assert_eq!(
            restored.position().legal_moves(),
            game.position().legal_moves()
        );
        assert_eq!(restored.clock(), game.clock());
        assert_eq!(restored.snapshot(T0), game.snapshot(T0));
    }

    #[test]
    fn inconsistent_record_is_rejected() {
        let game = session(GameConfig::default());
        let mut record = game.to_record();
        record.black = None;
        assert_eq!(
            GameSession::from_record(record).unwrap_err(),
            RestoreError::MissingOpponent(SessionStatus::Active)
        );

        let mut record = game.to_record();
        record.status = SessionStatus::Completed;
        assert_eq!(
            GameSession::from_record(record).unwrap_err(),
            RestoreError::MissingResult
        );
    }
}

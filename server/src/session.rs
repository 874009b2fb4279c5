//! Session lifecycle controller
//!
//! Every session is owned by one `SessionActor`, a tokio task that drains a command
//! mailbox. Client requests, timer expiries and delayed steps all arrive as
//! `SessionCommand`s, so no two operations on the same session ever interleave and every
//! broadcast is built from one consistent view of the session.
//!
//! Status transitions: `waiting -> active -> (paused <-> active) -> completed`.
//! Question progression lives in the `scheduler` module, which extends the actor.

use crate::config::Timings;
use crate::content::SessionContent;
use crate::error::SessionError;
use crate::format::{effective_time_limit, hint_text, FormatRules};
use crate::game_state::{ActionOutcome, GameAction, GameState};
use crate::leaderboard;
use crate::participant::{ConnectionHandle, ConnectionId, ParticipantManager};
use crate::persistence::{self, AnswerRow, ParticipantRecord, ResultStore, SessionSummary};
use crate::registry::Registry;
use crate::scoring;
use crate::timer::{self, QuestionTimer, TimerToken};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Value;
use shared::{
    ActionKind, AnswerRecord, FinalResults, Format, GameStats, ParticipantView, Question,
    QuestionId, ServerEvent, SessionId, SessionSettings, SessionStatus, UserId,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// In-memory state of one session. Only its actor touches it.
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub format: Format,
    pub host_id: Option<UserId>,
    pub settings: SessionSettings,
    pub questions: Vec<Question>,
    /// `None` until the first question is shown
    pub current_question_index: Option<usize>,
    pub game_state: GameState,
    pub participants: ParticipantManager,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub final_results: Option<FinalResults>,
}

impl Session {
    pub fn new<R: Rng + ?Sized>(id: SessionId, content: SessionContent, rng: &mut R) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: SessionStatus::Waiting,
            game_state: GameState::for_format(&content.format, rng),
            participants: ParticipantManager::new(
                content.format.clone(),
                content.settings.max_players,
            ),
            format: content.format,
            host_id: content.host_id,
            settings: content.settings,
            questions: content.questions,
            current_question_index: None,
            created_at: now,
            started_at: None,
            ended_at: None,
            last_activity_at: now,
            final_results: None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_question_index
            .and_then(|index| self.questions.get(index))
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id.as_deref() == Some(user_id)
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Final standings. The winner is the leaderboard leader among connected
    /// participants, or among everybody when nobody is connected anymore.
    pub fn final_results(&self) -> FinalResults {
        let ranked = leaderboard::rank(self.participants.iter());
        let winner = leaderboard::rank(self.participants.connected())
            .first()
            .or_else(|| ranked.first())
            .map(|p| p.result());

        let duration_ms = match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => (ended - started).num_milliseconds().max(0) as u64,
            _ => 0,
        };

        FinalResults {
            winner,
            participants: ranked.iter().map(|p| p.result()).collect(),
            game_stats: GameStats {
                total_questions: self.total_questions(),
                questions_completed: self
                    .current_question_index
                    .map_or(0, |index| (index + 1).min(self.total_questions())),
                duration_ms,
                format: self.format.clone(),
            },
            game_state: self.game_state.snapshot(),
        }
    }
}

/// Point-in-time copy of a session, for inspection and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub host_id: Option<UserId>,
    pub current_question_index: Option<usize>,
    pub participants: Vec<ParticipantView>,
    pub game_state: Value,
    pub timer_armed: bool,
    pub final_results: Option<FinalResults>,
}

/// Everything a session actor reacts to
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        user_id: UserId,
        connection: ConnectionHandle,
    },
    Leave {
        user_id: UserId,
        connection: ConnectionHandle,
    },
    /// Transport closed underneath a participant
    Disconnected {
        user_id: UserId,
        connection_id: ConnectionId,
        reason: String,
    },
    Start {
        connection: ConnectionHandle,
    },
    Answer {
        user_id: UserId,
        connection: ConnectionHandle,
        question_id: QuestionId,
        answer: Value,
        time_taken_ms: u64,
        additional_data: Option<Value>,
    },
    Action {
        user_id: UserId,
        connection: ConnectionHandle,
        action: ActionKind,
        payload: Option<Value>,
    },
    Realtime {
        user_id: UserId,
        event_type: String,
        event_data: Value,
    },
    TimerExpired(TimerToken),
    /// Moves past question `from` (`None` shows the first question)
    Advance {
        from: Option<usize>,
    },
    Leaderboard {
        index: usize,
    },
    Finish,
    Cleanup,
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Cloneable address of a session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    mailbox: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.mailbox
            .send(command)
            .map_err(|_| SessionError::Closed(self.session_id.clone()))
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply))?;
        response
            .await
            .map_err(|_| SessionError::Closed(self.session_id.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

pub struct SessionActor {
    pub(crate) session: Session,
    pub(crate) timer: QuestionTimer,
    pub(crate) mailbox: mpsc::UnboundedSender<SessionCommand>,
    pub(crate) timings: Timings,
    /// Set once the last question is over and the end grace period is running
    pub(crate) finishing: bool,
    inbox: mpsc::UnboundedReceiver<SessionCommand>,
    store: Arc<dyn ResultStore>,
    registry: Registry,
    rng: StdRng,
}

impl SessionActor {
    /// Spawns the actor task and returns its address.
    pub fn spawn(session: Session, rng: StdRng, registry: Registry) -> SessionHandle {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            session_id: session.id.clone(),
            mailbox: mailbox.clone(),
        };

        let actor = SessionActor {
            session,
            timer: QuestionTimer::new(),
            mailbox,
            timings: registry.timings(),
            finishing: false,
            inbox,
            store: registry.store(),
            registry,
            rng,
        };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        info!(
            "Session {} ({}) is open with {} questions",
            self.session.id,
            self.session.format,
            self.session.total_questions()
        );

        while let Some(command) = self.inbox.recv().await {
            if !self.handle(command).await {
                break;
            }
        }

        self.timer.cancel();
        info!("Session {} cleaned up", self.session.id);
    }

    /// Processes one command. Returns false when the actor should stop.
    async fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Join {
                user_id,
                connection,
            } => {
                let result = self.join(&user_id, connection.clone());
                self.reply(&connection, result);
            }
            SessionCommand::Leave {
                user_id,
                connection,
            } => {
                let result = self.leave(&user_id);
                self.reply(&connection, result);
            }
            SessionCommand::Disconnected {
                user_id,
                connection_id,
                reason,
            } => self.disconnected(&user_id, connection_id, &reason),
            SessionCommand::Start { connection } => {
                let result = self.start();
                self.reply(&connection, result);
            }
            SessionCommand::Answer {
                user_id,
                connection,
                question_id,
                answer,
                time_taken_ms,
                additional_data,
            } => {
                let result =
                    self.answer(&user_id, question_id, answer, time_taken_ms, additional_data);
                self.reply(&connection, result);
            }
            SessionCommand::Action {
                user_id,
                connection,
                action,
                payload,
            } => {
                let result = self.action(&user_id, action, payload).await;
                self.reply(&connection, result);
            }
            SessionCommand::Realtime {
                user_id,
                event_type,
                event_data,
            } => self.realtime(&user_id, event_type, event_data),
            SessionCommand::TimerExpired(token) => self.on_time_up(token),
            SessionCommand::Advance { from } => self.advance(from),
            SessionCommand::Leaderboard { index } => self.send_leaderboard(index),
            SessionCommand::Finish => self.end_game().await,
            SessionCommand::Cleanup => {
                self.registry.remove(&self.session.id).await;
                return false;
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
        true
    }

    fn reply(&self, connection: &ConnectionHandle, result: Result<(), SessionError>) {
        if let Err(err) = result {
            warn!("Session {}: {}", self.session.id, err);
            connection.send(err.to_event());
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let mut participants: Vec<ParticipantView> =
            self.session.participants.iter().map(|p| p.view()).collect();
        participants.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        SessionSnapshot {
            status: self.session.status,
            host_id: self.session.host_id.clone(),
            current_question_index: self.session.current_question_index,
            participants,
            game_state: self.session.game_state.snapshot(),
            timer_armed: self.timer.is_armed(),
            final_results: self.session.final_results.clone(),
        }
    }

    pub(crate) fn broadcast(&self, event: ServerEvent) {
        self.session.participants.broadcast(&event, None);
    }

    pub(crate) fn state_sync(&self) -> ServerEvent {
        let remaining = self.timer.remaining();
        let time_remaining_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);

        ServerEvent::StateSync {
            status: self.session.status,
            current_question_index: self.session.current_question_index,
            game_state: self.session.game_state.snapshot(),
            time_remaining_secs,
            participants: self.session.participants.summaries(),
        }
    }

    fn joined_event(&self, user_id: &str) -> ServerEvent {
        ServerEvent::Joined {
            session_id: self.session.id.clone(),
            format: self.session.format.clone(),
            status: self.session.status,
            participant_count: self.session.participants.connected_count(),
            settings: self.session.settings.clone(),
            is_host: self.session.is_host(user_id),
            game_state: self.session.game_state.snapshot(),
        }
    }

    fn reconnected_event(&self, view: ParticipantView) -> ServerEvent {
        ServerEvent::Reconnected {
            session_id: self.session.id.clone(),
            participant: view,
            game_state: self.session.game_state.snapshot(),
        }
    }

    fn join(&mut self, user_id: &str, connection: ConnectionHandle) -> Result<(), SessionError> {
        if self.session.status == SessionStatus::Completed {
            self.send_final_state(user_id, &connection);
            return Ok(());
        }

        let outcome = self.session.participants.join(user_id, connection.clone())?;
        if self.session.host_id.is_none() {
            info!("{} hosts session {}", user_id, self.session.id);
            self.session.host_id = Some(user_id.to_string());
        }

        let action = if outcome.is_new {
            connection.send(self.joined_event(user_id));
            "joined"
        } else {
            if let Some(participant) = self.session.participants.get(user_id) {
                connection.send(self.reconnected_event(participant.view()));
            }
            "reconnected"
        };

        self.session.participants.broadcast(
            &ServerEvent::ParticipantUpdated {
                user_id: user_id.to_string(),
                participant_count: self.session.participants.connected_count(),
                action: action.to_string(),
            },
            Some(user_id),
        );
        connection.send(self.state_sync());
        self.session.touch();
        Ok(())
    }

    /// Read-only view of a completed session. Nothing is attached or mutated.
    fn send_final_state(&self, user_id: &str, connection: &ConnectionHandle) {
        debug!(
            "Read-only join of {} to completed session {}",
            user_id, self.session.id
        );
        let greeting = match self.session.participants.get(user_id) {
            Some(participant) => self.reconnected_event(participant.view()),
            None => self.joined_event(user_id),
        };
        connection.send(greeting);
        connection.send(self.state_sync());

        if let Some(results) = &self.session.final_results {
            connection.send(ServerEvent::Ended {
                final_results: results.clone(),
                session_id: self.session.id.clone(),
            });
        }
    }

    fn leave(&mut self, user_id: &str) -> Result<(), SessionError> {
        if !self.session.participants.leave(user_id) {
            return Err(SessionError::NotFound("Participant".to_string()));
        }

        self.broadcast(ServerEvent::ParticipantLeft {
            user_id: user_id.to_string(),
            participant_count: self.session.participants.connected_count(),
        });
        self.session.touch();
        self.check_all_answered();
        Ok(())
    }

    fn disconnected(&mut self, user_id: &str, connection_id: ConnectionId, reason: &str) {
        let disconnect =
            match self
                .session
                .participants
                .on_transport_closed(user_id, connection_id, reason)
            {
                Some(disconnect) => disconnect,
                None => return,
            };

        self.broadcast(ServerEvent::ParticipantDisconnected {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            participant_count: self.session.participants.connected_count(),
            reconnect_likely: disconnect.reconnect_likely,
        });
        self.check_all_answered();
    }

    fn start(&mut self) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::Waiting {
            return Err(SessionError::invalid("Game already started"));
        }
        if self.session.participants.connected_count() == 0 {
            return Err(SessionError::invalid("No participants connected"));
        }

        let started_at = Utc::now();
        self.session.status = SessionStatus::Active;
        self.session.started_at = Some(started_at);
        self.session.touch();

        self.broadcast(ServerEvent::Started {
            session_id: self.session.id.clone(),
            started_at,
            format: self.session.format.clone(),
            total_questions: self.session.total_questions(),
            settings: self.session.settings.clone(),
            game_state: self.session.game_state.snapshot(),
        });
        info!(
            "Session {} started with {} participants",
            self.session.id,
            self.session.participants.connected_count()
        );

        timer::schedule(
            self.timings.start_delay,
            &self.mailbox,
            SessionCommand::Advance { from: None },
        );
        Ok(())
    }

    fn answer(
        &mut self,
        user_id: &str,
        question_id: QuestionId,
        answer: Value,
        time_taken_ms: u64,
        additional_data: Option<Value>,
    ) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::Active {
            return Err(SessionError::invalid("Game is not active"));
        }
        let question = self
            .session
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| SessionError::NotFound("Question".to_string()))?;
        let index = match self.live_question() {
            Some((index, live_id)) if live_id == question_id => index,
            _ => return Err(SessionError::invalid("Question is no longer active")),
        };

        // Reported times never exceed the question's time limit.
        let limit_ms =
            u64::from(effective_time_limit(&self.session.format, &self.session.settings)) * 1000;
        let time_taken_ms = time_taken_ms.min(limit_ms);

        let evaluation = scoring::evaluate(question, &answer);
        let points = scoring::points(evaluation.is_correct, time_taken_ms, &self.session.format);
        let record = AnswerRecord {
            question_id: question_id.clone(),
            answer: answer.clone(),
            is_correct: evaluation.is_correct,
            time_taken_ms,
            points,
            submitted_at: Utc::now(),
            additional_data: additional_data.clone(),
        };

        let participant = self
            .session
            .participants
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound("Participant".to_string()))?;
        participant.record_answer(record)?;
        self.session.game_state.apply_answer(
            user_id,
            evaluation.is_correct,
            additional_data.as_ref(),
            &mut participant.format_data,
        );

        participant.send(ServerEvent::AnswerRecorded {
            question_id: question_id.clone(),
            is_correct: evaluation.is_correct,
            points,
            total_score: participant.score,
            correct_answer: evaluation.correct_answer,
            explanation: evaluation.explanation,
        });

        if self.session.format.broadcasts_answers() {
            self.session.participants.broadcast(
                &ServerEvent::ParticipantAnswered {
                    user_id: user_id.to_string(),
                    is_correct: evaluation.is_correct,
                    points,
                    time_taken_ms,
                },
                Some(user_id),
            );
        }

        persistence::spawn_record_answer(
            &self.store,
            AnswerRow {
                session_id: self.session.id.clone(),
                user_id: user_id.to_string(),
                question_id: question_id.clone(),
                answer,
                is_correct: evaluation.is_correct,
                time_taken_ms,
                points,
                additional_data,
            },
        );
        self.session.touch();

        if self.session.format.is_time_based()
            && !self.session.participants.all_answered(&question_id)
        {
            timer::schedule(
                self.timings.leaderboard_delay,
                &self.mailbox,
                SessionCommand::Leaderboard { index },
            );
        }
        self.check_all_answered();
        Ok(())
    }

    async fn action(
        &mut self,
        user_id: &str,
        action: ActionKind,
        payload: Option<Value>,
    ) -> Result<(), SessionError> {
        let host_only = matches!(
            action,
            ActionKind::Pause | ActionKind::Resume | ActionKind::SkipQuestion | ActionKind::EndGame
        );
        if host_only && !self.session.is_host(user_id) {
            debug!(
                "Ignoring {:?} from non-host {} in session {}",
                action, user_id, self.session.id
            );
            return Ok(());
        }

        match action {
            ActionKind::Pause => self.pause(),
            ActionKind::Resume => self.resume(),
            ActionKind::SkipQuestion => self.skip(),
            ActionKind::EndGame => {
                self.end_game().await;
                Ok(())
            }
            ActionKind::HintRequest => self.hint(user_id, payload.as_ref()),
            ActionKind::GameSpecific => self.game_specific(user_id, payload.as_ref()),
            ActionKind::Unknown(name) => Err(SessionError::Unsupported(name)),
        }
    }

    fn pause(&mut self) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::Active {
            return Err(SessionError::invalid("Game is not active"));
        }

        self.timer.cancel();
        self.session.status = SessionStatus::Paused;
        self.broadcast(ServerEvent::Paused {
            timestamp: Utc::now(),
        });
        info!("Session {} paused", self.session.id);
        Ok(())
    }

    /// Resuming grants the live question a full fresh time window.
    fn resume(&mut self) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::Paused {
            return Err(SessionError::invalid("Game is not paused"));
        }

        self.session.status = SessionStatus::Active;
        self.broadcast(ServerEvent::Resumed {
            timestamp: Utc::now(),
        });
        info!("Session {} resumed", self.session.id);

        if self.finishing {
            return Ok(());
        }
        match self.session.current_question_index {
            None => self.advance(None),
            Some(index) => {
                self.arm_timer(index);
                self.check_all_answered();
            }
        }
        Ok(())
    }

    fn skip(&mut self) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::Active {
            return Err(SessionError::invalid("Game is not active"));
        }
        info!("Host skipped a question in session {}", self.session.id);
        self.advance(self.session.current_question_index);
        Ok(())
    }

    fn hint(&mut self, user_id: &str, payload: Option<&Value>) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::Active {
            return Err(SessionError::invalid("Game is not active"));
        }

        let cost = self.session.format.hint_cost();
        let participant = self
            .session
            .participants
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound("Participant".to_string()))?;
        participant.charge_hint(cost);
        self.session.game_state.record_hint();

        let word_length = payload
            .and_then(|payload| payload.get("wordLength"))
            .and_then(Value::as_u64);
        let hint = hint_text(
            &self.session.format,
            self.session.current_question(),
            word_length,
        );

        self.broadcast(ServerEvent::HintProvided {
            user_id: user_id.to_string(),
            hint,
            cost,
        });
        Ok(())
    }

    fn game_specific(&mut self, user_id: &str, payload: Option<&Value>) -> Result<(), SessionError> {
        if self.session.status == SessionStatus::Completed {
            return Err(SessionError::invalid("Game has ended"));
        }

        let action = GameAction::parse(payload)?;
        let participant = self
            .session
            .participants
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound("Participant".to_string()))?;
        let outcome = self.session.game_state.apply_action(
            user_id,
            action,
            &mut participant.format_data,
            &mut self.rng,
        );

        let user_id = user_id.to_string();
        let event = match outcome {
            ActionOutcome::CardSelected {
                card_id,
                current_speaker,
            } => ServerEvent::CardSelected {
                user_id,
                card_id,
                current_speaker,
            },
            ActionOutcome::BusinessUpdated { ledger, effect } => ServerEvent::BusinessUpdated {
                user_id,
                ledger: serde_json::to_value(&ledger).unwrap_or(Value::Null),
                money_change: effect.money_change,
                reputation_change: effect.reputation_change,
            },
            ActionOutcome::DiceRolled { roll } => ServerEvent::DiceRolled { user_id, roll },
            ActionOutcome::Performed { action, data } => ServerEvent::ActionPerformed {
                user_id,
                action,
                data,
            },
        };
        self.broadcast(event);
        self.session.touch();
        Ok(())
    }

    fn realtime(&mut self, user_id: &str, event_type: String, event_data: Value) {
        if !self.session.participants.contains(user_id) {
            debug!(
                "Dropping realtime event from non-participant {} in session {}",
                user_id, self.session.id
            );
            return;
        }

        self.session.participants.broadcast(
            &ServerEvent::RealtimeEvent {
                user_id: user_id.to_string(),
                event_type,
                event_data,
                timestamp: Utc::now(),
            },
            Some(user_id),
        );
    }

    /// Completes the session. Runs at most once, whether reached by exhausting the
    /// questions or by the host.
    pub(crate) async fn end_game(&mut self) {
        if self.session.status == SessionStatus::Completed {
            return;
        }

        self.timer.cancel();
        self.finishing = false;
        let ended_at = Utc::now();
        self.session.status = SessionStatus::Completed;
        self.session.ended_at = Some(ended_at);

        let final_results = self.session.final_results();
        self.session.final_results = Some(final_results.clone());
        self.broadcast(ServerEvent::Ended {
            final_results: final_results.clone(),
            session_id: self.session.id.clone(),
        });
        info!(
            "Session {} ended, winner: {}",
            self.session.id,
            final_results
                .winner
                .as_ref()
                .map_or("nobody", |winner| winner.user_id.as_str())
        );

        let records: Vec<ParticipantRecord> = leaderboard::rank(self.session.participants.iter())
            .into_iter()
            .map(|p| ParticipantRecord {
                session_id: self.session.id.clone(),
                user_id: p.user_id.clone(),
                final_score: p.score,
                final_accuracy: p.accuracy,
                total_time_ms: p.total_time_ms,
                answers: p.answers.clone(),
                format_data: p.format_data.snapshot(),
            })
            .collect();
        let summary = SessionSummary {
            session_id: self.session.id.clone(),
            status: SessionStatus::Completed,
            ended_at,
            final_results,
        };
        if let Err(e) = persistence::save_results(Arc::clone(&self.store), summary, records).await
        {
            error!("Failed to save results of session {}: {}", self.session.id, e);
        }

        timer::schedule(
            self.timings.cleanup_delay,
            &self.mailbox,
            SessionCommand::Cleanup,
        );
    }
}

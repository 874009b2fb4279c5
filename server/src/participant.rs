//! Participant connection management for a single session
//!
//! This module handles the server-side bookkeeping of everybody who ever joined a session:
//! - Join and reconnection (a returning user keeps score, answers and format data)
//! - Explicit leaves and transport-level disconnects
//! - Per-connection outboxes used to deliver events
//! - Capacity enforcement against the session's `max_players` setting
//!
//! Participants are never removed while the session lives; a disconnected participant
//! simply stops receiving events and is left out of leaderboards until they return.

use crate::config::RECONNECT_LIKELY_LIMIT;
use crate::error::SessionError;
use crate::game_state::FormatData;
use chrono::{DateTime, Utc};
use log::{debug, info};
use shared::{
    AnswerRecord, Format, ParticipantResult, ParticipantSummary, ParticipantView, ServerEvent,
    UserId,
};
use std::collections::HashMap;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

/// Outbound side of one client connection.
///
/// The transport adapter owns the receiving end and drains it to the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { id, sender }
    }

    /// Queues an event; returns false once the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// One user's state within a session
#[derive(Debug)]
pub struct Participant {
    pub user_id: UserId,
    pub connection: ConnectionHandle,
    pub is_connected: bool,
    pub score: u32,
    /// Ratio of correct answers in `[0, 1]`
    pub accuracy: f64,
    pub total_time_ms: u64,
    pub answers: Vec<AnswerRecord>,
    pub format_data: FormatData,
    pub hints_used: u32,
    pub reconnect_attempt_count: u32,
    pub joined_at: DateTime<Utc>,
    pub reconnected_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(user_id: UserId, connection: ConnectionHandle, format: &Format) -> Self {
        Self {
            user_id,
            connection,
            is_connected: true,
            score: 0,
            accuracy: 0.0,
            total_time_ms: 0,
            answers: Vec::new(),
            format_data: FormatData::for_format(format),
            hints_used: 0,
            reconnect_attempt_count: 0,
            joined_at: Utc::now(),
            reconnected_at: None,
            left_at: None,
            disconnected_at: None,
        }
    }

    pub fn has_answered(&self, question_id: &str) -> bool {
        self.answers.iter().any(|a| a.question_id == question_id)
    }

    /// Appends an answer and updates score, time and accuracy
    ///
    /// Refuses a second answer for the same question, which keeps the answer list
    /// unique per question no matter how often a client resubmits.
    pub fn record_answer(&mut self, answer: AnswerRecord) -> Result<(), SessionError> {
        if self.has_answered(&answer.question_id) {
            return Err(SessionError::invalid(
                "Answer already submitted for this question",
            ));
        }

        self.score += answer.points;
        self.total_time_ms = self.total_time_ms.saturating_add(answer.time_taken_ms);
        self.answers.push(answer);

        let correct = self.answers.iter().filter(|a| a.is_correct).count();
        self.accuracy = correct as f64 / self.answers.len() as f64;
        Ok(())
    }

    /// Deducts a hint's cost, never going below zero. Returns the amount deducted.
    pub fn charge_hint(&mut self, cost: u32) -> u32 {
        let charged = cost.min(self.score);
        self.score -= charged;
        self.hints_used += 1;
        charged
    }

    pub fn send(&self, event: ServerEvent) {
        if self.is_connected && !self.connection.send(event) {
            debug!("Outbox for {} is closed", self.user_id);
        }
    }

    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            user_id: self.user_id.clone(),
            score: self.score,
            is_connected: self.is_connected,
            accuracy: self.accuracy,
            answers: self.answers.len(),
            format_data: self.format_data.snapshot(),
        }
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            user_id: self.user_id.clone(),
            score: self.score,
            accuracy: self.accuracy,
            total_time_ms: self.total_time_ms,
            answers: self.answers.clone(),
            format_data: self.format_data.snapshot(),
            is_connected: self.is_connected,
            hints_used: self.hints_used,
            reconnect_attempt_count: self.reconnect_attempt_count,
        }
    }

    pub fn result(&self) -> ParticipantResult {
        ParticipantResult {
            user_id: self.user_id.clone(),
            final_score: self.score,
            accuracy: self.accuracy,
            total_time_ms: self.total_time_ms,
            answer_count: self.answers.len(),
            format_data: self.format_data.snapshot(),
        }
    }
}

/// Outcome of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// False when an existing participant came back
    pub is_new: bool,
}

/// Outcome of a transport-level disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    pub attempts: u32,
    /// Informational only; reconnecting is always allowed
    pub reconnect_likely: bool,
}

/// Everybody who joined one session, keyed by user ID
pub struct ParticipantManager {
    participants: HashMap<UserId, Participant>,
    max_participants: Option<usize>,
    format: Format,
}

impl ParticipantManager {
    pub fn new(format: Format, max_participants: Option<usize>) -> Self {
        Self {
            participants: HashMap::new(),
            max_participants,
            format,
        }
    }

    /// Adds a participant or reattaches a returning one
    ///
    /// Returning users get their new connection, are marked connected and have their
    /// reconnect counter reset. New users get zeroed scores and fresh format data; they
    /// are refused once the session holds `max_participants` people.
    pub fn join(
        &mut self,
        user_id: &str,
        connection: ConnectionHandle,
    ) -> Result<JoinOutcome, SessionError> {
        if let Some(participant) = self.participants.get_mut(user_id) {
            participant.connection = connection;
            participant.is_connected = true;
            participant.reconnect_attempt_count = 0;
            participant.reconnected_at = Some(Utc::now());
            info!("Participant {} reconnected", user_id);
            return Ok(JoinOutcome { is_new: false });
        }

        if let Some(max) = self.max_participants {
            if self.participants.len() >= max {
                return Err(SessionError::Full(user_id.to_string()));
            }
        }

        let participant = Participant::new(user_id.to_string(), connection, &self.format);
        info!("Participant {} joined", user_id);
        self.participants.insert(user_id.to_string(), participant);
        Ok(JoinOutcome { is_new: true })
    }

    /// Marks a participant as gone without forgetting anything about them.
    pub fn leave(&mut self, user_id: &str) -> bool {
        match self.participants.get_mut(user_id) {
            Some(participant) => {
                participant.is_connected = false;
                participant.left_at = Some(Utc::now());
                info!("Participant {} left", user_id);
                true
            }
            None => false,
        }
    }

    /// Handles a closed transport
    ///
    /// Ignored when the participant has since reconnected on a different connection.
    pub fn on_transport_closed(
        &mut self,
        user_id: &str,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Option<Disconnect> {
        let participant = self.participants.get_mut(user_id)?;
        if participant.connection.id != connection_id {
            debug!(
                "Stale disconnect for {} on connection {}",
                user_id, connection_id
            );
            return None;
        }

        let attempts_before = participant.reconnect_attempt_count;
        participant.is_connected = false;
        participant.disconnected_at = Some(Utc::now());
        participant.reconnect_attempt_count += 1;
        info!(
            "Participant {} disconnected ({}), attempt {}",
            user_id, reason, participant.reconnect_attempt_count
        );

        Some(Disconnect {
            attempts: participant.reconnect_attempt_count,
            reconnect_likely: attempts_before < RECONNECT_LIKELY_LIMIT,
        })
    }

    pub fn get(&self, user_id: &str) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.get_mut(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.participants.contains_key(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn connected(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values().filter(|p| p.is_connected)
    }

    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    /// True when at least one participant is connected and all connected ones answered.
    pub fn all_answered(&self, question_id: &str) -> bool {
        let mut connected = self.connected().peekable();
        connected.peek().is_some() && connected.all(|p| p.has_answered(question_id))
    }

    /// Sends an event to every connected participant, optionally skipping one.
    pub fn broadcast(&self, event: &ServerEvent, exclude: Option<&str>) {
        for participant in self.connected() {
            if Some(participant.user_id.as_str()) == exclude {
                continue;
            }
            participant.send(event.clone());
        }
    }

    /// Summaries in user-ID order.
    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        let mut summaries: Vec<ParticipantSummary> =
            self.participants.values().map(Participant::summary).collect();
        summaries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

//! Wire vocabulary shared by the session server and its clients.
//!
//! Every message travels as one JSON text frame shaped `{"event": ..., "data": {...}}`.
//! Game-state and per-participant format payloads are carried as opaque JSON snapshots so
//! the server's state machine can evolve without breaking clients.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type SessionId = String;
pub type UserId = String;
pub type QuestionId = String;

/// JSON snapshot of a session's format-specific state.
pub type GameStateSnapshot = Value;

/// Game mechanic a session runs under.
///
/// Unknown format names are preserved in `Other` so a session can still run with the
/// generic mechanics and default constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Format {
    TriviaLightning,
    ColorMatch,
    MemoryFlip,
    NumberLineRace,
    BoardRace,
    EscapeRoomMini,
    AdvancedEscapeRoom,
    StoryPath,
    DebateCards,
    SimulationTycoon,
    Crossword,
    WordSearch,
    WordSearchDuel,
    TimedEquationDuel,
    CodingPuzzle,
    HangmanVisual,
    Other(String),
}

impl Format {
    pub fn as_str(&self) -> &str {
        match self {
            Format::TriviaLightning => "trivia_lightning",
            Format::ColorMatch => "color_match",
            Format::MemoryFlip => "memory_flip",
            Format::NumberLineRace => "number_line_race",
            Format::BoardRace => "board_race",
            Format::EscapeRoomMini => "escape_room_mini",
            Format::AdvancedEscapeRoom => "advanced_escape_room",
            Format::StoryPath => "story_path",
            Format::DebateCards => "debate_cards",
            Format::SimulationTycoon => "simulation_tycoon",
            Format::Crossword => "crossword",
            Format::WordSearch => "word_search",
            Format::WordSearchDuel => "word_search_duel",
            Format::TimedEquationDuel => "timed_equation_duel",
            Format::CodingPuzzle => "coding_puzzle",
            Format::HangmanVisual => "hangman_visual",
            Format::Other(name) => name,
        }
    }
}

impl From<String> for Format {
    fn from(name: String) -> Self {
        match name.as_str() {
            "trivia_lightning" => Format::TriviaLightning,
            "color_match" => Format::ColorMatch,
            "memory_flip" => Format::MemoryFlip,
            "number_line_race" => Format::NumberLineRace,
            "board_race" => Format::BoardRace,
            "escape_room_mini" => Format::EscapeRoomMini,
            "advanced_escape_room" => Format::AdvancedEscapeRoom,
            "story_path" => Format::StoryPath,
            "debate_cards" => Format::DebateCards,
            "simulation_tycoon" => Format::SimulationTycoon,
            "crossword" => Format::Crossword,
            "word_search" => Format::WordSearch,
            "word_search_duel" => Format::WordSearchDuel,
            "timed_equation_duel" => Format::TimedEquationDuel,
            "coding_puzzle" => Format::CodingPuzzle,
            "hangman_visual" => Format::HangmanVisual,
            _ => Format::Other(name),
        }
    }
}

impl From<&str> for Format {
    fn from(name: &str) -> Self {
        Format::from(name.to_string())
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.as_str().to_string()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Paused,
    Completed,
}

/// Host-provided knobs. Unset fields fall back to the format's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub max_players: Option<usize>,
    pub time_limit_secs: Option<u32>,
    pub auto_advance: Option<bool>,
}

/// A question as supplied by the content provider. Never sent to clients as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub stem: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: Value,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    /// The client-facing part of the question, without the answer key.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            stem: self.stem.clone(),
            options: self.options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: QuestionId,
    pub stem: String,
    pub options: Vec<String>,
}

/// One submitted answer. Immutable once appended to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub answer: Value,
    pub is_correct: bool,
    pub time_taken_ms: u64,
    pub points: u32,
    pub submitted_at: DateTime<Utc>,
    pub additional_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Pause,
    Resume,
    SkipQuestion,
    EndGame,
    HintRequest,
    GameSpecific,
    Unknown(String),
}

impl From<String> for ActionKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "pause" => ActionKind::Pause,
            "resume" => ActionKind::Resume,
            "skip_question" => ActionKind::SkipQuestion,
            "end_game" => ActionKind::EndGame,
            "hint_request" => ActionKind::HintRequest,
            "game_specific" => ActionKind::GameSpecific,
            _ => ActionKind::Unknown(name),
        }
    }
}

impl From<ActionKind> for String {
    fn from(action: ActionKind) -> Self {
        match action {
            ActionKind::Pause => "pause".to_string(),
            ActionKind::Resume => "resume".to_string(),
            ActionKind::SkipQuestion => "skip_question".to_string(),
            ActionKind::EndGame => "end_game".to_string(),
            ActionKind::HintRequest => "hint_request".to_string(),
            ActionKind::GameSpecific => "game_specific".to_string(),
            ActionKind::Unknown(name) => name,
        }
    }
}

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Join {
        session_id: SessionId,
        user_id: UserId,
    },
    Leave {
        session_id: SessionId,
        user_id: UserId,
    },
    Start {
        session_id: SessionId,
    },
    Answer {
        session_id: SessionId,
        question_id: QuestionId,
        answer: Value,
        time_taken_ms: u64,
        #[serde(default)]
        additional_data: Option<Value>,
    },
    Action {
        session_id: SessionId,
        action: ActionKind,
        #[serde(default)]
        payload: Option<Value>,
    },
    Realtime {
        session_id: SessionId,
        event_type: String,
        #[serde(default)]
        event_data: Value,
    },
}

/// Compact per-participant view used in state syncs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub user_id: UserId,
    pub score: u32,
    pub is_connected: bool,
    pub accuracy: f64,
    pub answers: usize,
    pub format_data: Value,
}

/// Full participant view sent back on reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_id: UserId,
    pub score: u32,
    pub accuracy: f64,
    pub total_time_ms: u64,
    pub answers: Vec<AnswerRecord>,
    pub format_data: Value,
    pub is_connected: bool,
    pub hints_used: u32,
    pub reconnect_attempt_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: UserId,
    pub score: u32,
    pub accuracy_percent: u32,
    pub answer_count: usize,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    pub user_id: UserId,
    pub final_score: u32,
    pub accuracy: f64,
    pub total_time_ms: u64,
    pub answer_count: usize,
    pub format_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total_questions: usize,
    pub questions_completed: usize,
    pub duration_ms: u64,
    pub format: Format,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResults {
    pub winner: Option<ParticipantResult>,
    pub participants: Vec<ParticipantResult>,
    pub game_stats: GameStats,
    pub game_state: GameStateSnapshot,
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Joined {
        session_id: SessionId,
        format: Format,
        status: SessionStatus,
        participant_count: usize,
        settings: SessionSettings,
        is_host: bool,
        game_state: GameStateSnapshot,
    },
    Reconnected {
        session_id: SessionId,
        participant: ParticipantView,
        game_state: GameStateSnapshot,
    },
    ParticipantUpdated {
        user_id: UserId,
        participant_count: usize,
        action: String,
    },
    ParticipantLeft {
        user_id: UserId,
        participant_count: usize,
    },
    ParticipantDisconnected {
        user_id: UserId,
        reason: String,
        participant_count: usize,
        reconnect_likely: bool,
    },
    StateSync {
        status: SessionStatus,
        current_question_index: Option<usize>,
        game_state: GameStateSnapshot,
        time_remaining_secs: u64,
        participants: Vec<ParticipantSummary>,
    },
    Started {
        session_id: SessionId,
        started_at: DateTime<Utc>,
        format: Format,
        total_questions: usize,
        settings: SessionSettings,
        game_state: GameStateSnapshot,
    },
    Question {
        question: QuestionView,
        question_number: usize,
        total_questions: usize,
        time_limit_secs: u32,
        game_state: GameStateSnapshot,
    },
    AnswerRecorded {
        question_id: QuestionId,
        is_correct: bool,
        points: u32,
        total_score: u32,
        correct_answer: Value,
        explanation: Option<String>,
    },
    ParticipantAnswered {
        user_id: UserId,
        is_correct: bool,
        points: u32,
        time_taken_ms: u64,
    },
    Leaderboard {
        participants: Vec<LeaderboardEntry>,
        question_number: usize,
        total_questions: usize,
    },
    TimeUp {
        question_number: usize,
    },
    Paused {
        timestamp: DateTime<Utc>,
    },
    Resumed {
        timestamp: DateTime<Utc>,
    },
    HintProvided {
        user_id: UserId,
        hint: String,
        cost: u32,
    },
    CardSelected {
        user_id: UserId,
        card_id: String,
        current_speaker: Option<UserId>,
    },
    BusinessUpdated {
        user_id: UserId,
        ledger: Value,
        money_change: i64,
        reputation_change: i64,
    },
    DiceRolled {
        user_id: UserId,
        roll: u32,
    },
    ActionPerformed {
        user_id: UserId,
        action: String,
        data: Value,
    },
    RealtimeEvent {
        user_id: UserId,
        event_type: String,
        event_data: Value,
        timestamp: DateTime<Utc>,
    },
    Ended {
        final_results: FinalResults,
        session_id: SessionId,
    },
    Error {
        message: String,
    },
    Warning {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        ServerEvent::Warning {
            message: message.into(),
        }
    }

    /// Wire name of the event, e.g. `answer_recorded`.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Joined { .. } => "joined",
            ServerEvent::Reconnected { .. } => "reconnected",
            ServerEvent::ParticipantUpdated { .. } => "participant_updated",
            ServerEvent::ParticipantLeft { .. } => "participant_left",
            ServerEvent::ParticipantDisconnected { .. } => "participant_disconnected",
            ServerEvent::StateSync { .. } => "state_sync",
            ServerEvent::Started { .. } => "started",
            ServerEvent::Question { .. } => "question",
            ServerEvent::AnswerRecorded { .. } => "answer_recorded",
            ServerEvent::ParticipantAnswered { .. } => "participant_answered",
            ServerEvent::Leaderboard { .. } => "leaderboard",
            ServerEvent::TimeUp { .. } => "time_up",
            ServerEvent::Paused { .. } => "paused",
            ServerEvent::Resumed { .. } => "resumed",
            ServerEvent::HintProvided { .. } => "hint_provided",
            ServerEvent::CardSelected { .. } => "card_selected",
            ServerEvent::BusinessUpdated { .. } => "business_updated",
            ServerEvent::DiceRolled { .. } => "dice_rolled",
            ServerEvent::ActionPerformed { .. } => "action_performed",
            ServerEvent::RealtimeEvent { .. } => "realtime_event",
            ServerEvent::Ended { .. } => "ended",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Warning { .. } => "warning",
        }
    }
}

/// Encodes an event as one text frame.
pub fn encode<T: Serialize>(event: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Decodes one text frame.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(frame)
}

//! Content provider: where a session's format, host and questions come from.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use shared::{Format, Question, SessionId, SessionSettings, UserId};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Everything needed to create a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContent {
    pub format: Format,
    #[serde(default)]
    pub host_id: Option<UserId>,
    #[serde(default)]
    pub settings: SessionSettings,
    pub questions: Vec<Question>,
}

pub trait ContentProvider: Send + Sync {
    /// Loads the content of a session, or `NotFound` when the session does not exist.
    fn load(&self, session_id: &str) -> Result<SessionContent, SessionError>;
}

/// In-memory catalog keyed by session ID.
#[derive(Debug, Default, Clone)]
pub struct StaticContent {
    sessions: HashMap<SessionId, SessionContent>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: &str, content: SessionContent) -> Self {
        self.insert(session_id, content);
        self
    }

    pub fn insert(&mut self, session_id: &str, content: SessionContent) {
        self.sessions.insert(session_id.to_string(), content);
    }

    /// Parses a catalog shaped `{"<sessionId>": {format, hostId, settings, questions}}`.
    pub fn from_json_str(json: &str) -> Result<Self, SessionError> {
        let sessions: HashMap<SessionId, SessionContent> =
            serde_json::from_str(json).map_err(|e| SessionError::Content(e.to_string()))?;
        Ok(Self { sessions })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| SessionError::Content(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl ContentProvider for StaticContent {
    fn load(&self, session_id: &str) -> Result<SessionContent, SessionError> {
        self.sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound("Session".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CATALOG: &str = r#"{
        "s1": {
            "format": "trivia_lightning",
            "hostId": "host1",
            "settings": {"maxPlayers": 30},
            "questions": [
                {"id": "q1", "stem": "2 + 2?", "options": ["3", "4"], "correctAnswer": "4"}
            ]
        },
        "s2": {
            "format": "crossword",
            "questions": []
        }
    }"#;

    #[test]
    fn test_catalog_parsing() {
        let content = StaticContent::from_json_str(CATALOG).unwrap();
        assert_eq!(content.len(), 2);

        let s1 = content.load("s1").unwrap();
        assert_eq!(s1.format, Format::TriviaLightning);
        assert_eq!(s1.host_id.as_deref(), Some("host1"));
        assert_eq!(s1.settings.max_players, Some(30));
        assert_eq!(s1.questions[0].correct_answer, json!("4"));
        assert!(s1.questions[0].explanation.is_none());

        let s2 = content.load("s2").unwrap();
        assert!(s2.host_id.is_none());
        assert_eq!(s2.settings, SessionSettings::default());
    }

    #[test]
    fn test_unknown_session() {
        let content = StaticContent::new();
        assert_eq!(
            content.load("nope"),
            Err(SessionError::NotFound("Session".to_string()))
        );
    }

    #[test]
    fn test_malformed_catalog() {
        assert!(matches!(
            StaticContent::from_json_str("[1, 2]"),
            Err(SessionError::Content(_))
        ));
    }
}

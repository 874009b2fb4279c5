//! Result store: where answers and final results are written.
//!
//! Stores are synchronous; the session actor calls them through `spawn_blocking` so a slow
//! disk never stalls event processing. Every write is best effort: failures are logged by
//! the caller and never reach clients.

use log::error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use shared::{AnswerRecord, FinalResults, QuestionId, SessionId, SessionStatus, UserId};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One submitted answer, written as soon as it is scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRow {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub answer: Value,
    pub is_correct: bool,
    pub time_taken_ms: u64,
    pub points: u32,
    pub additional_data: Option<Value>,
}

/// Final standing of one participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub final_score: u32,
    pub final_accuracy: f64,
    pub total_time_ms: u64,
    pub answers: Vec<AnswerRecord>,
    pub format_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub ended_at: DateTime<Utc>,
    pub final_results: FinalResults,
}

pub trait ResultStore: Send + Sync + 'static {
    fn record_answer(&self, row: &AnswerRow) -> Result<(), StoreError>;

    fn save_results(
        &self,
        summary: &SessionSummary,
        participants: &[ParticipantRecord],
    ) -> Result<(), StoreError>;
}

/// Writes one answer row in the background, logging failures.
pub fn spawn_record_answer(store: &Arc<dyn ResultStore>, row: AnswerRow) {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = store.record_answer(&row) {
            error!(
                "Failed to record answer of {} in session {}: {}",
                row.user_id, row.session_id, e
            );
        }
    });
}

/// Writes the final results on the blocking pool and waits for completion.
pub async fn save_results(
    store: Arc<dyn ResultStore>,
    summary: SessionSummary,
    participants: Vec<ParticipantRecord>,
) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || store.save_results(&summary, &participants))
        .await
        .map_err(|e| StoreError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?
}

/// In-memory store. Clones share the same buffers.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    answers: Arc<Mutex<Vec<AnswerRow>>>,
    summaries: Arc<Mutex<Vec<SessionSummary>>>,
    participants: Arc<Mutex<Vec<ParticipantRecord>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answers(&self) -> Vec<AnswerRow> {
        locked(&self.answers).clone()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        locked(&self.summaries).clone()
    }

    pub fn participants(&self) -> Vec<ParticipantRecord> {
        locked(&self.participants).clone()
    }
}

impl ResultStore for MemoryStore {
    fn record_answer(&self, row: &AnswerRow) -> Result<(), StoreError> {
        locked(&self.answers).push(row.clone());
        Ok(())
    }

    fn save_results(
        &self,
        summary: &SessionSummary,
        participants: &[ParticipantRecord],
    ) -> Result<(), StoreError> {
        locked(&self.summaries).push(summary.clone());
        locked(&self.participants).extend_from_slice(participants);
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Line<'a> {
    Answer(&'a AnswerRow),
    Summary(&'a SessionSummary),
    Participant(&'a ParticipantRecord),
}

/// Appends every record as one JSON line to a file.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, lines: &[Line<'_>]) -> Result<(), StoreError> {
        let mut buffer = String::new();
        for line in lines {
            buffer.push_str(&serde_json::to_string(line)?);
            buffer.push('\n');
        }

        let _guard = locked(&self.write_lock);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl ResultStore for JsonLinesStore {
    fn record_answer(&self, row: &AnswerRow) -> Result<(), StoreError> {
        self.append(&[Line::Answer(row)])
    }

    fn save_results(
        &self,
        summary: &SessionSummary,
        participants: &[ParticipantRecord],
    ) -> Result<(), StoreError> {
        let mut lines = Vec::with_capacity(participants.len() + 1);
        lines.push(Line::Summary(summary));
        lines.extend(participants.iter().map(Line::Participant));
        self.append(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::{Format, GameStats};

    fn row(user_id: &str) -> AnswerRow {
        AnswerRow {
            session_id: "s1".to_string(),
            user_id: user_id.to_string(),
            question_id: "q1".to_string(),
            answer: json!("4"),
            is_correct: true,
            time_taken_ms: 5_000,
            points: 150,
            additional_data: None,
        }
    }

    fn summary() -> SessionSummary {
        SessionSummary {
            session_id: "s1".to_string(),
            status: SessionStatus::Completed,
            ended_at: Utc::now(),
            final_results: FinalResults {
                winner: None,
                participants: vec![],
                game_stats: GameStats {
                    total_questions: 1,
                    questions_completed: 1,
                    duration_ms: 1_000,
                    format: Format::TriviaLightning,
                },
                game_state: Value::Null,
            },
        }
    }

    fn record(user_id: &str) -> ParticipantRecord {
        ParticipantRecord {
            session_id: "s1".to_string(),
            user_id: user_id.to_string(),
            final_score: 150,
            final_accuracy: 1.0,
            total_time_ms: 5_000,
            answers: vec![],
            format_data: json!({"kind": "none"}),
        }
    }

    #[test]
    fn test_memory_store_clones_share_buffers() {
        let store = MemoryStore::new();
        let handle = store.clone();

        store.record_answer(&row("u1")).unwrap();
        store
            .save_results(&summary(), &[record("u1"), record("u2")])
            .unwrap();

        assert_eq!(handle.answers().len(), 1);
        assert_eq!(handle.summaries().len(), 1);
        assert_eq!(handle.participants().len(), 2);
    }

    #[test]
    fn test_json_lines_store_appends() {
        let path = std::env::temp_dir().join(format!(
            "quiz-results-{}-{}.jsonl",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        ));
        let store = JsonLinesStore::new(&path);

        store.record_answer(&row("u1")).unwrap();
        store.save_results(&summary(), &[record("u1")]).unwrap();

        let contents = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let _ = std::fs::remove_file(&path);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["record"], "answer");
        assert_eq!(lines[0]["userId"], "u1");
        assert_eq!(lines[1]["record"], "summary");
        assert_eq!(lines[1]["status"], "completed");
        assert_eq!(lines[2]["record"], "participant");
        assert_eq!(lines[2]["finalScore"], 150);
    }

    #[tokio::test]
    async fn test_save_results_runs_on_blocking_pool() {
        let memory = MemoryStore::new();
        let store: Arc<dyn ResultStore> = Arc::new(memory.clone());

        save_results(store, summary(), vec![record("u1")]).await.unwrap();
        assert_eq!(memory.participants()[0].user_id, "u1");
    }
}

//! Per-format constant tables: scoring, timing, hints and progression classes.

use shared::{Format, Question, SessionSettings};

const HINT_EXCERPT_CHARS: usize = 50;

pub const DEFAULT_BASE_POINTS: u32 = 100;
pub const DEFAULT_OPTIMAL_TIME_MS: u64 = 20_000;
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 60;
pub const DEFAULT_HINT_COST: u32 = 15;

/// Lookup tables keyed by format. Nothing here is derived; each value is a constant.
pub trait FormatRules {
    fn base_points(&self) -> u32;
    /// Answer time at or below which the full time bonus is earned.
    fn optimal_time_ms(&self) -> u64;
    fn time_limit_secs(&self) -> u32;
    fn hint_cost(&self) -> u32;
    /// Answers are announced to the other participants.
    fn broadcasts_answers(&self) -> bool;
    /// The question timer advances the session on expiry.
    fn is_time_based(&self) -> bool;
    /// The session advances as soon as every connected participant answered.
    fn auto_advances(&self) -> bool;
}

impl FormatRules for Format {
    fn base_points(&self) -> u32 {
        match self {
            Format::TriviaLightning => 100,
            Format::ColorMatch => 50,
            Format::MemoryFlip => 75,
            Format::BoardRace => 100,
            Format::EscapeRoomMini => 200,
            Format::AdvancedEscapeRoom => 300,
            Format::CodingPuzzle => 250,
            Format::DebateCards => 150,
            _ => DEFAULT_BASE_POINTS,
        }
    }

    fn optimal_time_ms(&self) -> u64 {
        match self {
            Format::TriviaLightning => 10_000,
            Format::ColorMatch => 5_000,
            Format::TimedEquationDuel => 15_000,
            _ => DEFAULT_OPTIMAL_TIME_MS,
        }
    }

    fn time_limit_secs(&self) -> u32 {
        match self {
            Format::TriviaLightning => 30,
            Format::TimedEquationDuel => 45,
            Format::WordSearchDuel => 60,
            Format::EscapeRoomMini => 180,
            Format::AdvancedEscapeRoom => 300,
            _ => DEFAULT_TIME_LIMIT_SECS,
        }
    }

    fn hint_cost(&self) -> u32 {
        match self {
            Format::EscapeRoomMini => 25,
            Format::AdvancedEscapeRoom => 50,
            Format::Crossword => 10,
            Format::CodingPuzzle => 30,
            _ => DEFAULT_HINT_COST,
        }
    }

    fn broadcasts_answers(&self) -> bool {
        matches!(
            self,
            Format::TriviaLightning
                | Format::BoardRace
                | Format::WordSearchDuel
                | Format::TimedEquationDuel
                | Format::DebateCards
        )
    }

    fn is_time_based(&self) -> bool {
        matches!(
            self,
            Format::TriviaLightning
                | Format::TimedEquationDuel
                | Format::EscapeRoomMini
                | Format::AdvancedEscapeRoom
        )
    }

    fn auto_advances(&self) -> bool {
        matches!(
            self,
            Format::TriviaLightning | Format::ColorMatch | Format::MemoryFlip | Format::NumberLineRace
        )
    }
}

/// Question time limit after applying the host's override.
pub fn effective_time_limit(format: &Format, settings: &SessionSettings) -> u32 {
    settings
        .time_limit_secs
        .filter(|secs| *secs > 0)
        .unwrap_or_else(|| format.time_limit_secs())
}

/// Auto-advance classification after applying the host's override.
pub fn effective_auto_advance(format: &Format, settings: &SessionSettings) -> bool {
    settings.auto_advance.unwrap_or_else(|| format.auto_advances())
}

/// Hint shown for the active question, or a fallback when no question is live.
pub fn hint_text(format: &Format, question: Option<&Question>, word_length: Option<u64>) -> String {
    let question = match question {
        Some(question) => question,
        None => return "No hints available right now".to_string(),
    };

    match format {
        Format::Crossword => match word_length {
            Some(length) => format!("This word has {} letters", length),
            None => "This word has ? letters".to_string(),
        },
        Format::HangmanVisual => "The word contains the most common vowel".to_string(),
        Format::EscapeRoomMini => "Look for clues in the question text".to_string(),
        _ => match &question.explanation {
            Some(explanation) => {
                let excerpt: String = explanation.chars().take(HINT_EXCERPT_CHARS).collect();
                format!("Hint: {}...", excerpt)
            }
            None => "Think about the most logical options".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_constants() {
        assert_eq!(Format::EscapeRoomMini.base_points(), 200);
        assert_eq!(Format::TriviaLightning.optimal_time_ms(), 10_000);
        assert_eq!(Format::AdvancedEscapeRoom.time_limit_secs(), 300);
        assert_eq!(Format::Crossword.hint_cost(), 10);
    }

    #[test]
    fn test_unknown_format_uses_defaults() {
        let format = Format::Other("bingo".to_string());
        assert_eq!(format.base_points(), DEFAULT_BASE_POINTS);
        assert_eq!(format.optimal_time_ms(), DEFAULT_OPTIMAL_TIME_MS);
        assert_eq!(format.time_limit_secs(), DEFAULT_TIME_LIMIT_SECS);
        assert_eq!(format.hint_cost(), DEFAULT_HINT_COST);
        assert!(!format.broadcasts_answers());
        assert!(!format.is_time_based());
        assert!(!format.auto_advances());
    }

    #[test]
    fn test_classifications() {
        assert!(Format::BoardRace.broadcasts_answers());
        assert!(!Format::BoardRace.is_time_based());
        assert!(Format::EscapeRoomMini.is_time_based());
        assert!(!Format::EscapeRoomMini.auto_advances());
        assert!(Format::MemoryFlip.auto_advances());
    }

    #[test]
    fn test_settings_override() {
        let settings = SessionSettings {
            max_players: None,
            time_limit_secs: Some(15),
            auto_advance: Some(true),
        };
        assert_eq!(effective_time_limit(&Format::Crossword, &settings), 15);
        assert!(effective_auto_advance(&Format::Crossword, &settings));

        let defaults = SessionSettings::default();
        assert_eq!(effective_time_limit(&Format::Crossword, &defaults), 60);
        assert!(!effective_auto_advance(&Format::Crossword, &defaults));
    }

    fn question(explanation: Option<&str>) -> Question {
        Question {
            id: "q1".to_string(),
            stem: "stem".to_string(),
            options: vec![],
            correct_answer: serde_json::json!("a"),
            explanation: explanation.map(str::to_string),
        }
    }

    #[test]
    fn test_hint_text() {
        let long = "x".repeat(80);
        let q = question(Some(&long));
        assert_eq!(
            hint_text(&Format::TriviaLightning, Some(&q), None),
            format!("Hint: {}...", "x".repeat(50))
        );
        assert_eq!(
            hint_text(&Format::Crossword, Some(&q), Some(7)),
            "This word has 7 letters"
        );
        assert_eq!(
            hint_text(&Format::ColorMatch, Some(&question(None)), None),
            "Think about the most logical options"
        );
        assert_eq!(
            hint_text(&Format::TriviaLightning, None, None),
            "No hints available right now"
        );
    }
}

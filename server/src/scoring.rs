//! Answer evaluation and point calculation.
//!
//! Both functions are pure: the session actor calls them inside its critical section.

use crate::format::FormatRules;
use serde_json::Value;
use shared::{Format, Question};
use std::collections::BTreeSet;

/// Result of checking a submission against a question's answer key.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub is_correct: bool,
    pub correct_answer: Value,
    pub explanation: Option<String>,
}

/// Checks a submitted answer.
///
/// Scalars compare as trimmed, case-insensitive strings. A list compares against a
/// list-valued key as an order-independent set; against a scalar key it is correct when
/// any element matches. `null` is never correct.
pub fn evaluate(question: &Question, submitted: &Value) -> Evaluation {
    let is_correct = match (submitted, &question.correct_answer) {
        (Value::Null, _) => false,
        (Value::Array(given), Value::Array(expected)) => {
            normalized_set(given) == normalized_set(expected)
        }
        (Value::Array(given), expected) => {
            let key = normalize(expected);
            given.iter().any(|item| normalize(item) == key)
        }
        (given, Value::Array(expected)) => {
            expected.len() == 1 && normalize(given) == normalize(&expected[0])
        }
        (given, expected) => normalize(given) == normalize(expected),
    };

    Evaluation {
        is_correct,
        correct_answer: question.correct_answer.clone(),
        explanation: question.explanation.clone(),
    }
}

fn normalize(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_lowercase(),
        other => other.to_string().trim().to_lowercase(),
    }
}

fn normalized_set(values: &[Value]) -> BTreeSet<String> {
    values.iter().map(normalize).collect()
}

/// Points for one answer: zero when wrong, otherwise base points plus the time bonus.
pub fn points(is_correct: bool, time_taken_ms: u64, format: &Format) -> u32 {
    if !is_correct {
        return 0;
    }
    format.base_points() + time_bonus(time_taken_ms, format)
}

/// Bonus of up to half the base award, full at or below the optimal time and decaying
/// linearly to zero at twice the optimal time.
pub fn time_bonus(time_taken_ms: u64, format: &Format) -> u32 {
    let max_bonus = 0.5 * format.base_points() as f64;
    let optimal = format.optimal_time_ms() as f64;
    let overshoot = (time_taken_ms as f64 - optimal) / optimal;
    let decay = (1.0 - overshoot).clamp(0.0, 1.0);
    (max_bonus * decay).round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(correct: Value) -> Question {
        Question {
            id: "q1".to_string(),
            stem: "stem".to_string(),
            options: vec![],
            correct_answer: correct,
            explanation: Some("because".to_string()),
        }
    }

    #[test]
    fn test_scalar_answers_ignore_case_and_whitespace() {
        let q = question(json!("Paris"));
        assert!(evaluate(&q, &json!("  paris ")).is_correct);
        assert!(!evaluate(&q, &json!("London")).is_correct);
    }

    #[test]
    fn test_numeric_answers_compare_as_text() {
        let q = question(json!("4"));
        assert!(evaluate(&q, &json!(4)).is_correct);
    }

    #[test]
    fn test_list_answers_are_order_independent() {
        let q = question(json!(["a", "b", "c"]));
        assert!(evaluate(&q, &json!(["c", "A", "b"])).is_correct);
        assert!(!evaluate(&q, &json!(["a", "b"])).is_correct);
    }

    #[test]
    fn test_list_against_scalar_key() {
        let q = question(json!("b"));
        assert!(evaluate(&q, &json!(["a", "b"])).is_correct);
        assert!(!evaluate(&q, &json!(["a", "c"])).is_correct);
    }

    #[test]
    fn test_null_answer_is_wrong() {
        let q = question(json!("x"));
        let result = evaluate(&q, &Value::Null);
        assert!(!result.is_correct);
        assert_eq!(result.correct_answer, json!("x"));
        assert_eq!(result.explanation.as_deref(), Some("because"));
    }

    #[test]
    fn test_points_example() {
        // base 100, optimal 10s
        let format = Format::TriviaLightning;
        assert_eq!(points(true, 5_000, &format), 150);
        assert_eq!(points(true, 20_000, &format), 100);
        assert_eq!(points(false, 1_000, &format), 0);
    }

    #[test]
    fn test_bonus_decays_linearly() {
        let format = Format::TriviaLightning;
        assert_eq!(time_bonus(10_000, &format), 50);
        assert_eq!(time_bonus(15_000, &format), 25);
        assert_eq!(time_bonus(60_000, &format), 0);
    }

    #[test]
    fn test_bonus_never_exceeds_half_base() {
        let format = Format::AdvancedEscapeRoom;
        assert_eq!(time_bonus(0, &format), 150);
        assert_eq!(points(true, 0, &format), 450);
    }
}

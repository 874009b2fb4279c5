//! Deterministic standings.

use crate::participant::Participant;
use shared::LeaderboardEntry;
use std::cmp::Ordering;

/// Total order on participants: score descending, then accuracy descending, then total
/// answer time ascending, with the user ID as the last resort so no two entries tie.
pub fn standing_order(a: &Participant, b: &Participant) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.accuracy.total_cmp(&a.accuracy))
        .then_with(|| a.total_time_ms.cmp(&b.total_time_ms))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Ranks the given participants, sequentially from 1.
pub fn rank<'a>(participants: impl Iterator<Item = &'a Participant>) -> Vec<&'a Participant> {
    let mut ranked: Vec<&Participant> = participants.collect();
    ranked.sort_by(|a, b| standing_order(a, b));
    ranked
}

/// Leaderboard over the given participants (callers pass the connected ones).
pub fn build<'a>(participants: impl Iterator<Item = &'a Participant>) -> Vec<LeaderboardEntry> {
    rank(participants)
        .into_iter()
        .enumerate()
        .map(|(index, p)| LeaderboardEntry {
            rank: index + 1,
            user_id: p.user_id.clone(),
            score: p.score,
            accuracy_percent: (p.accuracy * 100.0).round() as u32,
            answer_count: p.answers.len(),
            total_time_ms: p.total_time_ms,
        })
        .collect()
}

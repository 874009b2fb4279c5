//! Format-specific game state and its transition rules.
//!
//! A session picks its `GameState` variant once, from its format, when it is created.
//! Transitions only run after an answer has been scored or an action has been validated,
//! and every tag-driven transition (puzzle, room, word, card) is idempotent.

use crate::error::SessionError;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{Format, UserId};
use std::collections::{BTreeMap, BTreeSet};

pub const BOARD_LENGTH: u32 = 30;
pub const STARTING_MONEY: i64 = 10_000;
pub const STARTING_REPUTATION: i64 = 50;
/// Largest investment a single business decision may carry.
pub const MAX_INVESTMENT: i64 = 1_000_000;
pub const INNOVATION_THRESHOLD: f64 = 0.5;
pub const GROWTH_THRESHOLD: f64 = 0.6;
pub const ENTRY_ROOM: &str = "entry";
pub const FIRST_CHAPTER: &str = "start";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameState {
    BoardRace(BoardRace),
    EscapeRoom(EscapeRoom),
    StoryPath(StoryPath),
    DebateCards(DebateCards),
    SimulationTycoon(SimulationTycoon),
    Crossword(Crossword),
    Generic(Generic),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRace {
    pub board_length: u32,
    pub positions: BTreeMap<UserId, u32>,
    pub dice_rolls: Vec<DiceRoll>,
    pub finish_order: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRoll {
    pub user_id: UserId,
    pub roll: u32,
    pub new_position: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscapeRoom {
    pub current_room: String,
    pub unlocked_rooms: BTreeSet<String>,
    pub puzzles_solved: Vec<String>,
    pub hints_used: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPath {
    pub current_chapter: String,
    pub visited_chapters: Vec<String>,
    pub choices: Vec<StoryChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryChoice {
    pub from: String,
    pub to: String,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateCards {
    pub current_speaker: Option<UserId>,
    pub used_cards: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationTycoon {
    pub market_conditions: MarketConditions,
}

/// Sampled once at session creation and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConditions {
    pub economic_growth: f64,
    pub innovation_trend: f64,
    pub competition_level: f64,
    pub consumer_confidence: f64,
    pub regulation_impact: f64,
}

impl MarketConditions {
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            economic_growth: rng.gen(),
            innovation_trend: rng.gen(),
            competition_level: rng.gen(),
            consumer_confidence: rng.gen(),
            regulation_impact: rng.gen(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Crossword {
    pub grid_state: BTreeMap<String, Value>,
    pub completed_words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generic {
    pub custom_data: BTreeMap<UserId, Vec<LoggedEvent>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedEvent {
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// Per-participant format data, seeded on first join.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatData {
    BoardRace {
        position: u32,
        rolls: u32,
        #[serde(rename = "pendingRoll")]
        pending_roll: Option<u32>,
    },
    MemoryFlip {
        #[serde(rename = "cardsFlipped")]
        cards_flipped: u32,
        matches: u32,
    },
    WordSearch {
        #[serde(rename = "wordsFound")]
        words_found: Vec<String>,
        #[serde(rename = "timeSpentMs")]
        time_spent_ms: u64,
    },
    Tycoon(BusinessLedger),
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessLedger {
    pub money: i64,
    pub reputation: i64,
    pub decisions: Vec<Decision>,
}

impl Default for BusinessLedger {
    fn default() -> Self {
        Self {
            money: STARTING_MONEY,
            reputation: STARTING_REPUTATION,
            decisions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "type")]
    pub kind: String,
    pub investment: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessEffect {
    pub money_change: i64,
    pub reputation_change: i64,
}

/// Tags an answer may carry in its `additionalData`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnswerPayload {
    dice_roll: Option<u32>,
    puzzle_solved: Option<String>,
    room_unlocked: Option<String>,
    hint_used: bool,
    chapter_choice: Option<String>,
    word_completed: Option<String>,
    grid_updates: BTreeMap<String, Value>,
    cards_flipped: Option<u32>,
    words_found: Vec<String>,
    time_spent: Option<u64>,
}

impl AnswerPayload {
    fn parse(payload: Option<&Value>) -> Self {
        match payload {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                debug!("Ignoring malformed answer payload: {}", e);
                AnswerPayload::default()
            }),
            None => AnswerPayload::default(),
        }
    }
}

/// A validated `game_specific` action.
#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    SelectCard { card_id: String },
    BusinessDecision(Decision),
    RollDice,
    ChooseChapter { chapter: String },
    Other { action: String, data: Value },
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    action: String,
    #[serde(default)]
    data: Value,
}

impl GameAction {
    /// Parses `{"action": ..., "data": {...}}`.
    pub fn parse(payload: Option<&Value>) -> Result<Self, SessionError> {
        let payload = payload.ok_or_else(|| SessionError::invalid("Missing game action"))?;
        let envelope: ActionEnvelope = serde_json::from_value(payload.clone())
            .map_err(|_| SessionError::invalid("Malformed game action"))?;

        let action = match envelope.action.as_str() {
            "select_card" => {
                let card_id = envelope
                    .data
                    .get("cardId")
                    .and_then(value_as_text)
                    .ok_or_else(|| SessionError::invalid("Card selection needs a cardId"))?;
                GameAction::SelectCard { card_id }
            }
            "business_decision" => {
                let decision: Decision = serde_json::from_value(envelope.data)
                    .map_err(|_| SessionError::invalid("Malformed business decision"))?;
                if !(0..=MAX_INVESTMENT).contains(&decision.investment) {
                    return Err(SessionError::invalid(format!(
                        "Investment must be between 0 and {}",
                        MAX_INVESTMENT
                    )));
                }
                GameAction::BusinessDecision(decision)
            }
            "roll_dice" => GameAction::RollDice,
            "choose_chapter" => {
                let chapter = envelope
                    .data
                    .get("chapter")
                    .and_then(value_as_text)
                    .ok_or_else(|| SessionError::invalid("Chapter choice needs a chapter"))?;
                GameAction::ChooseChapter { chapter }
            }
            _ => GameAction::Other {
                action: envelope.action,
                data: envelope.data,
            },
        };
        Ok(action)
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// What a game action did, for the controller to announce.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    CardSelected {
        card_id: String,
        current_speaker: Option<UserId>,
    },
    BusinessUpdated {
        ledger: BusinessLedger,
        effect: BusinessEffect,
    },
    DiceRolled {
        roll: u32,
    },
    Performed {
        action: String,
        data: Value,
    },
}

/// Ledger change for one decision. Depends only on the decision and the market.
pub fn business_effect(decision: &Decision, market: &MarketConditions) -> BusinessEffect {
    let investment = decision.investment;
    let mut money_change = 0;
    let mut reputation_change = 0;

    match decision.kind.as_str() {
        "marketing" => {
            money_change = investment.saturating_neg();
            reputation_change = investment / 100;
        }
        "product_development" => {
            money_change = investment.saturating_neg();
            if market.innovation_trend > INNOVATION_THRESHOLD {
                money_change = money_change.saturating_add(investment.saturating_mul(3) / 2);
            }
        }
        "expansion" => {
            money_change = investment.saturating_neg();
            if market.economic_growth > GROWTH_THRESHOLD {
                money_change = money_change.saturating_add(investment.saturating_mul(2));
            }
        }
        _ => {}
    }

    BusinessEffect {
        money_change,
        reputation_change,
    }
}

impl FormatData {
    pub fn for_format(format: &Format) -> Self {
        match format {
            Format::BoardRace => FormatData::BoardRace {
                position: 0,
                rolls: 0,
                pending_roll: None,
            },
            Format::MemoryFlip => FormatData::MemoryFlip {
                cards_flipped: 0,
                matches: 0,
            },
            Format::WordSearch | Format::WordSearchDuel => FormatData::WordSearch {
                words_found: Vec::new(),
                time_spent_ms: 0,
            },
            Format::SimulationTycoon => FormatData::Tycoon(BusinessLedger::default()),
            _ => FormatData::None,
        }
    }

    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Participant-local effects of a scored answer for formats without shared state.
    fn apply_answer(&mut self, is_correct: bool, payload: &AnswerPayload) {
        match self {
            FormatData::MemoryFlip {
                cards_flipped,
                matches,
            } => {
                if let Some(flipped) = payload.cards_flipped {
                    *cards_flipped += flipped;
                    if is_correct {
                        *matches += 1;
                    }
                }
            }
            FormatData::WordSearch {
                words_found,
                time_spent_ms,
            } => {
                if is_correct && !payload.words_found.is_empty() {
                    for word in &payload.words_found {
                        if !words_found.contains(word) {
                            words_found.push(word.clone());
                        }
                    }
                    *time_spent_ms = payload.time_spent.unwrap_or(0);
                }
            }
            _ => {}
        }
    }
}

impl GameState {
    /// Initial state for a format. Only simulation_tycoon draws from `rng`.
    pub fn for_format<R: Rng + ?Sized>(format: &Format, rng: &mut R) -> Self {
        match format {
            Format::BoardRace => GameState::BoardRace(BoardRace {
                board_length: BOARD_LENGTH,
                positions: BTreeMap::new(),
                dice_rolls: Vec::new(),
                finish_order: Vec::new(),
            }),
            Format::EscapeRoomMini | Format::AdvancedEscapeRoom => {
                GameState::EscapeRoom(EscapeRoom {
                    current_room: ENTRY_ROOM.to_string(),
                    unlocked_rooms: BTreeSet::from([ENTRY_ROOM.to_string()]),
                    puzzles_solved: Vec::new(),
                    hints_used: 0,
                })
            }
            Format::StoryPath => GameState::StoryPath(StoryPath {
                current_chapter: FIRST_CHAPTER.to_string(),
                visited_chapters: Vec::new(),
                choices: Vec::new(),
            }),
            Format::DebateCards => GameState::DebateCards(DebateCards {
                current_speaker: None,
                used_cards: Vec::new(),
            }),
            Format::SimulationTycoon => GameState::SimulationTycoon(SimulationTycoon {
                market_conditions: MarketConditions::sample(rng),
            }),
            Format::Crossword => GameState::Crossword(Crossword {
                grid_state: BTreeMap::new(),
                completed_words: Vec::new(),
            }),
            _ => GameState::Generic(Generic::default()),
        }
    }

    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Applies the effects of a scored answer.
    pub fn apply_answer(
        &mut self,
        user_id: &str,
        is_correct: bool,
        additional_data: Option<&Value>,
        data: &mut FormatData,
    ) {
        let payload = AnswerPayload::parse(additional_data);
        data.apply_answer(is_correct, &payload);

        match self {
            GameState::BoardRace(board) => {
                if !is_correct {
                    return;
                }
                let roll = match payload.dice_roll.filter(|roll| (1..=6).contains(roll)) {
                    Some(roll) => Some(roll),
                    None => match &mut *data {
                        FormatData::BoardRace { pending_roll, .. } => pending_roll.take(),
                        _ => None,
                    },
                };
                if let Some(roll) = roll {
                    board.advance(user_id, roll, data);
                }
            }
            GameState::EscapeRoom(room) => {
                if is_correct {
                    if let Some(puzzle) = payload.puzzle_solved {
                        room.solve(puzzle, payload.room_unlocked);
                    }
                }
                if payload.hint_used {
                    room.hints_used += 1;
                }
            }
            GameState::StoryPath(story) => {
                if let Some(chapter) = payload.chapter_choice {
                    story.choose(user_id, chapter);
                }
            }
            GameState::Crossword(crossword) => {
                if is_correct {
                    if let Some(word) = payload.word_completed {
                        crossword.complete(word, payload.grid_updates);
                    }
                }
            }
            GameState::Generic(generic) => {
                if let Some(value) = additional_data {
                    generic.log(user_id, value.clone());
                }
            }
            GameState::DebateCards(_) | GameState::SimulationTycoon(_) => {}
        }
    }

    /// Applies a validated game-specific action.
    ///
    /// Actions that have no handler for this format are echoed back as `Performed`.
    pub fn apply_action<R: Rng + ?Sized>(
        &mut self,
        user_id: &str,
        action: GameAction,
        data: &mut FormatData,
        rng: &mut R,
    ) -> ActionOutcome {
        match (self, action) {
            (GameState::DebateCards(debate), GameAction::SelectCard { card_id }) => {
                debate.select(user_id, &card_id);
                ActionOutcome::CardSelected {
                    card_id,
                    current_speaker: debate.current_speaker.clone(),
                }
            }
            (GameState::SimulationTycoon(tycoon), GameAction::BusinessDecision(decision)) => {
                match &mut *data {
                    FormatData::Tycoon(ledger) => {
                        let effect = business_effect(&decision, &tycoon.market_conditions);
                        ledger.money = ledger.money.saturating_add(effect.money_change);
                        ledger.reputation =
                            ledger.reputation.saturating_add(effect.reputation_change);
                        ledger.decisions.push(decision);
                        ActionOutcome::BusinessUpdated {
                            ledger: ledger.clone(),
                            effect,
                        }
                    }
                    _ => ActionOutcome::Performed {
                        action: "business_decision".to_string(),
                        data: Value::Null,
                    },
                }
            }
            (GameState::BoardRace(_), GameAction::RollDice) => {
                let roll = rng.gen_range(1..=6);
                if let FormatData::BoardRace { pending_roll, .. } = data {
                    *pending_roll = Some(roll);
                }
                ActionOutcome::DiceRolled { roll }
            }
            (GameState::StoryPath(story), GameAction::ChooseChapter { chapter }) => {
                story.choose(user_id, chapter.clone());
                ActionOutcome::Performed {
                    action: "choose_chapter".to_string(),
                    data: serde_json::json!({ "chapter": chapter }),
                }
            }
            (_, action) => {
                let (name, data) = match action {
                    GameAction::Other { action, data } => (action, data),
                    GameAction::SelectCard { card_id } => {
                        ("select_card".to_string(), serde_json::json!({ "cardId": card_id }))
                    }
                    GameAction::BusinessDecision(decision) => (
                        "business_decision".to_string(),
                        serde_json::to_value(decision).unwrap_or(Value::Null),
                    ),
                    GameAction::RollDice => ("roll_dice".to_string(), Value::Null),
                    GameAction::ChooseChapter { chapter } => (
                        "choose_chapter".to_string(),
                        serde_json::json!({ "chapter": chapter }),
                    ),
                };
                ActionOutcome::Performed { action: name, data }
            }
        }
    }

    /// Escape rooms keep their own hint counter next to the participant's.
    pub fn record_hint(&mut self) {
        if let GameState::EscapeRoom(room) = self {
            room.hints_used += 1;
        }
    }
}

impl BoardRace {
    /// Moves a racer forward. Racers who reached the finish stay put.
    fn advance(&mut self, user_id: &str, roll: u32, data: &mut FormatData) {
        if self.is_finished(user_id) {
            debug!("Ignoring roll of {} for finished racer {}", roll, user_id);
            return;
        }

        let position = self.positions.entry(user_id.to_string()).or_insert(0);
        *position = position.saturating_add(roll);
        let new_position = *position;

        if let FormatData::BoardRace {
            position, rolls, ..
        } = data
        {
            *position = new_position;
            *rolls += 1;
        }

        self.dice_rolls.push(DiceRoll {
            user_id: user_id.to_string(),
            roll,
            new_position,
            timestamp: Utc::now(),
        });

        if new_position >= self.board_length && !self.finish_order.iter().any(|u| u == user_id) {
            info!("Participant {} reached the finish", user_id);
            self.finish_order.push(user_id.to_string());
        }
    }

    pub fn is_finished(&self, user_id: &str) -> bool {
        self.positions
            .get(user_id)
            .is_some_and(|position| *position >= self.board_length)
    }
}

impl EscapeRoom {
    fn solve(&mut self, puzzle: String, room: Option<String>) {
        if !self.puzzles_solved.contains(&puzzle) {
            self.puzzles_solved.push(puzzle);
        }
        if let Some(room) = room {
            if self.unlocked_rooms.insert(room.clone()) {
                self.current_room = room;
            }
        }
    }
}

impl StoryPath {
    fn choose(&mut self, user_id: &str, chapter: String) {
        let from = std::mem::replace(&mut self.current_chapter, chapter.clone());
        self.visited_chapters.push(from.clone());
        self.choices.push(StoryChoice {
            from,
            to: chapter,
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        });
    }
}

impl DebateCards {
    fn select(&mut self, user_id: &str, card_id: &str) {
        if !self.used_cards.iter().any(|card| card == card_id) {
            self.used_cards.push(card_id.to_string());
        }
        if self.current_speaker.is_none() {
            self.current_speaker = Some(user_id.to_string());
        }
    }
}

impl Crossword {
    fn complete(&mut self, word: String, grid_updates: BTreeMap<String, Value>) {
        if !self.completed_words.contains(&word) {
            self.completed_words.push(word);
        }
        self.grid_state.extend(grid_updates);
    }
}

impl Generic {
    fn log(&mut self, user_id: &str, data: Value) {
        self.custom_data
            .entry(user_id.to_string())
            .or_default()
            .push(LoggedEvent {
                timestamp: Utc::now(),
                data,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn state(format: Format) -> (GameState, FormatData) {
        let data = FormatData::for_format(&format);
        (GameState::for_format(&format, &mut rng()), data)
    }

    #[test]
    fn test_variant_selection() {
        assert!(matches!(state(Format::BoardRace).0, GameState::BoardRace(_)));
        assert!(matches!(
            state(Format::AdvancedEscapeRoom).0,
            GameState::EscapeRoom(_)
        ));
        assert!(matches!(state(Format::TriviaLightning).0, GameState::Generic(_)));
        assert_eq!(
            state(Format::SimulationTycoon).1,
            FormatData::Tycoon(BusinessLedger::default())
        );
    }

    #[test]
    fn test_board_race_moves_on_correct_answer_only() {
        let (mut game, mut data) = state(Format::BoardRace);

        game.apply_answer("u1", false, Some(&json!({"diceRoll": 4})), &mut data);
        game.apply_answer("u1", true, Some(&json!({"diceRoll": 4})), &mut data);
        game.apply_answer("u1", true, Some(&json!({"diceRoll": 3})), &mut data);

        match &game {
            GameState::BoardRace(board) => {
                assert_eq!(board.positions["u1"], 7);
                assert_eq!(board.dice_rolls.len(), 2);
            }
            other => panic!("Unexpected state: {:?}", other),
        }
        assert_eq!(
            data,
            FormatData::BoardRace {
                position: 7,
                rolls: 2,
                pending_roll: None
            }
        );
    }

    #[test]
    fn test_board_race_rejects_impossible_rolls() {
        let (mut game, mut data) = state(Format::BoardRace);
        game.apply_answer("u1", true, Some(&json!({"diceRoll": 40})), &mut data);

        if let GameState::BoardRace(board) = &game {
            assert!(board.positions.get("u1").is_none());
        }
    }

    #[test]
    fn test_board_race_uses_server_roll() {
        let (mut game, mut data) = state(Format::BoardRace);
        let mut rng = rng();

        let outcome = game.apply_action("u1", GameAction::RollDice, &mut data, &mut rng);
        let roll = match outcome {
            ActionOutcome::DiceRolled { roll } => roll,
            other => panic!("Unexpected outcome: {:?}", other),
        };
        assert!((1..=6).contains(&roll));

        game.apply_answer("u1", true, None, &mut data);
        if let GameState::BoardRace(board) = &game {
            assert_eq!(board.positions["u1"], roll);
        }
        assert!(matches!(
            data,
            FormatData::BoardRace {
                pending_roll: None,
                ..
            }
        ));
    }

    #[test]
    fn test_board_race_finish_is_terminal() {
        let (mut game, mut data) = state(Format::BoardRace);
        for _ in 0..7 {
            game.apply_answer("u1", true, Some(&json!({"diceRoll": 6})), &mut data);
        }

        match &game {
            GameState::BoardRace(board) => {
                assert!(board.is_finished("u1"));
                assert_eq!(board.finish_order, vec!["u1".to_string()]);
                assert_eq!(board.positions["u1"], BOARD_LENGTH);
                assert_eq!(board.dice_rolls.len(), 5);
            }
            other => panic!("Unexpected state: {:?}", other),
        }
        assert!(matches!(
            data,
            FormatData::BoardRace {
                position: 30,
                rolls: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_escape_room_tags_are_idempotent() {
        let (mut game, mut data) = state(Format::EscapeRoomMini);
        let payload = json!({"puzzleSolved": "lock", "roomUnlocked": "library"});

        game.apply_answer("u1", true, Some(&payload), &mut data);
        game.apply_answer("u2", true, Some(&payload), &mut data);

        match &game {
            GameState::EscapeRoom(room) => {
                assert_eq!(room.puzzles_solved, vec!["lock".to_string()]);
                assert_eq!(room.unlocked_rooms.len(), 2);
                assert_eq!(room.current_room, "library");
            }
            other => panic!("Unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_escape_room_ignores_wrong_answers_but_counts_hints() {
        let (mut game, mut data) = state(Format::EscapeRoomMini);
        game.apply_answer(
            "u1",
            false,
            Some(&json!({"puzzleSolved": "lock", "hintUsed": true})),
            &mut data,
        );
        game.record_hint();

        match &game {
            GameState::EscapeRoom(room) => {
                assert!(room.puzzles_solved.is_empty());
                assert_eq!(room.hints_used, 2);
                assert_eq!(room.current_room, ENTRY_ROOM);
            }
            other => panic!("Unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_story_path_records_revisits() {
        let (mut game, mut data) = state(Format::StoryPath);
        game.apply_answer("u1", false, Some(&json!({"chapterChoice": "forest"})), &mut data);
        game.apply_answer("u2", true, Some(&json!({"chapterChoice": "start"})), &mut data);
        game.apply_action(
            "u1",
            GameAction::ChooseChapter {
                chapter: "forest".to_string(),
            },
            &mut data,
            &mut rng(),
        );

        match &game {
            GameState::StoryPath(story) => {
                assert_eq!(story.current_chapter, "forest");
                assert_eq!(story.visited_chapters, vec!["start", "forest", "start"]);
                assert_eq!(story.choices.len(), 3);
                assert_eq!(story.choices[1].user_id, "u2");
            }
            other => panic!("Unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_debate_speaker_is_first_selector() {
        let (mut game, mut data) = state(Format::DebateCards);
        let mut rng = rng();

        for (user, card) in [("u1", "c1"), ("u2", "c2"), ("u2", "c1")] {
            game.apply_action(
                user,
                GameAction::SelectCard {
                    card_id: card.to_string(),
                },
                &mut data,
                &mut rng,
            );
        }

        match &game {
            GameState::DebateCards(debate) => {
                assert_eq!(debate.current_speaker.as_deref(), Some("u1"));
                assert_eq!(debate.used_cards, vec!["c1", "c2"]);
            }
            other => panic!("Unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_business_effect_depends_on_market() {
        let booming = MarketConditions {
            economic_growth: 0.9,
            innovation_trend: 0.9,
            competition_level: 0.1,
            consumer_confidence: 0.5,
            regulation_impact: 0.5,
        };
        let flat = MarketConditions {
            economic_growth: 0.1,
            innovation_trend: 0.1,
            ..booming
        };
        let expansion = Decision {
            kind: "expansion".to_string(),
            investment: 1000,
        };
        let product = Decision {
            kind: "product_development".to_string(),
            investment: 1000,
        };
        let marketing = Decision {
            kind: "marketing".to_string(),
            investment: 1000,
        };

        assert_eq!(business_effect(&expansion, &booming).money_change, 1000);
        assert_eq!(business_effect(&expansion, &flat).money_change, -1000);
        assert_eq!(business_effect(&product, &booming).money_change, 500);
        assert_eq!(business_effect(&product, &flat).money_change, -1000);
        assert_eq!(
            business_effect(&marketing, &flat),
            BusinessEffect {
                money_change: -1000,
                reputation_change: 10
            }
        );
    }

    #[test]
    fn test_business_decision_investment_is_bounded() {
        let huge = json!({
            "action": "business_decision",
            "data": {"type": "marketing", "investment": i64::MAX}
        });
        assert_eq!(
            GameAction::parse(Some(&huge)),
            Err(SessionError::invalid("Investment must be between 0 and 1000000"))
        );

        let largest = json!({
            "action": "business_decision",
            "data": {"type": "expansion", "investment": MAX_INVESTMENT}
        });
        assert!(matches!(
            GameAction::parse(Some(&largest)),
            Ok(GameAction::BusinessDecision(_))
        ));
    }

    #[test]
    fn test_business_effect_saturates() {
        let booming = MarketConditions {
            economic_growth: 0.9,
            innovation_trend: 0.9,
            competition_level: 0.1,
            consumer_confidence: 0.5,
            regulation_impact: 0.5,
        };
        let expansion = Decision {
            kind: "expansion".to_string(),
            investment: i64::MAX,
        };
        assert_eq!(business_effect(&expansion, &booming).money_change, 0);

        let (mut game, mut data) = state(Format::SimulationTycoon);
        let marketing = Decision {
            kind: "marketing".to_string(),
            investment: i64::MAX,
        };
        for _ in 0..2 {
            game.apply_action(
                "u1",
                GameAction::BusinessDecision(marketing.clone()),
                &mut data,
                &mut rng(),
            );
        }
        match data {
            FormatData::Tycoon(ledger) => {
                assert_eq!(ledger.money, i64::MIN);
                assert_eq!(ledger.decisions.len(), 2);
            }
            other => panic!("Unexpected data: {:?}", other),
        }
    }

    #[test]
    fn test_business_decision_updates_only_the_ledger() {
        let (mut game, mut data) = state(Format::SimulationTycoon);
        let before = match &game {
            GameState::SimulationTycoon(tycoon) => tycoon.market_conditions,
            other => panic!("Unexpected state: {:?}", other),
        };

        let outcome = game.apply_action(
            "u1",
            GameAction::BusinessDecision(Decision {
                kind: "marketing".to_string(),
                investment: 500,
            }),
            &mut data,
            &mut rng(),
        );

        match outcome {
            ActionOutcome::BusinessUpdated { ledger, effect } => {
                assert_eq!(ledger.money, STARTING_MONEY - 500);
                assert_eq!(ledger.reputation, STARTING_REPUTATION + 5);
                assert_eq!(ledger.decisions.len(), 1);
                assert_eq!(effect.money_change, -500);
            }
            other => panic!("Unexpected outcome: {:?}", other),
        }
        if let GameState::SimulationTycoon(tycoon) = &game {
            assert_approx_eq!(tycoon.market_conditions.economic_growth, before.economic_growth);
        }
    }

    #[test]
    fn test_market_conditions_are_unit_interval() {
        let mut rng = rng();
        for _ in 0..100 {
            let market = MarketConditions::sample(&mut rng);
            for value in [
                market.economic_growth,
                market.innovation_trend,
                market.competition_level,
                market.consumer_confidence,
                market.regulation_impact,
            ] {
                assert!((0.0..1.0).contains(&value));
            }
        }
    }

    #[test]
    fn test_crossword_word_is_idempotent_and_grid_last_write_wins() {
        let (mut game, mut data) = state(Format::Crossword);
        game.apply_answer(
            "u1",
            true,
            Some(&json!({"wordCompleted": "RUST", "gridUpdates": {"0,0": "R", "0,1": "U"}})),
            &mut data,
        );
        game.apply_answer(
            "u2",
            true,
            Some(&json!({"wordCompleted": "RUST", "gridUpdates": {"0,1": "V"}})),
            &mut data,
        );

        match &game {
            GameState::Crossword(crossword) => {
                assert_eq!(crossword.completed_words, vec!["RUST".to_string()]);
                assert_eq!(crossword.grid_state["0,0"], json!("R"));
                assert_eq!(crossword.grid_state["0,1"], json!("V"));
            }
            other => panic!("Unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_generic_logs_payloads_per_participant() {
        let (mut game, mut data) = state(Format::TriviaLightning);
        game.apply_answer("u1", true, Some(&json!({"combo": 2})), &mut data);
        game.apply_answer("u1", false, None, &mut data);
        game.apply_answer("u1", false, Some(&json!({"combo": 0})), &mut data);

        match &game {
            GameState::Generic(generic) => {
                assert_eq!(generic.custom_data["u1"].len(), 2);
                assert_eq!(generic.custom_data["u1"][0].data, json!({"combo": 2}));
            }
            other => panic!("Unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_memory_flip_and_word_search_data() {
        let (mut game, mut data) = state(Format::MemoryFlip);
        game.apply_answer("u1", true, Some(&json!({"cardsFlipped": 2})), &mut data);
        game.apply_answer("u1", false, Some(&json!({"cardsFlipped": 2})), &mut data);
        assert_eq!(
            data,
            FormatData::MemoryFlip {
                cards_flipped: 4,
                matches: 1
            }
        );

        let (mut game, mut data) = state(Format::WordSearch);
        game.apply_answer(
            "u1",
            true,
            Some(&json!({"wordsFound": ["cat", "dog"], "timeSpent": 9000})),
            &mut data,
        );
        assert_eq!(
            data,
            FormatData::WordSearch {
                words_found: vec!["cat".to_string(), "dog".to_string()],
                time_spent_ms: 9000
            }
        );
    }

    #[test]
    fn test_unhandled_action_is_echoed() {
        let (mut game, mut data) = state(Format::Crossword);
        let outcome = game.apply_action(
            "u1",
            GameAction::Other {
                action: "wave".to_string(),
                data: json!({"hand": "left"}),
            },
            &mut data,
            &mut rng(),
        );
        assert_eq!(
            outcome,
            ActionOutcome::Performed {
                action: "wave".to_string(),
                data: json!({"hand": "left"})
            }
        );
    }

    #[test]
    fn test_parse_game_actions() {
        let action = GameAction::parse(Some(&json!({"action": "select_card", "data": {"cardId": 12}})));
        assert_eq!(
            action,
            Ok(GameAction::SelectCard {
                card_id: "12".to_string()
            })
        );

        let negative = GameAction::parse(Some(&json!({
            "action": "business_decision",
            "data": {"type": "marketing", "investment": -5}
        })));
        assert!(negative.is_err());

        assert!(GameAction::parse(None).is_err());
        assert_eq!(
            GameAction::parse(Some(&json!({"action": "roll_dice"}))),
            Ok(GameAction::RollDice)
        );
    }

    #[test]
    fn test_snapshot_is_tagged() {
        let (game, data) = state(Format::Crossword);
        assert_eq!(game.snapshot()["kind"], json!("crossword"));
        assert_eq!(data.snapshot()["kind"], json!("none"));
    }
}

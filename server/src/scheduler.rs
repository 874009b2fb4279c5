//! Question progression for a session actor.
//!
//! "Everybody answered" and "the timer ran out" race each other; both only ever post an
//! `Advance { from }` carrying the question index they were scheduled for. `advance` does
//! nothing once the session has moved past that index, so whichever message arrives
//! second is a no-op.

use crate::format::{effective_auto_advance, effective_time_limit, FormatRules};
use crate::leaderboard;
use crate::session::{SessionActor, SessionCommand};
use crate::timer::{self, TimerToken};
use log::{debug, info};
use shared::{QuestionId, ServerEvent, SessionStatus};
use tokio::time::Duration;

impl SessionActor {
    /// Index and ID of the question currently accepting answers.
    pub(crate) fn live_question(&self) -> Option<(usize, QuestionId)> {
        if self.session.status != SessionStatus::Active || self.finishing {
            return None;
        }
        let index = self.session.current_question_index?;
        let question = self.session.questions.get(index)?;
        Some((index, question.id.clone()))
    }

    /// Moves past question `from`, or ends the session after a grace period when no
    /// question is left.
    pub(crate) fn advance(&mut self, from: Option<usize>) {
        if self.session.status != SessionStatus::Active || self.finishing {
            debug!(
                "Session {} not advancing while {:?}",
                self.session.id, self.session.status
            );
            return;
        }
        if self.session.current_question_index != from {
            debug!(
                "Session {} already moved past question {:?}",
                self.session.id, from
            );
            return;
        }

        let next = from.map_or(0, |index| index + 1);
        if next >= self.session.total_questions() {
            self.timer.cancel();
            self.finishing = true;
            info!(
                "Session {} answered all {} questions",
                self.session.id,
                self.session.total_questions()
            );
            timer::schedule(self.timings.end_grace, &self.mailbox, SessionCommand::Finish);
            return;
        }

        self.session.current_question_index = Some(next);
        self.start_question(next);
    }

    fn start_question(&mut self, index: usize) {
        let question = match self.session.questions.get(index) {
            Some(question) => question,
            None => return,
        };
        let time_limit_secs = effective_time_limit(&self.session.format, &self.session.settings);
        let total_questions = self.session.total_questions();

        self.broadcast(ServerEvent::Question {
            question: question.view(),
            question_number: index + 1,
            total_questions,
            time_limit_secs,
            game_state: self.session.game_state.snapshot(),
        });
        info!(
            "Session {}: question {}/{} started",
            self.session.id,
            index + 1,
            total_questions
        );

        self.arm_timer(index);
    }

    /// Starts a full countdown for the question, replacing any live one.
    pub(crate) fn arm_timer(&mut self, index: usize) {
        let time_limit_secs = effective_time_limit(&self.session.format, &self.session.settings);
        let token = self.timer.replace(
            Duration::from_secs(u64::from(time_limit_secs)),
            &self.mailbox,
            SessionCommand::TimerExpired,
        );
        debug!(
            "Session {}: timer {:?} armed for question {} ({}s)",
            self.session.id,
            token,
            index + 1,
            time_limit_secs
        );
    }

    pub(crate) fn on_time_up(&mut self, token: TimerToken) {
        if !self.timer.expire(token) {
            return;
        }
        let (index, _) = match self.live_question() {
            Some(live) => live,
            None => return,
        };

        self.broadcast(ServerEvent::TimeUp {
            question_number: index + 1,
        });
        timer::schedule(
            self.timings.leaderboard_delay,
            &self.mailbox,
            SessionCommand::Leaderboard { index },
        );

        if self.session.format.is_time_based() {
            timer::schedule(
                self.timings.settle_delay,
                &self.mailbox,
                SessionCommand::Advance { from: Some(index) },
            );
        } else {
            debug!(
                "Session {}: waiting for the host after question {}",
                self.session.id,
                index + 1
            );
        }
    }

    /// Broadcasts standings for question `index` unless the session has moved on.
    pub(crate) fn send_leaderboard(&mut self, index: usize) {
        if self.session.status == SessionStatus::Completed
            || self.session.current_question_index != Some(index)
        {
            return;
        }

        self.broadcast(ServerEvent::Leaderboard {
            participants: leaderboard::build(self.session.participants.connected()),
            question_number: index + 1,
            total_questions: self.session.total_questions(),
        });
    }

    /// Settles the live question once every connected participant has answered it.
    ///
    /// Called after answers, leaves, disconnects and resumes, i.e. whenever the set of
    /// outstanding answers may have shrunk.
    pub(crate) fn check_all_answered(&mut self) {
        let (index, question_id) = match self.live_question() {
            Some(live) => live,
            None => return,
        };
        if !self.session.participants.all_answered(&question_id) {
            return;
        }

        timer::schedule(
            self.timings.leaderboard_delay,
            &self.mailbox,
            SessionCommand::Leaderboard { index },
        );

        if effective_auto_advance(&self.session.format, &self.session.settings) {
            self.timer.cancel();
            timer::schedule(
                self.timings.leaderboard_delay + self.timings.settle_delay,
                &self.mailbox,
                SessionCommand::Advance { from: Some(index) },
            );
        }
    }
}

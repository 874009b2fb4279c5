//! Cancellable question countdown.
//!
//! A session owns exactly one `QuestionTimer`. Arming it always aborts the previous
//! countdown first, and every expiry carries a token so a message that was already in
//! flight when the timer got replaced is recognised as stale and dropped.

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

#[derive(Debug, Default)]
pub struct QuestionTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
    deadline: Option<Instant>,
}

impl QuestionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the live countdown (if any) and starts a new one that posts
    /// `message(token)` to `mailbox` when it runs out.
    pub fn replace<T, F>(
        &mut self,
        duration: Duration,
        mailbox: &mpsc::UnboundedSender<T>,
        message: F,
    ) -> TimerToken
    where
        T: Send + 'static,
        F: FnOnce(TimerToken) -> T,
    {
        self.cancel();

        self.generation += 1;
        let token = TimerToken(self.generation);
        let expiry = message(token);
        let mailbox = mailbox.clone();

        self.deadline = Some(Instant::now() + duration);
        self.handle = Some(tokio::spawn(async move {
            sleep(duration).await;
            let _ = mailbox.send(expiry);
        }));
        token
    }

    /// Stops the live countdown. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        self.deadline = None;
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consumes an expiry. Returns false for tokens of replaced or cancelled timers.
    pub fn expire(&mut self, token: TimerToken) -> bool {
        if !self.is_armed() || token.0 != self.generation {
            debug!("Dropping stale timer expiry {:?}", token);
            return false;
        }
        self.deadline = None;
        self.handle = None;
        true
    }

    pub fn remaining(&self) -> Duration {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }
}

impl Drop for QuestionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Posts `message` to `mailbox` after `delay`. Used for the fixed grace periods between
/// steps; the receiver decides whether the message still applies when it arrives.
pub fn schedule<T: Send + 'static>(delay: Duration, mailbox: &mpsc::UnboundedSender<T>, message: T) {
    let mailbox = mailbox.clone();
    tokio::spawn(async move {
        sleep(delay).await;
        let _ = mailbox.send(message);
    });
}

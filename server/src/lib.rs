//! # Quiz Session Server Library
//!
//! This library provides the authoritative orchestrator for real-time multiplayer quiz
//! sessions. It runs many sessions side by side, each with its own participants, question
//! sequence, countdown, format-specific game state and scoring, and pushes every change
//! to the connected clients as named events.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Sessions move through `waiting -> active -> (paused <-> active) -> completed`:
//! - Creation on first join, from the content provider's questions and settings
//! - Host-driven control: start, pause, resume, skip and end
//! - Final results, handed to the result store when the session completes
//! - Removal from the registry a fixed grace period after completion
//!
//! ### Participant Management
//! Participants are never dropped while their session lives. A disconnected participant
//! keeps score, answers and format data and gets all of it back on reconnect.
//!
//! ### Scoring and Standings
//! Answers are checked against the question's key and awarded base points plus a
//! linearly decaying time bonus. Leaderboards use a strict total order, so two
//! participants never share a rank.
//!
//! ## Architecture Design
//!
//! ### One Actor per Session
//! Each session is owned by a single tokio task reading a command mailbox. Client
//! requests, timer expiries and delayed steps are all commands, which serializes every
//! mutation of a session without locks while different sessions run in parallel.
//!
//! ### Typed Outboxes
//! The core never touches sockets. Each connection is a `ConnectionHandle` wrapping an
//! unbounded channel of `ServerEvent`s; the transport adapter drains it to the wire.
//!
//! ### Single Live Timer
//! A session's countdown can only be replaced, never duplicated. Expiries carry a token
//! so a countdown that was replaced while its message was in flight is ignored.
//!
//! ## Module Organization
//!
//! ### Session Modules (`session`, `scheduler`, `registry`)
//! - `session`: session state, the actor and its lifecycle operations
//! - `scheduler`: question progression, time-up handling and auto-advance
//! - `registry`: the process-wide table of live sessions
//!
//! ### Rules Modules (`format`, `scoring`, `game_state`, `leaderboard`)
//! - Per-format constant tables and hint texts
//! - Answer evaluation and point calculation
//! - Board race, escape room, story path, debate, tycoon, crossword and generic state
//! - Deterministic ranking
//!
//! ### Support Modules (`participant`, `timer`, `content`, `persistence`, `config`, `error`)
//! - Participant bookkeeping and connection outboxes
//! - The cancellable question countdown
//! - Content provider and result store collaborators
//! - Timing constants, server configuration and the error taxonomy
//!
//! ### Network Module (`network`)
//! WebSocket transport: one JSON text frame per event in both directions.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Timings;
//! use server::content::StaticContent;
//! use server::network::Server;
//! use server::persistence::MemoryStore;
//! use server::registry::Registry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let content = StaticContent::from_json_file("sessions.json")?;
//!     let registry = Registry::new(
//!         Arc::new(content),
//!         Arc::new(MemoryStore::new()),
//!         Timings::default(),
//!     );
//!
//!     // Accepts WebSocket clients and routes their events to session actors
//!     let mut server = Server::new("127.0.0.1:8080", registry).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod format;
pub mod game_state;
pub mod leaderboard;
pub mod network;
pub mod participant;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod timer;

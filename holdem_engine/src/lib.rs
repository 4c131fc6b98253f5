//! # Hold'em Engine
//!
//! A real-time Texas Hold'em engine for online tournaments and cash games.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! - [`game`]: cards and hand evaluation, the action validator, the pot
//!   accountant and the per-hand state machine. Pure and deterministic
//!   given a deck seed.
//! - [`table`]: one Tokio actor per table. It is the only writer of its
//!   seats and hand, enforces turn deadlines and emits an ordered event
//!   stream.
//! - [`tournament`]: Sit-n-Go lifecycle driving several tables.
//! - [`cash`]: cash game sessions around a single table.
//! - [`ledger`]: persistent chip balances, changed only by transactions.
//! - [`engine`]: the facade exposing all of the above by id.
//!
//! Storage and event delivery are collaborators behind the
//! [`db::Repository`] and [`broadcast::Broadcaster`] traits.
//!
//! ## Example
//!
//! ```no_run
//! use holdem_engine::{Engine, EngineConfig, broadcast::NoopBroadcaster, db::InMemoryRepository};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(
//!         Arc::new(InMemoryRepository::new()),
//!         Arc::new(NoopBroadcaster),
//!         EngineConfig::from_env()?,
//!     );
//!     engine.ledger().grant(1, 1_000).await?;
//!     let game = engine
//!         .create_cash_game(Some(1), Default::default())
//!         .await?;
//!     engine.join_cash_game(game.id, Some(1), 500, None).await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod cash;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod events;
pub mod game;
pub mod ledger;
pub mod table;
pub mod tournament;

pub use config::EngineConfig;
pub use engine::Engine;
pub use errors::{EngineError, EngineResult};
pub use events::{EngineEvent, EventEnvelope, EventKind};
pub use game::{
    Action, ActionKind, Blinds, Card, Chips, Deck, Hand, HandPhase, HandView, PlayerId, SeatIndex,
    TableId, constants,
};

//! Tables: one actor per table owning seats and the running hand.
//!
//! ## Architecture
//!
//! Each table runs in a separate Tokio task with an mpsc message inbox.
//! Player actions, turn-clock expiries and seat changes are all messages,
//! so a table applies exactly one mutation at a time. The TableManager
//! spawns and looks up TableActor instances and runs cross-table work in
//! ascending table-id order.

pub mod actor;
pub mod config;
pub mod manager;
pub mod messages;
pub mod models;

pub use actor::{TableActor, TableHandle, TableOptions};
pub use config::{TableConfig, TableSpeed};
pub use manager::TableManager;
pub use messages::{ActionOutcome, PollResponse, TableMessage, TableNotice};
pub use models::{SeatView, Table, TableOwner, TableStatus, TableView};

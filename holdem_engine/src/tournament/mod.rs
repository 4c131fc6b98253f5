//! Sit-n-Go tournaments.
//!
//! A tournament collects buy-ins while registering, starts on countdown
//! expiry, a unanimous ready-check or an early-start vote, then seats its
//! players across table actors that share one blind level. Tables report
//! finished hands back over a channel; the manager assigns finishing
//! positions, pays prizes and rebalances tables between hands.

pub mod manager;
pub mod models;
pub mod seating;

pub use manager::TournamentManager;
pub use models::{
    BlindLevel, Countdown, PrizeStructure, Standing, Tournament, TournamentConfig, TournamentId,
    TournamentRegistration, TournamentState,
};
pub use seating::{RebalancePlan, SeatMove, initial_seating, plan_rebalance};

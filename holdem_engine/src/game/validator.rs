//! Legal-action computation for the seat to act.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entities::{Action, ActionKind, Chips, SeatStatus};
use crate::errors::{EngineError, EngineResult};

/// Everything the validator needs to know about the acting seat.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActionContext {
    pub status: SeatStatus,
    pub stack: Chips,
    /// Chips the seat has put in on this street.
    pub seat_bet: Chips,
    /// Street total every live seat must match.
    pub current_bet: Chips,
    /// Smallest legal raise increment above `current_bet`.
    pub min_raise: Chips,
    pub big_blind: Chips,
    /// False once the seat has acted and only short all-ins came after,
    /// leaving it call or fold.
    pub can_raise: bool,
}

impl ActionContext {
    fn to_call(&self) -> Chips {
        self.current_bet.saturating_sub(self.seat_bet)
    }

    /// Largest street total the seat can reach.
    fn max_total(&self) -> Chips {
        self.seat_bet.saturating_add(self.stack)
    }

    fn min_raise_to(&self) -> Chips {
        self.current_bet.saturating_add(self.min_raise)
    }

    /// Shoving would put in more than calling does.
    fn shove_raises(&self) -> bool {
        self.current_bet > 0 && self.stack > self.to_call()
    }
}

/// A legal action with its exact or bounded amount. Bet and raise bounds
/// are street totals.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionChoice {
    Fold,
    Check,
    Call { amount: Chips },
    Bet { min: Chips, max: Chips },
    Raise { min: Chips, max: Chips },
    AllIn { amount: Chips },
}

impl ActionChoice {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Fold => ActionKind::Fold,
            Self::Check => ActionKind::Check,
            Self::Call { .. } => ActionKind::Call,
            Self::Bet { .. } => ActionKind::Bet,
            Self::Raise { .. } => ActionKind::Raise,
            Self::AllIn { .. } => ActionKind::AllIn,
        }
    }
}

impl fmt::Display for ActionChoice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Fold => write!(f, "fold"),
            Self::Check => write!(f, "check"),
            Self::Call { amount } => write!(f, "call {amount}"),
            Self::Bet { min, max } => write!(f, "bet {min}..={max}"),
            Self::Raise { min, max } => write!(f, "raise {min}..={max}"),
            Self::AllIn { amount } => write!(f, "all-in {amount}"),
        }
    }
}

/// What a validated action does to the seat, computed without mutating
/// anything.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Commitment {
    pub kind: ActionKind,
    /// Chips moved from the stack into the pot.
    pub chips: Chips,
    /// The seat's street total after the action.
    pub street_total: Chips,
    /// The action leaves the seat with no chips behind.
    pub all_in: bool,
}

/// Legal actions for a seat. Empty when the seat cannot act.
pub fn legal_actions(ctx: &ActionContext) -> Vec<ActionChoice> {
    if ctx.status != SeatStatus::Active || ctx.stack == 0 {
        return Vec::new();
    }

    let mut choices = Vec::with_capacity(5);
    choices.push(ActionChoice::Fold);
    if ctx.seat_bet == ctx.current_bet {
        choices.push(ActionChoice::Check);
    }
    if ctx.seat_bet < ctx.current_bet {
        choices.push(ActionChoice::Call {
            amount: ctx.to_call().min(ctx.stack),
        });
    }
    if ctx.current_bet == 0 {
        choices.push(ActionChoice::Bet {
            min: ctx.big_blind.min(ctx.stack),
            max: ctx.max_total(),
        });
    } else if ctx.can_raise {
        let min = ctx.min_raise_to();
        if ctx.max_total() >= min {
            choices.push(ActionChoice::Raise {
                min,
                max: ctx.max_total(),
            });
        }
    }
    if ctx.can_raise || !ctx.shove_raises() {
        choices.push(ActionChoice::AllIn { amount: ctx.stack });
    }
    choices
}

/// Check `action` against the legal set and compute its effect.
///
/// # Errors
///
/// * `EngineError::InvalidAction` - the action is not legal for this seat
pub fn validate(ctx: &ActionContext, action: Action) -> EngineResult<Commitment> {
    if ctx.status != SeatStatus::Active || ctx.stack == 0 {
        return Err(EngineError::InvalidAction(format!(
            "seat is {} and cannot act",
            ctx.status
        )));
    }

    let commit = |kind, chips: Chips| Commitment {
        kind,
        chips,
        street_total: ctx.seat_bet.saturating_add(chips),
        all_in: chips == ctx.stack,
    };

    match action {
        Action::Fold => Ok(commit(ActionKind::Fold, 0)),
        Action::Check => {
            if ctx.seat_bet != ctx.current_bet {
                return Err(EngineError::InvalidAction(format!(
                    "cannot check facing {} to call",
                    ctx.to_call()
                )));
            }
            Ok(commit(ActionKind::Check, 0))
        }
        Action::Call => {
            if ctx.seat_bet >= ctx.current_bet {
                return Err(EngineError::InvalidAction("nothing to call".to_string()));
            }
            Ok(commit(ActionKind::Call, ctx.to_call().min(ctx.stack)))
        }
        Action::Bet(to) => {
            if ctx.current_bet > 0 {
                return Err(EngineError::InvalidAction(format!(
                    "cannot bet into {}; raise instead",
                    ctx.current_bet
                )));
            }
            check_ceiling(ctx, to)?;
            let min = ctx.big_blind.min(ctx.stack);
            if to < min {
                return Err(EngineError::InvalidAction(format!(
                    "bet must be at least {min}"
                )));
            }
            Ok(commit(ActionKind::Bet, to - ctx.seat_bet))
        }
        Action::Raise(to) => {
            if ctx.current_bet == 0 {
                return Err(EngineError::InvalidAction(
                    "nothing to raise; bet instead".to_string(),
                ));
            }
            if !ctx.can_raise {
                return Err(EngineError::InvalidAction(
                    "a short all-in does not reopen the betting".to_string(),
                ));
            }
            check_ceiling(ctx, to)?;
            let min = ctx.min_raise_to();
            if to < min {
                return Err(EngineError::InvalidAction(format!(
                    "raise must be to at least {min}"
                )));
            }
            Ok(commit(ActionKind::Raise, to - ctx.seat_bet))
        }
        Action::AllIn => {
            if !ctx.can_raise && ctx.shove_raises() {
                return Err(EngineError::InvalidAction(
                    "a short all-in does not reopen the betting; call or fold".to_string(),
                ));
            }
            Ok(commit(ActionKind::AllIn, ctx.stack))
        }
    }
}

fn check_ceiling(ctx: &ActionContext, to: Chips) -> EngineResult<()> {
    if to > ctx.max_total() {
        return Err(EngineError::InvalidAction(format!(
            "{to} exceeds available {}",
            ctx.max_total()
        )));
    }
    Ok(())
}

//! Chip ledger: every persistent balance change goes through here.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::models::{ChipTransaction, NewTransaction, TransactionCause};
use crate::{
    db::Repository,
    errors::{EngineError, EngineResult},
    game::entities::PlayerId,
};

/// Build a unique idempotency key for a ledger movement
///
/// # Arguments
///
/// * `prefix` - What the movement is for, e.g. `buy_in`
/// * `player_id` - Player whose balance moves
pub fn idempotency_key(prefix: &str, player_id: PlayerId) -> String {
    format!(
        "{prefix}_{player_id}_{}_{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4()
    )
}

/// Ledger facade over a `Repository`
#[derive(Clone)]
pub struct ChipLedger {
    repository: Arc<dyn Repository>,
}

impl ChipLedger {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Current balance of `player_id`
    pub async fn balance(&self, player_id: PlayerId) -> EngineResult<i64> {
        self.repository.balance(player_id).await
    }

    /// Grant chips to a player outside of play
    pub async fn grant(&self, player_id: PlayerId, amount: i64) -> EngineResult<ChipTransaction> {
        self.credit(player_id, amount, TransactionCause::Bonus, None)
            .await
    }

    /// Take `amount` chips from a player's balance
    ///
    /// # Errors
    ///
    /// * `EngineError::Validation` - amount is not positive
    /// * `EngineError::InsufficientChips` - balance does not cover it
    pub async fn debit(
        &self,
        player_id: PlayerId,
        amount: i64,
        cause: TransactionCause,
        reference: Option<String>,
    ) -> EngineResult<ChipTransaction> {
        check_positive(amount)?;
        let tx = self
            .repository
            .record_transaction(&NewTransaction {
                player_id,
                amount: -amount,
                cause,
                reference,
                idempotency_key: idempotency_key(&cause.to_string(), player_id),
            })
            .await?;
        log::debug!(
            "Debited {amount} from player {player_id} ({cause}), balance {}",
            tx.balance_after
        );
        Ok(tx)
    }

    /// Return `amount` chips to a player's balance
    pub async fn credit(
        &self,
        player_id: PlayerId,
        amount: i64,
        cause: TransactionCause,
        reference: Option<String>,
    ) -> EngineResult<ChipTransaction> {
        check_positive(amount)?;
        let tx = self
            .repository
            .record_transaction(&NewTransaction {
                player_id,
                amount,
                cause,
                reference,
                idempotency_key: idempotency_key(&cause.to_string(), player_id),
            })
            .await?;
        log::debug!(
            "Credited {amount} to player {player_id} ({cause}), balance {}",
            tx.balance_after
        );
        Ok(tx)
    }

    /// Record a movement with a caller-chosen idempotency key. Retrying
    /// with the same key yields `DuplicateTransaction` and moves nothing.
    pub async fn record(&self, tx: NewTransaction) -> EngineResult<ChipTransaction> {
        if tx.amount == 0 {
            return Err(EngineError::Validation(
                "Transaction amount must be non-zero".to_string(),
            ));
        }
        self.repository.record_transaction(&tx).await
    }

    /// Most recent transactions of `player_id`, newest first
    pub async fn history(
        &self,
        player_id: PlayerId,
        limit: usize,
    ) -> EngineResult<Vec<ChipTransaction>> {
        self.repository.transactions(player_id, limit).await
    }
}

fn check_positive(amount: i64) -> EngineResult<()> {
    if amount <= 0 {
        return Err(EngineError::Validation(format!(
            "Amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

//! Repository trait and its PostgreSQL implementation.
//!
//! Engine records (tables, hands, tournaments, cash games) are stored as
//! JSONB documents. The chip ledger is relational so the non-negative
//! balance rule and idempotency keys are enforced inside one transaction.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{PgPool, Postgres, Row, Transaction, types::Json};
use tokio::time::timeout;

use super::timeouts::{DEFAULT_TRANSACTION_TIMEOUT, with_default_timeout, with_timeout};
use crate::{
    cash::{CashGame, CashGameId},
    errors::{EngineError, EngineResult},
    game::{
        entities::{PlayerId, TableId},
        hand::{Hand, HandId},
    },
    ledger::{ChipTransaction, NewTransaction, TransactionCause},
    table::Table,
    tournament::{Tournament, TournamentId},
};

const SCHEMA: &str = include_str!("../../migrations/0001_engine.sql");

/// Id sequences handed out by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Table,
    Tournament,
    CashGame,
}

/// Storage boundary of the engine. Each call is atomic on its own.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn next_id(&self, kind: IdKind) -> EngineResult<i64>;

    async fn save_table(&self, table: &Table) -> EngineResult<()>;
    async fn load_table(&self, id: TableId) -> EngineResult<Option<Table>>;

    /// Store a hand, ignoring writes older than the stored version.
    async fn save_hand(&self, hand: &Hand) -> EngineResult<()>;
    async fn load_hand(&self, id: HandId) -> EngineResult<Option<Hand>>;

    async fn save_tournament(&self, tournament: &Tournament) -> EngineResult<()>;
    async fn load_tournament(&self, id: TournamentId) -> EngineResult<Option<Tournament>>;

    async fn save_cash_game(&self, game: &CashGame) -> EngineResult<()>;
    async fn load_cash_game(&self, id: CashGameId) -> EngineResult<Option<CashGame>>;

    /// Current balance; zero for players with no history.
    async fn balance(&self, player_id: PlayerId) -> EngineResult<i64>;

    /// Apply one signed balance change and record it.
    ///
    /// # Errors
    ///
    /// * `EngineError::DuplicateTransaction` - idempotency key already used
    /// * `EngineError::InsufficientChips` - the balance would go negative
    async fn record_transaction(&self, tx: &NewTransaction) -> EngineResult<ChipTransaction>;

    /// Most recent transactions first.
    async fn transactions(
        &self,
        player_id: PlayerId,
        limit: usize,
    ) -> EngineResult<Vec<ChipTransaction>>;
}

/// PostgreSQL implementation of `Repository`
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the engine schema if it does not exist.
    pub async fn migrate(&self) -> EngineResult<()> {
        with_timeout(
            DEFAULT_TRANSACTION_TIMEOUT,
            sqlx::raw_sql(SCHEMA).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn upsert_doc<T>(&self, table: &'static str, id: i64, doc: &T) -> EngineResult<()>
    where
        T: Serialize + Sync,
    {
        let sql = format!(
            "INSERT INTO {table} (id, doc, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = NOW()"
        );
        with_default_timeout(
            sqlx::query(&sql)
                .bind(id)
                .bind(Json(doc))
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn load_doc<T>(&self, table: &'static str, id: i64) -> EngineResult<Option<T>>
    where
        T: DeserializeOwned + Send + Unpin + 'static,
    {
        let sql = format!("SELECT doc FROM {table} WHERE id = $1");
        let row = with_default_timeout(sqlx::query(&sql).bind(id).fetch_optional(&self.pool))
            .await?;
        Ok(row
            .map(|r| r.try_get::<Json<T>, _>("doc"))
            .transpose()?
            .map(|doc| doc.0))
    }

    async fn record_in_tx(&self, new: &NewTransaction) -> EngineResult<ChipTransaction> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM chip_transactions WHERE idempotency_key = $1")
            .bind(&new.idempotency_key)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(EngineError::DuplicateTransaction(new.idempotency_key.clone()));
        }

        let balance_after: i64 = if new.amount < 0 {
            // Check and debit in one statement so concurrent debits cannot
            // overdraw.
            let row = sqlx::query(
                "UPDATE chip_balances
                 SET balance = balance + $1, updated_at = NOW()
                 WHERE player_id = $2 AND balance + $1 >= 0
                 RETURNING balance",
            )
            .bind(new.amount)
            .bind(new.player_id)
            .fetch_optional(&mut *tx)
            .await?;
            match row {
                Some(row) => row.get("balance"),
                None => {
                    let available: Option<i64> =
                        sqlx::query_scalar("SELECT balance FROM chip_balances WHERE player_id = $1")
                            .bind(new.player_id)
                            .fetch_optional(&mut *tx)
                            .await?;
                    return Err(EngineError::InsufficientChips {
                        required: -new.amount,
                        available: available.unwrap_or(0),
                    });
                }
            }
        } else {
            sqlx::query(
                "INSERT INTO chip_balances (player_id, balance, updated_at)
                 VALUES ($1, $2, NOW())
                 ON CONFLICT (player_id)
                 DO UPDATE SET balance = chip_balances.balance + EXCLUDED.balance, updated_at = NOW()
                 RETURNING balance",
            )
            .bind(new.player_id)
            .bind(new.amount)
            .fetch_one(&mut *tx)
            .await?
            .get("balance")
        };

        let row = sqlx::query(
            "INSERT INTO chip_transactions
                (player_id, amount, balance_after, cause, reference, idempotency_key)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, created_at",
        )
        .bind(new.player_id)
        .bind(new.amount)
        .bind(balance_after)
        .bind(new.cause.to_string())
        .bind(&new.reference)
        .bind(&new.idempotency_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChipTransaction {
            id: row.get("id"),
            player_id: new.player_id,
            amount: new.amount,
            balance_after,
            cause: new.cause,
            reference: new.reference.clone(),
            idempotency_key: new.idempotency_key.clone(),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn next_id(&self, kind: IdKind) -> EngineResult<i64> {
        let sequence = match kind {
            IdKind::Table => "engine_table_ids",
            IdKind::Tournament => "engine_tournament_ids",
            IdKind::CashGame => "engine_cash_game_ids",
        };
        let id: i64 = with_default_timeout(
            sqlx::query_scalar("SELECT nextval($1::regclass)")
                .bind(sequence)
                .fetch_one(&self.pool),
        )
        .await?;
        Ok(id)
    }

    async fn save_table(&self, table: &Table) -> EngineResult<()> {
        self.upsert_doc("engine_tables", table.id, table).await
    }

    async fn load_table(&self, id: TableId) -> EngineResult<Option<Table>> {
        self.load_doc("engine_tables", id).await
    }

    async fn save_hand(&self, hand: &Hand) -> EngineResult<()> {
        with_default_timeout(
            sqlx::query(
                "INSERT INTO engine_hands (id, table_id, hand_number, version, doc, updated_at)
                 VALUES ($1, $2, $3, $4, $5, NOW())
                 ON CONFLICT (id) DO UPDATE
                 SET version = EXCLUDED.version, doc = EXCLUDED.doc, updated_at = NOW()
                 WHERE engine_hands.version <= EXCLUDED.version",
            )
            .bind(hand.id)
            .bind(hand.table_id)
            .bind(hand.hand_number as i64)
            .bind(hand.version as i64)
            .bind(Json(hand))
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn load_hand(&self, id: HandId) -> EngineResult<Option<Hand>> {
        let row = with_default_timeout(
            sqlx::query("SELECT doc FROM engine_hands WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row
            .map(|r| r.try_get::<Json<Hand>, _>("doc"))
            .transpose()?
            .map(|doc| doc.0))
    }

    async fn save_tournament(&self, tournament: &Tournament) -> EngineResult<()> {
        self.upsert_doc("engine_tournaments", tournament.id, tournament)
            .await
    }

    async fn load_tournament(&self, id: TournamentId) -> EngineResult<Option<Tournament>> {
        self.load_doc("engine_tournaments", id).await
    }

    async fn save_cash_game(&self, game: &CashGame) -> EngineResult<()> {
        self.upsert_doc("engine_cash_games", game.id, game).await
    }

    async fn load_cash_game(&self, id: CashGameId) -> EngineResult<Option<CashGame>> {
        self.load_doc("engine_cash_games", id).await
    }

    async fn balance(&self, player_id: PlayerId) -> EngineResult<i64> {
        let balance: Option<i64> = with_default_timeout(
            sqlx::query_scalar("SELECT balance FROM chip_balances WHERE player_id = $1")
                .bind(player_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(balance.unwrap_or(0))
    }

    async fn record_transaction(&self, new: &NewTransaction) -> EngineResult<ChipTransaction> {
        timeout(DEFAULT_TRANSACTION_TIMEOUT, self.record_in_tx(new))
            .await
            .map_err(|_| EngineError::Timeout(DEFAULT_TRANSACTION_TIMEOUT))?
    }

    async fn transactions(
        &self,
        player_id: PlayerId,
        limit: usize,
    ) -> EngineResult<Vec<ChipTransaction>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT id, player_id, amount, balance_after, cause, reference,
                        idempotency_key, created_at
                 FROM chip_transactions
                 WHERE player_id = $1
                 ORDER BY id DESC
                 LIMIT $2",
            )
            .bind(player_id)
            .bind(limit as i64)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter()
            .map(|r| {
                let cause: TransactionCause = r
                    .get::<String, _>("cause")
                    .parse()
                    .map_err(|e: String| EngineError::Database(sqlx::Error::Decode(e.into())))?;
                Ok(ChipTransaction {
                    id: r.get("id"),
                    player_id: r.get("player_id"),
                    amount: r.get("amount"),
                    balance_after: r.get("balance_after"),
                    cause,
                    reference: r.get("reference"),
                    idempotency_key: r.get("idempotency_key"),
                    created_at: r.get("created_at"),
                })
            })
            .collect()
    }
}

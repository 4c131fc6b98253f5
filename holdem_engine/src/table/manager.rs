//! Table manager for spawning and managing multiple table actors.

use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::{RwLock, mpsc, watch};

use super::{
    actor::{TableActor, TableHandle, TableOptions},
    config::TableConfig,
    messages::TableNotice,
    models::{Table, TableOwner, TableView},
};
use crate::{
    broadcast::Broadcaster,
    config::EngineConfig,
    db::{IdKind, Repository},
    errors::{EngineError, EngineResult},
    game::entities::{Blinds, Chips, PlayerId, TableId},
};

/// Table manager for managing multiple table instances
pub struct TableManager {
    repository: Arc<dyn Repository>,
    broadcaster: Arc<dyn Broadcaster>,
    config: EngineConfig,

    /// Running table handles
    tables: Arc<RwLock<HashMap<TableId, TableHandle>>>,
}

impl TableManager {
    pub fn new(
        repository: Arc<dyn Repository>,
        broadcaster: Arc<dyn Broadcaster>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            broadcaster,
            config,
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create and spawn a new table
    ///
    /// # Arguments
    ///
    /// * `config` - Table configuration
    /// * `owner` - Tournament or cash game the table belongs to
    /// * `blinds` - Shared blind level, for tournament tables
    /// * `notices` - Where hand-complete notices go
    ///
    /// # Errors
    ///
    /// * `EngineError::Validation` - invalid table configuration
    pub async fn create_table(
        &self,
        config: TableConfig,
        owner: TableOwner,
        blinds: Option<watch::Receiver<Blinds>>,
        notices: Option<mpsc::UnboundedSender<TableNotice>>,
    ) -> EngineResult<TableHandle> {
        config.validate().map_err(EngineError::Validation)?;

        let table_id = self.repository.next_id(IdKind::Table).await?;
        let table = Table::new(table_id, config, owner);
        let options = TableOptions {
            blinds,
            notices,
            ..TableOptions::from_config(&self.config)
        };
        let handle = TableActor::spawn(
            table,
            options,
            self.repository.clone(),
            self.broadcaster.clone(),
        );

        self.tables.write().await.insert(table_id, handle.clone());
        log::info!("Created table {table_id} for {owner:?}");
        Ok(handle)
    }

    /// Get a running table
    pub async fn get(&self, table_id: TableId) -> EngineResult<TableHandle> {
        self.tables
            .read()
            .await
            .get(&table_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("Table", table_id))
    }

    /// Stop a table, voiding any live hand. Returns what each player is
    /// owed, as `TableHandle::close` does.
    pub async fn close_table(&self, table_id: TableId) -> EngineResult<Vec<(PlayerId, Chips)>> {
        let handle = self
            .tables
            .write()
            .await
            .remove(&table_id)
            .ok_or_else(|| EngineError::not_found("Table", table_id))?;
        let stacks = handle.close().await?;
        log::info!("Closed table {table_id}");
        Ok(stacks)
    }

    /// Ids of running tables, ascending
    pub async fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Run `op` against each listed table, one table at a time in
    /// ascending id order. Missing tables report `NotFound`.
    pub async fn for_each_ordered<F, Fut, T>(
        &self,
        table_ids: &[TableId],
        mut op: F,
    ) -> Vec<(TableId, EngineResult<T>)>
    where
        F: FnMut(TableHandle) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut ids = table_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut results = Vec::with_capacity(ids.len());
        for table_id in ids {
            let result = match self.get(table_id).await {
                Ok(handle) => op(handle).await,
                Err(e) => Err(e),
            };
            results.push((table_id, result));
        }
        results
    }

    /// Snapshots of every running table
    pub async fn list_tables(&self, viewer: Option<PlayerId>) -> Vec<TableView> {
        let ids = self.table_ids().await;
        self.for_each_ordered(&ids, |handle| async move { handle.snapshot(viewer).await })
            .await
            .into_iter()
            .filter_map(|(_, view)| view.ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{broadcast::NoopBroadcaster, db::InMemoryRepository};

    fn manager() -> TableManager {
        TableManager::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(NoopBroadcaster),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_create_and_close() {
        let manager = manager();
        let handle = manager
            .create_table(TableConfig::default(), TableOwner::CashGame(1), None, None)
            .await
            .unwrap();
        assert_eq!(handle.table_id(), 1);
        handle.seat_player(5, 300, None).await.unwrap();

        assert_eq!(manager.list_tables(None).await.len(), 1);
        assert_eq!(manager.close_table(1).await.unwrap(), vec![(5, 300)]);
        assert!(matches!(
            manager.get(1).await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let manager = manager();
        let config = TableConfig {
            max_players: 1,
            ..TableConfig::default()
        };
        assert!(matches!(
            manager
                .create_table(config, TableOwner::CashGame(1), None, None)
                .await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_ordered_operations() {
        let manager = manager();
        for _ in 0..3 {
            manager
                .create_table(TableConfig::default(), TableOwner::Tournament(1), None, None)
                .await
                .unwrap();
        }
        let results = manager
            .for_each_ordered(&[3, 1, 9, 2, 1], |handle| async move {
                Ok(handle.table_id())
            })
            .await;
        let ids: Vec<TableId> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3, 9]);
        assert!(results[3].1.is_err());
    }
}

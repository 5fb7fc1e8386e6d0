// world_server/server/src/persistence/mod.rs
pub mod memory;
pub mod records;

use crate::core::error::StoreError;
use crate::core::types::{AccountId, SpawnId, ZoneId};
use async_trait::async_trait;
use records::{CharacterRecord, SpawnPoolEntry, ZoneStaticData};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq)]
pub struct NewCharacter {
    pub name: String,
    pub race: u32,
    pub char_class: u32,
    pub gender: u32,
    pub start_zone: ZoneId,
}

/// Storage collaborator. Every call is I/O from the core's point of view and
/// must be awaited through `with_timeout`.
#[async_trait]
pub trait WorldStore: Send + Sync {
    async fn load_zone_static(&self, zone_id: ZoneId) -> Result<ZoneStaticData, StoreError>;

    async fn load_spawn_pool(&self, short_name: &str) -> Result<HashMap<SpawnId, SpawnPoolEntry>, StoreError>;

    async fn get_or_create_account(&self, identity: &str) -> Result<AccountId, StoreError>;

    async fn character_list(&self, account_id: AccountId) -> Result<Vec<CharacterRecord>, StoreError>;

    async fn create_character(&self, account_id: AccountId, request: NewCharacter)
        -> Result<CharacterRecord, StoreError>;

    async fn delete_character(&self, account_id: AccountId, name: &str) -> Result<(), StoreError>;

    async fn load_character(&self, name: &str) -> Result<CharacterRecord, StoreError>;

    async fn save_character(&self, record: &CharacterRecord) -> Result<(), StoreError>;
}

pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Storage call exceeded {:?}", limit);
            Err(StoreError::Timeout(limit.as_millis() as u64))
        }
    }
}

// world_server/server/src/persistence/memory.rs
use super::records::{
    CharacterRecord, NpcTemplate, SpawnCandidate, SpawnPoolEntry, ZoneStaticData,
};
use super::{NewCharacter, WorldStore};
use crate::core::error::{ServerError, ServerResult, StoreError};
use crate::core::types::{AccountId, Position, SpawnId, ZoneId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct SpawnCandidateData {
    pub template_id: u32,
    pub chance: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpawnPointData {
    pub spawn_id: SpawnId,
    /// Zone short name.
    pub zone: String,
    pub position: Position,
    #[serde(default)]
    pub grid_id: Option<u32>,
    #[serde(default)]
    pub candidates: Vec<SpawnCandidateData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountData {
    pub id: AccountId,
    pub identity: String,
}

/// World content document, usually `data/world.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorldData {
    pub zones: Vec<ZoneStaticData>,
    pub npc_templates: Vec<NpcTemplate>,
    pub spawns: Vec<SpawnPointData>,
    pub accounts: Vec<AccountData>,
    pub characters: Vec<CharacterRecord>,
}

/// In-process `WorldStore` backed by a YAML document. Characters and
/// accounts created at runtime live only as long as the process.
pub struct MemoryStore {
    zones: HashMap<ZoneId, ZoneStaticData>,
    templates: HashMap<u32, Arc<NpcTemplate>>,
    spawns: HashMap<String, Vec<SpawnPointData>>,
    accounts: DashMap<String, AccountId>,
    characters: DashMap<String, CharacterRecord>,
    next_account_id: AtomicI64,
    next_character_id: AtomicI64,
}

impl MemoryStore {
    pub fn new(data: WorldData) -> Self {
        let next_account_id = data.accounts.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let next_character_id = data.characters.iter().map(|c| c.id).max().unwrap_or(0) + 1;

        let mut spawns: HashMap<String, Vec<SpawnPointData>> = HashMap::new();
        for point in data.spawns {
            spawns.entry(point.zone.clone()).or_default().push(point);
        }

        let store = MemoryStore {
            zones: data.zones.into_iter().map(|z| (z.zone_id, z)).collect(),
            templates: data.npc_templates.into_iter().map(|t| (t.id, Arc::new(t))).collect(),
            spawns,
            accounts: data.accounts.into_iter().map(|a| (a.identity, a.id)).collect(),
            characters: data.characters.into_iter().map(|c| (name_key(&c.name), c)).collect(),
            next_account_id: AtomicI64::new(next_account_id),
            next_character_id: AtomicI64::new(next_character_id),
        };
        info!(
            "Memory store ready: {} zones, {} npc templates, {} characters",
            store.zones.len(),
            store.templates.len(),
            store.characters.len()
        );
        store
    }

    pub fn from_yaml_str(raw: &str) -> ServerResult<Self> {
        let data: WorldData =
            serde_yaml::from_str(raw).map_err(|e| ServerError::ConfigError(format!("world data: {}", e)))?;
        Ok(Self::new(data))
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }
}

fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[async_trait]
impl WorldStore for MemoryStore {
    async fn load_zone_static(&self, zone_id: ZoneId) -> Result<ZoneStaticData, StoreError> {
        self.zones.get(&zone_id).cloned().ok_or(StoreError::ZoneNotFound(zone_id))
    }

    async fn load_spawn_pool(&self, short_name: &str) -> Result<HashMap<SpawnId, SpawnPoolEntry>, StoreError> {
        let Some(points) = self.spawns.get(short_name) else {
            return Ok(HashMap::new());
        };
        let mut pool = HashMap::with_capacity(points.len());
        for point in points {
            let candidates = point
                .candidates
                .iter()
                .filter_map(|c| match self.templates.get(&c.template_id) {
                    Some(template) => Some(SpawnCandidate { template: template.clone(), chance: c.chance }),
                    None => {
                        warn!("Spawn {} references unknown npc template {}", point.spawn_id, c.template_id);
                        None
                    }
                })
                .collect();
            pool.insert(
                point.spawn_id,
                SpawnPoolEntry {
                    spawn_id: point.spawn_id,
                    position: point.position,
                    grid_id: point.grid_id,
                    candidates,
                },
            );
        }
        debug!("Loaded {} spawn points for {}", pool.len(), short_name);
        Ok(pool)
    }

    async fn get_or_create_account(&self, identity: &str) -> Result<AccountId, StoreError> {
        let id = *self
            .accounts
            .entry(identity.to_string())
            .or_insert_with(|| self.next_account_id.fetch_add(1, Ordering::Relaxed));
        Ok(id)
    }

    async fn character_list(&self, account_id: AccountId) -> Result<Vec<CharacterRecord>, StoreError> {
        let mut list: Vec<CharacterRecord> = self
            .characters
            .iter()
            .filter(|c| c.account_id == account_id)
            .map(|c| c.value().clone())
            .collect();
        list.sort_by_key(|c| c.id);
        Ok(list)
    }

    async fn create_character(
        &self,
        account_id: AccountId,
        request: NewCharacter,
    ) -> Result<CharacterRecord, StoreError> {
        let zone = self
            .zones
            .get(&request.start_zone)
            .ok_or(StoreError::ZoneNotFound(request.start_zone))?;

        match self.characters.entry(name_key(&request.name)) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::NameTaken(request.name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let record = CharacterRecord {
                    id: self.next_character_id.fetch_add(1, Ordering::Relaxed),
                    account_id,
                    name: request.name,
                    level: 1,
                    race: request.race,
                    char_class: request.char_class,
                    gender: request.gender,
                    zone_id: zone.zone_id,
                    instance_id: 0,
                    position: zone.safe_point,
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn delete_character(&self, account_id: AccountId, name: &str) -> Result<(), StoreError> {
        self.characters
            .remove_if(&name_key(name), |_, c| c.account_id == account_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::CharacterNotFound(name.to_string()))
    }

    async fn load_character(&self, name: &str) -> Result<CharacterRecord, StoreError> {
        self.characters
            .get(&name_key(name))
            .map(|c| c.value().clone())
            .ok_or_else(|| StoreError::CharacterNotFound(name.to_string()))
    }

    async fn save_character(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        match self.characters.get_mut(&name_key(&record.name)) {
            Some(mut existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::CharacterNotFound(record.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD: &str = r#"
zones:
  - zone_id: 2
    short_name: qeynos2
    long_name: North Qeynos
    safe_point: { x: 10.0, y: 20.0, z: 3.0 }
npc_templates:
  - { id: 1, name: Guard_Gehnus, level: 20 }
  - { id: 2, name: a_rat }
spawns:
  - spawn_id: 100
    zone: qeynos2
    position: { x: 0.0, y: 0.0, z: 0.0 }
    candidates:
      - { template_id: 1, chance: 70 }
      - { template_id: 99, chance: 30 }
"#;

    #[tokio::test]
    async fn spawn_pool_resolves_known_templates_only() {
        let store = MemoryStore::from_yaml_str(WORLD).unwrap();
        let pool = store.load_spawn_pool("qeynos2").await.unwrap();
        let entry = &pool[&100];
        assert_eq!(entry.candidates.len(), 1);
        assert_eq!(entry.candidates[0].template.name, "Guard_Gehnus");
        assert!(store.load_spawn_pool("nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn character_lifecycle() {
        let store = MemoryStore::from_yaml_str(WORLD).unwrap();
        let account = store.get_or_create_account("local").await.unwrap();
        assert_eq!(store.get_or_create_account("local").await.unwrap(), account);

        let request = NewCharacter { name: "Soandso".into(), race: 1, char_class: 1, gender: 0, start_zone: 2 };
        let created = store.create_character(account, request.clone()).await.unwrap();
        assert_eq!(created.position, Position::new(10.0, 20.0, 3.0, 0.0));
        assert_eq!(
            store.create_character(account, NewCharacter { name: "SOANDSO".into(), ..request }).await,
            Err(StoreError::NameTaken("SOANDSO".into()))
        );

        let other = store.get_or_create_account("someone-else").await.unwrap();
        assert!(store.delete_character(other, "Soandso").await.is_err());
        assert_eq!(store.character_list(account).await.unwrap().len(), 1);
        store.delete_character(account, "soandso").await.unwrap();
        assert!(store.load_character("Soandso").await.is_err());
    }

    #[tokio::test]
    async fn unknown_zone_is_an_error() {
        let store = MemoryStore::from_yaml_str(WORLD).unwrap();
        assert_eq!(store.load_zone_static(77).await, Err(StoreError::ZoneNotFound(77)));
    }
}

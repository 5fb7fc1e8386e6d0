// world_server/server/src/server/zone_manager.rs
use super::instance::{ZoneInstance, ZoneServices};
use crate::core::types::ZoneKey;
use crate::operational::monitoring::metrics;
use crate::persistence::with_timeout;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

type ZoneSlot = Arc<OnceCell<Option<Arc<ZoneInstance>>>>;

/// Owns every live zone instance, keyed by `(zone_id, instance_id)`.
///
/// The map lock is held only for slot lookup. Loading a zone happens inside
/// the slot's `OnceCell`, so concurrent callers for the same key share one
/// load and other keys are never blocked behind storage.
pub struct ZoneManager {
    zones: Mutex<HashMap<ZoneKey, ZoneSlot>>,
    services: ZoneServices,
}

impl ZoneManager {
    pub fn new(services: ZoneServices) -> Self {
        ZoneManager { zones: Mutex::new(HashMap::new()), services }
    }

    pub fn services(&self) -> &ZoneServices {
        &self.services
    }

    /// Returns the running instance for `key`, loading and starting it on
    /// first use. `None` when the zone's static data cannot be loaded.
    pub async fn get_or_create(&self, key: ZoneKey) -> Option<Arc<ZoneInstance>> {
        let slot = {
            let mut zones = self.zones.lock();
            let stale = zones
                .get(&key)
                .and_then(|slot| slot.get())
                .map_or(false, |zone| zone.as_ref().map_or(true, |z| !z.accepts_work()));
            if stale {
                zones.remove(&key);
            }
            zones.entry(key).or_default().clone()
        };

        let zone = slot.get_or_init(|| self.load_and_start(key)).await.clone();
        if zone.is_none() {
            let mut zones = self.zones.lock();
            if zones.get(&key).map_or(false, |current| Arc::ptr_eq(current, &slot)) {
                zones.remove(&key);
            }
        }
        zone
    }

    async fn load_and_start(&self, key: ZoneKey) -> Option<Arc<ZoneInstance>> {
        let limit = self.services.config.storage_timeout();
        let store = self.services.store.clone();

        let static_data = match with_timeout(limit, store.load_zone_static(key.zone_id)).await {
            Ok(data) => data,
            Err(e) => {
                warn!("[{}] cannot load zone data: {}", key, e);
                return None;
            }
        };
        let spawn_pool = match with_timeout(limit, store.load_spawn_pool(&static_data.short_name)).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!("[{}] spawn pool unavailable, starting without NPCs: {}", key, e);
                Default::default()
            }
        };

        info!("[{}] starting {} ({})", key, static_data.long_name, static_data.short_name);
        let zone = ZoneInstance::start(key, static_data, spawn_pool, self.services.clone());
        metrics::set_zones_active(self.len() + 1);
        Some(zone)
    }

    /// Running instance for `key`, without creating one.
    pub fn get(&self, key: ZoneKey) -> Option<Arc<ZoneInstance>> {
        self.zones.lock().get(&key).and_then(|slot| slot.get().cloned().flatten())
    }

    /// Stops and forgets one instance.
    pub async fn remove(&self, key: ZoneKey) -> bool {
        let slot = self.zones.lock().remove(&key);
        let Some(zone) = slot.and_then(|s| s.get().cloned().flatten()) else {
            return false;
        };
        zone.stop().await;
        metrics::set_zones_active(self.len());
        info!("[{}] removed", key);
        true
    }

    pub fn keys(&self) -> Vec<ZoneKey> {
        let mut keys: Vec<ZoneKey> = self.zones.lock().keys().copied().collect();
        keys.sort_unstable_by_key(|k| (k.zone_id, k.instance_id));
        keys
    }

    /// Number of loaded instances.
    pub fn len(&self) -> usize {
        self.zones.lock().values().filter(|slot| matches!(slot.get(), Some(Some(_)))).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every instance and waits for all loops to exit.
    pub async fn shutdown(&self) {
        let slots: Vec<ZoneSlot> = self.zones.lock().drain().map(|(_, slot)| slot).collect();
        let zones: Vec<Arc<ZoneInstance>> = slots.iter().filter_map(|s| s.get().cloned().flatten()).collect();
        info!("Shutting down {} zones", zones.len());
        futures::future::join_all(zones.iter().map(|z| z.stop())).await;
        metrics::set_zones_active(0);
    }
}

// world_server/server/src/server/game_loop.rs
use super::instance::{Zone, ZoneInstance};
use crate::core::constants::SLOW_TICK_LOG_MS;
use crate::core::types::ZoneLifecycle;
use crate::entities::Locatable;
use crate::operational::monitoring::metrics;
use crate::systems::quest::QuestEventType;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Marks the instance stopped however the loop ends, so a panicked zone is
/// replaced on the next lookup instead of collecting a backlog forever.
struct StopOnExit(Arc<ZoneInstance>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("[{}] zone loop panicked, {} queued items abandoned", self.0.key(), self.0.backlog_len());
        }
        self.0.set_lifecycle(ZoneLifecycle::Stopped);
    }
}

/// Actor loop for one zone. Owns `zone` until the quit signal arrives.
pub(crate) async fn run_zone(mut zone: Zone) {
    let handle = zone.handle.clone();
    let _stop_on_exit = StopOnExit(handle.clone());
    let sim_period = zone.config.sim_tick();
    let mut sim_timer = interval(sim_period);
    sim_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut world_timer = interval(zone.config.world_tick());
    world_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if handle.accepts_work() {
        handle.set_lifecycle(ZoneLifecycle::Running);
    }
    info!("[{}] zone loop started ({}). Sim tick: {}ms", handle.key(), zone.short_name(), sim_period.as_millis());

    let mut frame: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = handle.quit.notified() => break,
            _ = handle.backlog.notified() => {
                zone.drain_backlog();
            }
            _ = sim_timer.tick() => {
                let started = Instant::now();
                zone.drain_backlog();
                zone.sim_tick(started, sim_period);
                let elapsed = started.elapsed();
                metrics::record_zone_tick(elapsed);
                if elapsed > Duration::from_millis(SLOW_TICK_LOG_MS) {
                    warn!("[{}] frame {} took too long: {:?}", handle.key(), frame, elapsed);
                }
                frame += 1;
            }
            _ = world_timer.tick() => {
                zone.world_tick(frame);
            }
        }
    }

    // Work accepted before shutdown still runs. Producers re-check the
    // lifecycle after pushing, so anything landing after the second drain
    // has already been reported as refused.
    zone.drain_backlog();
    handle.set_lifecycle(ZoneLifecycle::Stopped);
    zone.drain_backlog();
    zone.evict_all_clients();
    info!("[{}] zone loop exited after {} frames", handle.key(), frame);
}

impl Zone {
    /// Processes every queued inbound item in arrival order.
    pub(crate) fn drain_backlog(&mut self) -> usize {
        let batch = self.handle.backlog.drain();
        let count = batch.len();
        for item in batch {
            self.handle_inbound(item);
        }
        if count > 0 {
            metrics::record_backlog_drained(count);
            trace!("[{}] drained {} backlog items", self.key(), count);
        }
        count
    }

    /// One simulation step: spawns, NPC movement, then position broadcast.
    pub(crate) fn sim_tick(&mut self, now: Instant, step: Duration) {
        self.process_spawns(now);
        self.advance_npcs(now, step);
        self.flush_updates();
    }

    pub(crate) fn process_spawns(&mut self, now: Instant) {
        let decisions = self.spawns.poll(now, &mut self.rng);
        for decision in decisions {
            let spawn_id = decision.spawn_id;
            let name = decision.template.name.clone();
            let id = self.spawn_npc(decision.template, Some(spawn_id), decision.position, decision.grid_id);
            if self.entity_by_id(id).is_none() {
                // A spawn script despawned it straight away; the slot waits out its timer.
                self.spawns.cancel_pending(spawn_id);
                continue;
            }
            self.spawns.bind_occupant(spawn_id, id);
            metrics::record_npc_spawn();
            debug!("[{}] spawned {} (entity {}) at spawn point {}", self.key(), name, id, spawn_id);
        }
    }

    pub(crate) fn advance_npcs(&mut self, now: Instant, step: Duration) {
        let mut moved = Vec::new();
        for id in self.entity_ids() {
            if let Some(npc) = self.npc_mut(id) {
                if npc.advance(now, step) {
                    moved.push((id, npc.position()));
                }
            }
        }
        for (id, position) in moved {
            self.move_entity(id, position);
        }
    }

    /// Slow housekeeping. Only logs for now.
    pub(crate) fn world_tick(&mut self, frame: u64) {
        debug!(
            "[{}] frame {}: {} entities, {} clients, {}/{} spawn points live",
            self.key(),
            frame,
            self.entity_count(),
            self.client_count(),
            self.spawns.live_count(),
            self.spawns.len()
        );
    }

    /// Fires the zone-entry quest event for every NPC near `entity`.
    pub(crate) fn notify_enter_zone(&mut self, entity: crate::core::types::EntityId) {
        let nearby: Vec<_> = self
            .grid
            .subscribers_of(entity)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default();
        for npc in nearby {
            if self.entity_by_id(npc).map_or(false, |e| e.is_npc()) {
                self.invoke_quest_on(npc, QuestEventType::EnterZone, Some(entity), None);
            }
        }
    }
}

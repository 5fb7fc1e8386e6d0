// world_server/server/src/operational/monitoring/metrics.rs
use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::info;

const SESSIONS_ACTIVE: &str = "world_sessions_active";
const ZONES_ACTIVE: &str = "world_zones_active";
const PACKETS_ROUTED: &str = "world_packets_routed_total";
const PACKETS_DROPPED: &str = "world_packets_dropped_total";
const ZONE_TICK_SECONDS: &str = "zone_sim_tick_seconds";
const ZONE_BACKLOG_DRAINED: &str = "zone_backlog_drained";
const NPC_SPAWNS: &str = "zone_npc_spawns_total";

pub struct MetricsSystem {
    start_time: Instant,
}

impl MetricsSystem {
    /// Installs the Prometheus exporter on `addr` and registers descriptions.
    pub fn new(addr: SocketAddr) -> Result<Self> {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;

        describe_gauge!(SESSIONS_ACTIVE, "Sessions currently held by the registry");
        describe_gauge!(ZONES_ACTIVE, "Zone instances currently running");
        describe_counter!(PACKETS_ROUTED, "Packets routed to a global handler or zone backlog");
        describe_counter!(PACKETS_DROPPED, "Packets dropped, labelled by reason");
        describe_histogram!(ZONE_TICK_SECONDS, "Zone simulation tick duration in seconds");
        describe_histogram!(ZONE_BACKLOG_DRAINED, "Packets drained per backlog wake");
        describe_counter!(NPC_SPAWNS, "NPCs materialised by spawn pools");

        info!("Prometheus exporter listening on {}", addr);
        Ok(MetricsSystem { start_time: Instant::now() })
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

pub fn set_sessions_active(count: usize) {
    gauge!(SESSIONS_ACTIVE).set(count as f64);
}

pub fn set_zones_active(count: usize) {
    gauge!(ZONES_ACTIVE).set(count as f64);
}

pub fn record_packet_routed() {
    counter!(PACKETS_ROUTED).increment(1);
}

pub fn record_packet_dropped(reason: &'static str) {
    counter!(PACKETS_DROPPED, "reason" => reason).increment(1);
}

pub fn record_zone_tick(duration: Duration) {
    histogram!(ZONE_TICK_SECONDS).record(duration.as_secs_f64());
}

pub fn record_backlog_drained(count: usize) {
    histogram!(ZONE_BACKLOG_DRAINED).record(count as f64);
}

pub fn record_npc_spawn() {
    counter!(NPC_SPAWNS).increment(1);
}

// world_server/server/src/systems/quest_zones.rs
//! Compiled-in zone scripts. Each zone contributes a `register_*` function to
//! the table returned by `builtin_table`.

use super::quest::{QuestEffects, QuestEvent, QuestEventType, QuestTable, ZoneQuests, ZONE_WIDE};
use crate::entities::Nameable;
use std::sync::Arc;

pub fn builtin_table() -> QuestTable {
    let mut table = QuestTable::new();
    table.insert("qeynos2".to_string(), Arc::new(qeynos2()));
    table.insert("qeynos".to_string(), Arc::new(qeynos()));
    table
}

fn actor_name<'a>(event: &'a QuestEvent<'_>) -> &'a str {
    event.actor.map_or("traveler", |a| a.name())
}

fn qeynos2() -> ZoneQuests {
    let mut zq = ZoneQuests::new();
    zq.register("Guard_Gehnus", QuestEventType::Say, guard_gehnus_say)
        .register("Guard_Gehnus", QuestEventType::Despawn, guard_gehnus_despawn)
        .register("Phin_Esrinap", QuestEventType::Say, phin_esrinap_say)
        .register(ZONE_WIDE, QuestEventType::Say, qeynos2_default_say);
    zq
}

fn guard_gehnus_say(event: &QuestEvent<'_>, effects: &mut QuestEffects) -> bool {
    let Some(receiver) = event.receiver else {
        return false;
    };
    effects.say(receiver, format!("Hello, {}! How can I assist you today?", actor_name(event)));
    true
}

fn guard_gehnus_despawn(event: &QuestEvent<'_>, effects: &mut QuestEffects) -> bool {
    let Some(receiver) = event.receiver else {
        return false;
    };
    effects.say(receiver, "My watch is ended. Another will take my post.");
    true
}

fn phin_esrinap_say(event: &QuestEvent<'_>, effects: &mut QuestEffects) -> bool {
    let Some(receiver) = event.receiver else {
        return false;
    };
    effects.say(receiver, format!("Hello, {}!", actor_name(event)));
    true
}

fn qeynos2_default_say(event: &QuestEvent<'_>, effects: &mut QuestEffects) -> bool {
    match event.receiver {
        Some(receiver) if receiver.is_npc() => {
            effects.say(receiver, format!("Hello, {}! My name is {}", actor_name(event), receiver.name()));
            true
        }
        _ => false,
    }
}

fn qeynos() -> ZoneQuests {
    let mut zq = ZoneQuests::new();
    zq.register("Captain_Tillin", QuestEventType::Say, captain_tillin_say)
        .register("Captain_Tillin", QuestEventType::Spawn, |_, _| true);
    zq
}

fn captain_tillin_say(event: &QuestEvent<'_>, effects: &mut QuestEffects) -> bool {
    let Some(receiver) = event.receiver else {
        return false;
    };
    let reply = match event.message.map(str::to_ascii_lowercase) {
        Some(m) if m.contains("hail") => format!("Hail, {}. The guard could use another sword.", actor_name(event)),
        _ => "Move along, citizen.".to_string(),
    };
    effects.say(receiver, reply);
    true
}

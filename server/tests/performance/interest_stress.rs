// world_server/server/tests/performance/interest_stress.rs
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Instant;
use world_server_core::core::types::{EntityId, Position};
use world_server_core::world::spatial_grid::{CellCoord, InterestGrid};

const ENTITIES: u32 = 2000;
const ROUNDS: usize = 20;
const EXTENT: f32 = 4000.0;
const CELL: f32 = 200.0;

fn random_position(rng: &mut StdRng) -> Position {
    Position::new(rng.gen_range(-EXTENT..EXTENT), rng.gen_range(-EXTENT..EXTENT), rng.gen_range(-400.0..400.0), 0.0)
}

fn assert_matches_brute_force(grid: &InterestGrid, positions: &HashMap<EntityId, Position>) {
    let cells: HashMap<EntityId, CellCoord> =
        positions.iter().map(|(id, p)| (*id, CellCoord::from_position(p, CELL))).collect();
    for (id, cell) in &cells {
        let subs = grid.subscribers_of(*id).expect("every entity has a subscriber set");
        let expected = cells.iter().filter(|(other, c)| *other != id && cell.is_adjacent(c)).count();
        assert_eq!(subs.len(), expected, "entity {} sees the wrong number of neighbours", id);
        for other in subs {
            assert!(cell.is_adjacent(&cells[other]), "{} subscribed to distant {}", id, other);
            assert!(grid.subscribers_of(*other).unwrap().contains(id), "{} -> {} is one-sided", id, other);
        }
    }
}

#[test]
fn random_walk_keeps_subscriptions_exact() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut grid = InterestGrid::new(CELL);
    let mut positions = HashMap::new();

    for id in 1..=ENTITIES {
        let p = random_position(&mut rng);
        grid.register_new_entity(id, &p);
        positions.insert(id, p);
    }
    assert_eq!(grid.len(), ENTITIES as usize);
    assert_matches_brute_force(&grid, &positions);

    let start = Instant::now();
    for round in 0..ROUNDS {
        for id in 1..=ENTITIES {
            let p = positions.get_mut(&id).unwrap();
            // Mostly short steps with the occasional long jump.
            let reach = if rng.gen_bool(0.05) { EXTENT } else { CELL };
            p.x = (p.x + rng.gen_range(-reach..reach)).clamp(-EXTENT, EXTENT);
            p.y = (p.y + rng.gen_range(-reach..reach)).clamp(-EXTENT, EXTENT);
            grid.mark_moved(id, p);
        }
        // Churn: a few entities leave and come back elsewhere.
        for _ in 0..20 {
            let id = rng.gen_range(1..=ENTITIES);
            grid.remove_entity(id);
            let p = random_position(&mut rng);
            grid.register_new_entity(id, &p);
            positions.insert(id, p);
        }
        let flushed = grid.flush_updates(|_, _| {});
        assert!(flushed <= ENTITIES as usize, "round {} flushed {}", round, flushed);
        assert_matches_brute_force(&grid, &positions);
    }
    println!("{} rounds of {} moves in {:?}", ROUNDS, ENTITIES, start.elapsed());
}

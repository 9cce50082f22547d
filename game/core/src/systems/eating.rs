use crate::components::{Blob, Collider, Player, Position, Score, ToDestroy};
use crate::session::events;
use hadron::entity::EntityId;
use hadron::prelude::{System, World};
use hashbrown::HashSet;

/// Starting mass of a blob player.
pub const INITIAL_MASS: f32 = 100.0;

/// A blob must outweigh its prey by this factor to swallow it.
pub const EAT_MASS_RATIO: f32 = 1.25;

/// Body radius implied by a mass.
pub fn radius(mass: f32) -> f32 {
    mass.max(1.0).sqrt() * 4.0
}

/// Collider implied by a mass.
pub fn collider(mass: f32) -> Collider {
    let side = radius(mass) * 2.0;

    Collider {
        width: side,
        height: side,
    }
}

/// Blob-arena predation: a sufficiently heavier player swallows any lighter
/// player whose center falls inside its body. The swallowed entity is
/// flagged for destruction and the kill replicates as a player_eaten event,
/// the same way the shooter's collision stage replicates enemy kills.
pub struct EatingSystem;

impl System for EatingSystem {
    fn name(&self) -> &'static str {
        "eating"
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let blobs: Vec<(EntityId, u32, f32, f32)> = {
            let players = world.view::<Player>();
            let positions = world.view::<Position>();
            let bodies = world.view::<Blob>();

            players
                .iter()
                .filter_map(|(entity, player)| {
                    let position = positions.get(entity)?;
                    bodies.get(entity)?;
                    Some((entity, player.player_id, position.x, position.y))
                })
                .collect()
        };

        let mut swallowed: HashSet<EntityId> = HashSet::new();

        for (eater, eater_player, eater_x, eater_y) in blobs.iter() {
            if swallowed.contains(eater) {
                continue;
            }

            for (prey, prey_player, prey_x, prey_y) in blobs.iter() {
                if eater == prey || swallowed.contains(prey) {
                    continue;
                }

                // Masses are read live so a blob growing mid-tick can keep
                // swallowing with its new weight.
                let eater_mass = match world.get::<Blob>(*eater) {
                    Some(blob) => blob.mass,
                    None => break,
                };
                let prey_mass = match world.get::<Blob>(*prey) {
                    Some(blob) => blob.mass,
                    None => continue,
                };

                if eater_mass < prey_mass * EAT_MASS_RATIO {
                    continue;
                }

                let dx = eater_x - prey_x;
                let dy = eater_y - prey_y;
                let reach = radius(eater_mass);

                if dx * dx + dy * dy >= reach * reach {
                    continue;
                }

                swallowed.insert(*prey);

                let new_mass = eater_mass + prey_mass;
                if let Some(mut blob) = world.get_mut::<Blob>(*eater) {
                    blob.mass = new_mass;
                }
                world.add(*eater, collider(new_mass));

                let score = new_mass as u32;
                if let Some(mut tally) = world.get_mut::<Score>(*eater) {
                    tally.value = score;
                }

                world.add(*prey, ToDestroy);

                world.publish(&events::ScoreChanged {
                    player_id: *eater_player,
                    score,
                });
                world.publish(&events::PlayerEaten {
                    eater_player_id: *eater_player,
                    eaten_player_id: *prey_player,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn world() -> World {
        let mut world = World::new(None);
        world.register::<Position>();
        world.register::<Collider>();
        world.register::<Score>();
        world.register::<Player>();
        world.register::<Blob>();
        world.register::<ToDestroy>();
        world
    }

    fn add_blob(world: &mut World, player_id: u32, x: f32, y: f32, mass: f32) -> EntityId {
        let entity = world.spawn();
        world.add(entity, Position { x, y });
        world.add(entity, collider(mass));
        world.add(entity, Score { value: 0 });
        world.add(entity, Player { player_id });
        world.add(entity, Blob { mass });
        entity
    }

    #[test]
    fn test_heavier_overlapping_blob_eats() {
        let mut world = world();

        let eaten = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&eaten);
        world.subscribe(move |ev: &events::PlayerEaten| {
            sink.borrow_mut().push((ev.eater_player_id, ev.eaten_player_id));
        });

        let big = add_blob(&mut world, 1, 100.0, 100.0, 200.0);
        let small = add_blob(&mut world, 2, 110.0, 100.0, 100.0);

        EatingSystem.update(&mut world, 0.05);

        assert_eq!(*eaten.borrow(), vec![(1, 2)]);
        assert!(world.has::<ToDestroy>(small));
        assert!(!world.has::<ToDestroy>(big));
        assert_eq!(world.get::<Blob>(big).unwrap().mass, 300.0);
        assert_eq!(world.get::<Score>(big).unwrap().value, 300);

        // The winner's body grew with its mass.
        let body = world.get::<Collider>(big).unwrap();
        assert!(body.width > collider(200.0).width);
    }

    #[test]
    fn test_similar_masses_coexist() {
        let mut world = world();

        let a = add_blob(&mut world, 1, 100.0, 100.0, 120.0);
        let b = add_blob(&mut world, 2, 100.0, 100.0, 100.0);

        EatingSystem.update(&mut world, 0.05);

        assert!(!world.has::<ToDestroy>(a));
        assert!(!world.has::<ToDestroy>(b));
    }

    #[test]
    fn test_distant_blobs_ignored() {
        let mut world = world();

        add_blob(&mut world, 1, 100.0, 100.0, 400.0);
        let far = add_blob(&mut world, 2, 800.0, 100.0, 100.0);

        EatingSystem.update(&mut world, 0.05);

        assert!(!world.has::<ToDestroy>(far));
    }

    #[test]
    fn test_growth_compounds_within_a_tick() {
        let mut world = world();

        // 160 can't swallow 150 (needs 187.5), but after absorbing the 100
        // it weighs 260 and finishes the job in the same pass.
        let big = add_blob(&mut world, 1, 100.0, 100.0, 160.0);
        let snack = add_blob(&mut world, 2, 105.0, 100.0, 100.0);
        let rival = add_blob(&mut world, 3, 110.0, 100.0, 150.0);

        EatingSystem.update(&mut world, 0.05);

        assert!(world.has::<ToDestroy>(snack));
        assert!(world.has::<ToDestroy>(rival));
        assert_eq!(world.get::<Blob>(big).unwrap().mass, 410.0);
    }
}

use crate::components::{Collider, Enemy, Health, NetworkId, Position, Velocity, WaveController};
use crate::protocol::{Difficulty, EntityKind};
use crate::session::{events, SessionConfig};
use hadron::prelude::{System, World};

const FIRST_WAVE_DELAY: f32 = 2.0;
const BETWEEN_WAVE_DELAY: f32 = 3.0;
const SPAWN_INTERVAL: f32 = 0.5;
const ENEMY_SPEED: f32 = 80.0;
const ENEMY_BOUNTY: u32 = 100;

/// Initial controller state for a fresh session.
pub fn controller_for(difficulty: Difficulty) -> WaveController {
    let total_waves = match difficulty {
        Difficulty::Easy => 3,
        Difficulty::Normal => 4,
        Difficulty::Hard => 5,
    };

    WaveController {
        current_wave: 0,
        total_waves,
        alive_enemies: 0,
        spawn_budget: 0,
        spawn_timer: FIRST_WAVE_DELAY,
        wave_active: false,
    }
}

/// Drives the wave plan: announces waves, feeds enemies onto the right edge
/// of the map, and declares a wave complete once its spawn budget is spent
/// and the field is clear.
pub struct WaveSystem {
    difficulty: Difficulty,
    config: SessionConfig,
    spawned_total: u32,
}

impl WaveSystem {
    pub fn new(difficulty: Difficulty, config: SessionConfig) -> WaveSystem {
        WaveSystem {
            difficulty,
            config,
            spawned_total: 0,
        }
    }

    fn wave_budget(&self, wave: u16) -> u16 {
        match self.difficulty {
            Difficulty::Easy => 3 + wave,
            Difficulty::Normal => 4 + 2 * wave,
            Difficulty::Hard => 6 + 3 * wave,
        }
    }

    fn enemy_health(&self) -> u16 {
        match self.difficulty {
            Difficulty::Easy => 30,
            Difficulty::Normal => 50,
            Difficulty::Hard => 80,
        }
    }

    fn spawn_enemy(&mut self, world: &mut World, wave: u16) {
        // Deterministic vertical spread; no RNG so replays and tests agree.
        let band = (self.config.map_height - 120.0).max(1.0);
        let y = 60.0 + ((u32::from(wave) * 53 + self.spawned_total * 97) % band as u32) as f32;
        let x = self.config.map_width + 48.0;

        self.spawned_total += 1;

        let entity = world.spawn();
        world.add(entity, Position { x, y });
        world.add(
            entity,
            Velocity {
                x: -ENEMY_SPEED,
                y: 0.0,
            },
        );
        world.add(
            entity,
            Collider {
                width: 32.0,
                height: 32.0,
            },
        );
        world.add(
            entity,
            Health {
                current: self.enemy_health(),
                max: self.enemy_health(),
            },
        );
        world.add(
            entity,
            Enemy {
                bounty: ENEMY_BOUNTY,
            },
        );
        world.add(entity, NetworkId { id: entity.raw() });

        world.publish(&events::Spawned {
            network_id: entity.raw(),
            kind: EntityKind::Enemy,
            x,
            y,
            owner_player_id: 0,
        });
    }
}

impl System for WaveSystem {
    fn name(&self) -> &'static str {
        "waves"
    }

    fn update(&mut self, world: &mut World, dt: f32) {
        let alive_enemies = world.view::<Enemy>().len() as u16;

        let mut controller = match world
            .view::<WaveController>()
            .iter()
            .next()
            .map(|(entity, controller)| (entity, *controller))
        {
            Some((_, controller)) => controller,
            None => return,
        };

        controller.alive_enemies = alive_enemies;

        let mut started = None;
        let mut completed = None;
        let mut spawn = false;

        if controller.wave_active {
            if controller.spawn_budget > 0 {
                controller.spawn_timer -= dt;
                if controller.spawn_timer <= 0.0 {
                    controller.spawn_budget -= 1;
                    controller.spawn_timer = SPAWN_INTERVAL;
                    spawn = true;
                }
            } else if alive_enemies == 0 {
                controller.wave_active = false;
                controller.spawn_timer = BETWEEN_WAVE_DELAY;
                completed = Some(controller.current_wave);
            }
        } else if controller.current_wave < controller.total_waves {
            controller.spawn_timer -= dt;
            if controller.spawn_timer <= 0.0 {
                controller.current_wave += 1;
                controller.wave_active = true;
                controller.spawn_budget = self.wave_budget(controller.current_wave);
                controller.spawn_timer = 0.0;
                started = Some(controller.current_wave);
            }
        }

        let wave = controller.current_wave;

        {
            let mut controllers = world.view_mut::<WaveController>();
            if let Some((_, slot)) = controllers.iter_mut().next() {
                *slot = controller;
            };
        }

        if let Some(wave) = started {
            world.publish(&events::WaveStarted { wave });
        }

        if spawn {
            self.spawn_enemy(world, wave);
        }

        if let Some(wave) = completed {
            world.publish(&events::WaveCompleted { wave });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn world(difficulty: Difficulty) -> World {
        let mut world = World::new(None);
        world.register::<Position>();
        world.register::<Velocity>();
        world.register::<Collider>();
        world.register::<Health>();
        world.register::<Enemy>();
        world.register::<NetworkId>();
        world.register::<WaveController>();

        let controller = world.spawn();
        world.add(controller, controller_for(difficulty));
        world
    }

    #[test]
    fn test_first_wave_starts_after_delay() {
        let mut world = world(Difficulty::Normal);
        let mut system = WaveSystem::new(Difficulty::Normal, SessionConfig::default());

        let started = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&started);
        world.subscribe(move |ev: &events::WaveStarted| sink.borrow_mut().push(ev.wave));

        // Before the initial delay elapses, nothing happens.
        for _ in 0..30 {
            system.update(&mut world, 0.05);
        }
        assert!(started.borrow().is_empty());

        for _ in 0..15 {
            system.update(&mut world, 0.05);
        }
        assert_eq!(*started.borrow(), vec![1]);
    }

    #[test]
    fn test_wave_spawns_its_budget() {
        let mut world = world(Difficulty::Easy);
        let mut system = WaveSystem::new(Difficulty::Easy, SessionConfig::default());

        // Run long enough for wave one to spawn fully (budget 4 at easy).
        for _ in 0..200 {
            system.update(&mut world, 0.05);
        }

        assert_eq!(world.view::<Enemy>().len(), 4);
    }

    #[test]
    fn test_wave_completes_when_field_clears() {
        let mut world = world(Difficulty::Easy);
        let mut system = WaveSystem::new(Difficulty::Easy, SessionConfig::default());

        let completed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&completed);
        world.subscribe(move |ev: &events::WaveCompleted| sink.borrow_mut().push(ev.wave));

        for _ in 0..200 {
            system.update(&mut world, 0.05);
        }

        // Clear the field by hand; the wave should then complete.
        let enemies: Vec<_> = world.view::<Enemy>().iter().map(|(e, _)| e).collect();
        for enemy in enemies {
            world.destroy(enemy);
        }

        system.update(&mut world, 0.05);

        assert_eq!(*completed.borrow(), vec![1]);
    }
}

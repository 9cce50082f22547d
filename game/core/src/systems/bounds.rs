use crate::components::{Enemy, Player, Position, Projectile, ToDestroy};
use crate::session::SessionConfig;
use hadron::entity::EntityId;
use hadron::prelude::{System, World};

const OFFSCREEN_MARGIN: f32 = 64.0;

/// Clamps players inside the map and retires projectiles and enemies that
/// left it. Enemy spawns enter from beyond the right edge, so only entities
/// past the margin are culled.
pub struct BoundsSystem {
    config: SessionConfig,
}

impl BoundsSystem {
    pub fn new(config: SessionConfig) -> BoundsSystem {
        BoundsSystem { config }
    }
}

impl System for BoundsSystem {
    fn name(&self) -> &'static str {
        "bounds"
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let width = self.config.map_width;
        let height = self.config.map_height;

        {
            let players = world.view::<Player>();
            let mut positions = world.view_mut::<Position>();

            for (entity, _) in players.iter() {
                if let Some(position) = positions.get_mut(entity) {
                    position.x = position.x.max(0.0).min(width);
                    position.y = position.y.max(0.0).min(height);
                }
            }
        }

        let mut escaped: Vec<EntityId> = Vec::new();

        {
            let positions = world.view::<Position>();

            for (entity, _) in world.view::<Projectile>().iter() {
                if let Some(position) = positions.get(entity) {
                    if position.x > width + OFFSCREEN_MARGIN
                        || position.x < -OFFSCREEN_MARGIN
                        || position.y > height + OFFSCREEN_MARGIN
                        || position.y < -OFFSCREEN_MARGIN
                    {
                        escaped.push(entity);
                    }
                }
            }

            for (entity, _) in world.view::<Enemy>().iter() {
                if let Some(position) = positions.get(entity) {
                    if position.x < -OFFSCREEN_MARGIN {
                        escaped.push(entity);
                    }
                }
            }
        }

        for entity in escaped {
            world.add(entity, ToDestroy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        let mut world = World::new(None);
        world.register::<Position>();
        world.register::<Player>();
        world.register::<Projectile>();
        world.register::<Enemy>();
        world.register::<ToDestroy>();
        world
    }

    #[test]
    fn test_player_clamped_to_map() {
        let mut world = world();
        let mut system = BoundsSystem::new(SessionConfig::default());

        let player = world.spawn();
        world.add(player, Position { x: -10.0, y: 5000.0 });
        world.add(player, Player { player_id: 1 });

        system.update(&mut world, 0.05);

        let position = world.get::<Position>(player).unwrap();
        assert_eq!(position.x, 0.0);
        assert_eq!(position.y, SessionConfig::default().map_height);
    }

    #[test]
    fn test_offscreen_projectile_retired() {
        let mut world = world();
        let mut system = BoundsSystem::new(SessionConfig::default());

        let shot = world.spawn();
        world.add(
            shot,
            Position {
                x: SessionConfig::default().map_width + 100.0,
                y: 10.0,
            },
        );
        world.add(
            shot,
            Projectile {
                owner_player_id: 1,
                damage: 25,
            },
        );

        system.update(&mut world, 0.05);

        assert!(world.has::<ToDestroy>(shot));
    }

    #[test]
    fn test_entering_enemy_not_retired() {
        let mut world = world();
        let mut system = BoundsSystem::new(SessionConfig::default());

        let enemy = world.spawn();
        world.add(
            enemy,
            Position {
                x: SessionConfig::default().map_width + 40.0,
                y: 10.0,
            },
        );
        world.add(enemy, Enemy { bounty: 100 });

        system.update(&mut world, 0.05);
        assert!(!world.has::<ToDestroy>(enemy));

        // Past the left edge it is culled.
        world.get_mut::<Position>(enemy).unwrap().x = -100.0;
        system.update(&mut world, 0.05);
        assert!(world.has::<ToDestroy>(enemy));
    }
}

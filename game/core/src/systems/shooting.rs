use crate::components::{
    input_flags, Collider, InputState, NetworkId, Player, Position, Projectile, Velocity,
};
use crate::session::events;
use hadron::entity::EntityId;
use hadron::prelude::{System, World};
use hashbrown::HashMap;

const FIRE_COOLDOWN: f32 = 0.25;
const PROJECTILE_SPEED: f32 = 400.0;
const MUZZLE_OFFSET: f32 = 28.0;
const BASE_DAMAGE: u16 = 25;

/// Spawns projectiles for players holding the shoot flag, one per cooldown
/// window. A held charge flag doubles the damage.
pub struct ShootingSystem {
    cooldowns: HashMap<EntityId, f32>,
}

impl ShootingSystem {
    pub fn new() -> ShootingSystem {
        ShootingSystem {
            cooldowns: HashMap::new(),
        }
    }
}

impl System for ShootingSystem {
    fn name(&self) -> &'static str {
        "shooting"
    }

    fn update(&mut self, world: &mut World, dt: f32) {
        for cooldown in self.cooldowns.values_mut() {
            *cooldown -= dt;
        }
        self.cooldowns.retain(|_, cooldown| *cooldown > 0.0);

        let mut shots: Vec<(EntityId, u32, f32, f32, u16)> = Vec::new();

        {
            let players = world.view::<Player>();
            let inputs = world.view::<InputState>();
            let positions = world.view::<Position>();

            for (entity, player) in players.iter() {
                let flags = match inputs.get(entity) {
                    Some(input) => input.flags,
                    None => continue,
                };

                if flags & input_flags::SHOOT == 0 || self.cooldowns.contains_key(&entity) {
                    continue;
                }

                let position = match positions.get(entity) {
                    Some(position) => *position,
                    None => continue,
                };

                let damage = if flags & input_flags::CHARGE != 0 {
                    BASE_DAMAGE * 2
                } else {
                    BASE_DAMAGE
                };

                shots.push((
                    entity,
                    player.player_id,
                    position.x + MUZZLE_OFFSET,
                    position.y,
                    damage,
                ));
            }
        }

        for (shooter, player_id, x, y, damage) in shots {
            self.cooldowns.insert(shooter, FIRE_COOLDOWN);
            spawn_projectile(world, player_id, x, y, damage);
        }
    }
}

fn spawn_projectile(world: &mut World, owner_player_id: u32, x: f32, y: f32, damage: u16) {
    let entity = world.spawn();

    world.add(entity, Position { x, y });
    world.add(
        entity,
        Velocity {
            x: PROJECTILE_SPEED,
            y: 0.0,
        },
    );
    world.add(
        entity,
        Collider {
            width: 12.0,
            height: 4.0,
        },
    );
    world.add(
        entity,
        Projectile {
            owner_player_id,
            damage,
        },
    );
    world.add(entity, NetworkId { id: entity.raw() });

    world.publish(&events::ProjectileFired {
        network_id: entity.raw(),
        owner_player_id,
        x,
        y,
        velocity_x: PROJECTILE_SPEED,
        velocity_y: 0.0,
    });
}

use crate::components::{
    BonusWeapon, Collider, Enemy, Health, HitFlash, Invulnerability, Player, Position, Powerup,
    PowerupKind, Projectile, Score, Shield, SpeedBoost, ToDestroy,
};
use crate::session::events;
use hadron::entity::EntityId;
use hadron::prelude::{System, World};
use hashbrown::HashSet;

const CONTACT_DAMAGE: u16 = 20;
const HIT_FLASH_TIME: f32 = 0.15;
const CONTACT_INVULN_TIME: f32 = 1.0;
const SHIELD_INVULN_TIME: f32 = 0.5;

#[derive(Copy, Clone)]
struct Body {
    entity: EntityId,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl Body {
    fn overlaps(&self, other: &Body) -> bool {
        (self.x - other.x).abs() < (self.width + other.width) * 0.5
            && (self.y - other.y).abs() < (self.height + other.height) * 0.5
    }
}

/// Resolves AABB overlaps: projectiles against enemies, enemies against
/// players, powerups against players. Damage, score and transient effects
/// all flow from here.
pub struct CollisionSystem;

impl System for CollisionSystem {
    fn name(&self) -> &'static str {
        "collision"
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let mut players: Vec<(Body, u32)> = Vec::new();
        let mut enemies: Vec<(Body, u32)> = Vec::new();
        let mut projectiles: Vec<(Body, u32, u16)> = Vec::new();
        let mut powerups: Vec<(Body, PowerupKind)> = Vec::new();

        {
            let positions = world.view::<Position>();
            let colliders = world.view::<Collider>();

            let body = |entity: EntityId| -> Option<Body> {
                let position = positions.get(entity)?;
                let collider = colliders.get(entity)?;
                Some(Body {
                    entity,
                    x: position.x,
                    y: position.y,
                    width: collider.width,
                    height: collider.height,
                })
            };

            for (entity, player) in world.view::<Player>().iter() {
                if let Some(body) = body(entity) {
                    players.push((body, player.player_id));
                }
            }
            for (entity, enemy) in world.view::<Enemy>().iter() {
                if let Some(body) = body(entity) {
                    enemies.push((body, enemy.bounty));
                }
            }
            for (entity, projectile) in world.view::<Projectile>().iter() {
                if let Some(body) = body(entity) {
                    projectiles.push((body, projectile.owner_player_id, projectile.damage));
                }
            }
            for (entity, powerup) in world.view::<Powerup>().iter() {
                if let Some(body) = body(entity) {
                    powerups.push((body, powerup.kind));
                }
            }
        }

        let mut spent_projectiles: HashSet<EntityId> = HashSet::new();
        let mut dead_enemies: HashSet<EntityId> = HashSet::new();

        // Projectiles against enemies.
        for (projectile, owner, damage) in projectiles.iter() {
            if spent_projectiles.contains(&projectile.entity) {
                continue;
            }

            for (enemy, bounty) in enemies.iter() {
                if dead_enemies.contains(&enemy.entity) || !projectile.overlaps(enemy) {
                    continue;
                }

                spent_projectiles.insert(projectile.entity);
                world.add(projectile.entity, ToDestroy);
                world.add(
                    enemy.entity,
                    HitFlash {
                        remaining: HIT_FLASH_TIME,
                    },
                );

                let killed = match world.get_mut::<Health>(enemy.entity) {
                    Some(mut health) => {
                        health.current = health.current.saturating_sub(*damage);
                        health.current == 0
                    }
                    None => false,
                };

                if killed {
                    dead_enemies.insert(enemy.entity);
                    world.add(enemy.entity, ToDestroy);
                    world.publish(&events::Exploded {
                        x: enemy.x,
                        y: enemy.y,
                        size: 1,
                    });
                    award_score(world, &players, *owner, *bounty);
                }

                break;
            }
        }

        // Enemies ramming players.
        for (enemy, _) in enemies.iter() {
            if dead_enemies.contains(&enemy.entity) {
                continue;
            }

            for (player, _) in players.iter() {
                if !enemy.overlaps(player) {
                    continue;
                }

                if world.has::<Invulnerability>(player.entity) {
                    continue;
                }

                // Contact always costs the enemy its life.
                dead_enemies.insert(enemy.entity);
                world.add(enemy.entity, ToDestroy);
                world.publish(&events::Exploded {
                    x: enemy.x,
                    y: enemy.y,
                    size: 2,
                });

                if world.has::<Shield>(player.entity) {
                    world.remove::<Shield>(player.entity);
                    world.add(
                        player.entity,
                        Invulnerability {
                            remaining: SHIELD_INVULN_TIME,
                        },
                    );
                    break;
                }

                world.add(
                    player.entity,
                    HitFlash {
                        remaining: HIT_FLASH_TIME,
                    },
                );
                world.add(
                    player.entity,
                    Invulnerability {
                        remaining: CONTACT_INVULN_TIME,
                    },
                );

                let killed = match world.get_mut::<Health>(player.entity) {
                    Some(mut health) => {
                        health.current = health.current.saturating_sub(CONTACT_DAMAGE);
                        health.current == 0
                    }
                    None => false,
                };

                if killed {
                    world.add(player.entity, ToDestroy);
                    world.publish(&events::Exploded {
                        x: player.x,
                        y: player.y,
                        size: 3,
                    });
                }

                break;
            }
        }

        // Powerup pickups.
        for (powerup, kind) in powerups.iter() {
            for (player, _) in players.iter() {
                if !powerup.overlaps(player) {
                    continue;
                }

                world.add(powerup.entity, ToDestroy);

                match kind {
                    PowerupKind::Shield => {
                        world.add(player.entity, Shield { remaining: 8.0 });
                    }
                    PowerupKind::SpeedBoost => {
                        world.add(
                            player.entity,
                            SpeedBoost {
                                remaining: 5.0,
                                factor: 1.6,
                            },
                        );
                    }
                    PowerupKind::BonusWeapon => {
                        let level = world
                            .get::<BonusWeapon>(player.entity)
                            .map(|weapon| weapon.level)
                            .unwrap_or(0);
                        world.add(
                            player.entity,
                            BonusWeapon {
                                level: level.saturating_add(1),
                                remaining: 10.0,
                            },
                        );
                    }
                }

                break;
            }
        }
    }
}

fn award_score(world: &mut World, players: &[(Body, u32)], owner_player_id: u32, bounty: u32) {
    let owner = players
        .iter()
        .find(|(_, player_id)| *player_id == owner_player_id);

    if let Some((body, _)) = owner {
        let new_score = match world.get_mut::<Score>(body.entity) {
            Some(mut score) => {
                score.value += bounty;
                Some(score.value)
            }
            None => None,
        };

        if let Some(score) = new_score {
            world.publish(&events::ScoreChanged {
                player_id: owner_player_id,
                score,
            });
        }
    }
}

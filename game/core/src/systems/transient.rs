use crate::components::{BonusWeapon, HitFlash, Invulnerability, Shield, SpeedBoost};
use hadron::entity::EntityId;
use hadron::prelude::{System, World};

/// Decays every timed effect and removes the ones that ran out.
pub struct TransientSystem;

impl System for TransientSystem {
    fn name(&self) -> &'static str {
        "transient"
    }

    fn update(&mut self, world: &mut World, dt: f32) {
        let mut expired: Vec<EntityId>;

        expired = Vec::new();
        for (entity, flash) in world.view_mut::<HitFlash>().iter_mut() {
            flash.remaining -= dt;
            if flash.remaining <= 0.0 {
                expired.push(entity);
            }
        }
        for entity in expired {
            world.remove::<HitFlash>(entity);
        }

        expired = Vec::new();
        for (entity, invuln) in world.view_mut::<Invulnerability>().iter_mut() {
            invuln.remaining -= dt;
            if invuln.remaining <= 0.0 {
                expired.push(entity);
            }
        }
        for entity in expired {
            world.remove::<Invulnerability>(entity);
        }

        expired = Vec::new();
        for (entity, shield) in world.view_mut::<Shield>().iter_mut() {
            shield.remaining -= dt;
            if shield.remaining <= 0.0 {
                expired.push(entity);
            }
        }
        for entity in expired {
            world.remove::<Shield>(entity);
        }

        expired = Vec::new();
        for (entity, boost) in world.view_mut::<SpeedBoost>().iter_mut() {
            boost.remaining -= dt;
            if boost.remaining <= 0.0 {
                expired.push(entity);
            }
        }
        for entity in expired {
            world.remove::<SpeedBoost>(entity);
        }

        expired = Vec::new();
        for (entity, weapon) in world.view_mut::<BonusWeapon>().iter_mut() {
            weapon.remaining -= dt;
            if weapon.remaining <= 0.0 {
                expired.push(entity);
            }
        }
        for entity in expired {
            world.remove::<BonusWeapon>(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effects_expire() {
        let mut world = World::new(None);
        world.register::<HitFlash>();
        world.register::<Invulnerability>();
        world.register::<Shield>();
        world.register::<SpeedBoost>();
        world.register::<BonusWeapon>();

        let entity = world.spawn();
        world.add(entity, HitFlash { remaining: 0.1 });
        world.add(entity, Invulnerability { remaining: 1.0 });

        TransientSystem.update(&mut world, 0.05);
        assert!(world.has::<HitFlash>(entity));

        TransientSystem.update(&mut world, 0.05);
        assert!(!world.has::<HitFlash>(entity));
        assert!(world.has::<Invulnerability>(entity));

        for _ in 0..20 {
            TransientSystem.update(&mut world, 0.05);
        }
        assert!(!world.has::<Invulnerability>(entity));
    }
}

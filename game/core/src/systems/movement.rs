use crate::components::{velocity_from_input, InputState, Position, SpeedBoost, Velocity};
use hadron::prelude::{System, World};

/// Turns player intent into velocity, then integrates every moving entity.
pub struct MovementSystem;

impl System for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn update(&mut self, world: &mut World, dt: f32) {
        {
            let inputs = world.view::<InputState>();
            let boosts = world.view::<SpeedBoost>();
            let mut velocities = world.view_mut::<Velocity>();

            for (entity, input) in inputs.iter() {
                let (mut vx, mut vy) = velocity_from_input(input.flags);

                if let Some(boost) = boosts.get(entity) {
                    vx *= boost.factor;
                    vy *= boost.factor;
                }

                if let Some(velocity) = velocities.get_mut(entity) {
                    velocity.x = vx;
                    velocity.y = vy;
                }
            }
        }

        let velocities = world.view::<Velocity>();
        let mut positions = world.view_mut::<Position>();

        for (entity, velocity) in velocities.iter() {
            if let Some(position) = positions.get_mut(entity) {
                position.x += velocity.x * dt;
                position.y += velocity.y * dt;
            }
        }
    }
}

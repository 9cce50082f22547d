use crate::components::{Position, Scrollable, ToDestroy};
use hadron::entity::EntityId;
use hadron::prelude::{System, World};

/// Drags scrollable scenery leftward and retires it once it is far enough
/// off screen.
pub struct ScrollSystem;

const DESPAWN_MARGIN: f32 = 128.0;

impl System for ScrollSystem {
    fn name(&self) -> &'static str {
        "scroll"
    }

    fn update(&mut self, world: &mut World, dt: f32) {
        let mut offscreen: Vec<EntityId> = Vec::new();

        {
            let scrollables = world.view::<Scrollable>();
            let mut positions = world.view_mut::<Position>();

            for (entity, scrollable) in scrollables.iter() {
                if let Some(position) = positions.get_mut(entity) {
                    position.x -= scrollable.speed * dt;

                    if position.x < -DESPAWN_MARGIN {
                        offscreen.push(entity);
                    }
                }
            }
        }

        for entity in offscreen {
            world.add(entity, ToDestroy);
        }
    }
}

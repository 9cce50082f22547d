use crate::components::{Attached, Position, ToDestroy};
use hadron::entity::EntityId;
use hadron::prelude::{System, World};

const SMOOTH_RATE: f32 = 0.5;

/// Keeps attached entities glued to their parent. The link is an entity id
/// resolved through the world every tick; orphans whose parent is gone are
/// flagged for destruction.
pub struct AttachmentSystem;

impl System for AttachmentSystem {
    fn name(&self) -> &'static str {
        "attachment"
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let mut targets: Vec<(EntityId, f32, f32, bool)> = Vec::new();
        let mut orphans: Vec<EntityId> = Vec::new();

        {
            let attachments = world.view::<Attached>();
            let positions = world.view::<Position>();

            for (entity, attached) in attachments.iter() {
                match positions.get(attached.parent) {
                    Some(parent) => targets.push((
                        entity,
                        parent.x + attached.offset_x,
                        parent.y + attached.offset_y,
                        attached.smooth,
                    )),
                    None => orphans.push(entity),
                }
            }
        }

        {
            let mut positions = world.view_mut::<Position>();

            for (entity, x, y, smooth) in targets {
                if let Some(position) = positions.get_mut(entity) {
                    if smooth {
                        position.x += (x - position.x) * SMOOTH_RATE;
                        position.y += (y - position.y) * SMOOTH_RATE;
                    } else {
                        position.x = x;
                        position.y = y;
                    }
                }
            }
        }

        for entity in orphans {
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
        world.register::<Attached>();
        world.register::<ToDestroy>();
        world
    }

    #[test]
    fn test_rigid_follow() {
        let mut world = world();

        let parent = world.spawn();
        world.add(parent, Position { x: 100.0, y: 50.0 });

        let child = world.spawn();
        world.add(child, Position { x: 0.0, y: 0.0 });
        world.add(
            child,
            Attached {
                parent,
                offset_x: 10.0,
                offset_y: -5.0,
                smooth: false,
            },
        );

        AttachmentSystem.update(&mut world, 0.05);

        let position = world.get::<Position>(child).unwrap();
        assert_eq!((position.x, position.y), (110.0, 45.0));
    }

    #[test]
    fn test_smooth_follow_converges() {
        let mut world = world();

        let parent = world.spawn();
        world.add(parent, Position { x: 100.0, y: 0.0 });

        let child = world.spawn();
        world.add(child, Position { x: 0.0, y: 0.0 });
        world.add(
            child,
            Attached {
                parent,
                offset_x: 0.0,
                offset_y: 0.0,
                smooth: true,
            },
        );

        AttachmentSystem.update(&mut world, 0.05);
        let first = world.get::<Position>(child).unwrap().x;

        AttachmentSystem.update(&mut world, 0.05);
        let second = world.get::<Position>(child).unwrap().x;

        assert!(first > 0.0 && first < 100.0);
        assert!(second > first);
    }

    #[test]
    fn test_orphan_flagged_for_destroy() {
        let mut world = world();

        let parent = world.spawn();
        world.add(parent, Position { x: 0.0, y: 0.0 });

        let child = world.spawn();
        world.add(child, Position { x: 0.0, y: 0.0 });
        world.add(
            child,
            Attached {
                parent,
                offset_x: 0.0,
                offset_y: 0.0,
                smooth: false,
            },
        );

        world.destroy(parent);
        AttachmentSystem.update(&mut world, 0.05);

        assert!(world.has::<ToDestroy>(child));
    }
}

use crate::components::{NetworkId, ToDestroy};
use crate::session::events;
use hadron::entity::EntityId;
use hadron::prelude::{System, World};

/// Reaps everything flagged with `ToDestroy`. Runs last so a flag raised
/// anywhere in the tick is resolved within the same tick, and the destroy
/// event precedes the tick's snapshot.
pub struct DestroySystem;

impl System for DestroySystem {
    fn name(&self) -> &'static str {
        "destroy"
    }

    fn update(&mut self, world: &mut World, _dt: f32) {
        let doomed: Vec<(EntityId, Option<u32>)> = {
            let flags = world.view::<ToDestroy>();
            let network_ids = world.view::<NetworkId>();

            flags
                .iter()
                .map(|(entity, _)| (entity, network_ids.get(entity).map(|id| id.id)))
                .collect()
        };

        for (entity, network_id) in doomed {
            if let Some(network_id) = network_id {
                world.publish(&events::Destroyed { network_id });
            }

            world.destroy(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_reaps_flagged_and_announces_replicated() {
        let mut world = World::new(None);
        world.register::<ToDestroy>();
        world.register::<NetworkId>();

        let destroyed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&destroyed);
        world.subscribe(move |ev: &events::Destroyed| sink.borrow_mut().push(ev.network_id));

        // A replicated entity and a server-local one.
        let replicated = world.spawn();
        world.add(replicated, NetworkId { id: replicated.raw() });
        world.add(replicated, ToDestroy);

        let local = world.spawn();
        world.add(local, ToDestroy);

        let survivor = world.spawn();

        DestroySystem.update(&mut world, 0.05);

        assert!(!world.contains(replicated));
        assert!(!world.contains(local));
        assert!(world.contains(survivor));

        // Exactly one destroy event, for the replicated entity only.
        assert_eq!(*destroyed.borrow(), vec![replicated.raw()]);
    }
}

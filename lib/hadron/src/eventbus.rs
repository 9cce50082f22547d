use hashbrown::HashMap;
use std::any::{Any, TypeId};

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    // Box<dyn FnMut(&E)> behind a type-erased box, downcast on dispatch.
    handler: Box<dyn Any>,
}

/// Typed publish/subscribe bus. Dispatch is synchronous: `publish` invokes
/// every live handler for the event type before returning, and no event is
/// queued across calls. Handlers must not publish recursively.
pub struct EventBus {
    topics: HashMap<TypeId, Vec<Subscription>>,
    next_id: u64,
}

impl EventBus {
    #[inline]
    pub fn new() -> EventBus {
        EventBus {
            topics: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a handler for events of type `E`.
    pub fn subscribe<E, F>(&mut self, handler: F) -> SubscriptionId
    where
        E: 'static,
        F: FnMut(&E) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);

        let boxed: Box<dyn FnMut(&E)> = Box::new(handler);

        self.topics
            .entry(TypeId::of::<E>())
            .or_insert_with(Vec::new)
            .push(Subscription {
                id,
                handler: Box::new(boxed),
            });

        id
    }

    /// Drop a handler. Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subs in self.topics.values_mut() {
            if let Some(pos) = subs.iter().position(|sub| sub.id == id) {
                subs.remove(pos);
                return true;
            }
        }

        false
    }

    /// Synchronously dispatch the event to every handler subscribed for `E`.
    pub fn publish<E: 'static>(&mut self, event: &E) {
        let key = TypeId::of::<E>();

        // The subscription list is detached during dispatch so handlers that
        // subscribe new handlers don't alias it.
        let mut subs = match self.topics.remove(&key) {
            Some(subs) => subs,
            None => return,
        };

        for sub in subs.iter_mut() {
            if let Some(handler) = sub.handler.downcast_mut::<Box<dyn FnMut(&E)>>() {
                handler(event);
            }
        }

        match self.topics.remove(&key) {
            Some(mut added) => subs.append(&mut added),
            None => (),
        }

        self.topics.insert(key, subs);
    }

    /// The number of live subscriptions for an event type.
    pub fn subscriber_count<E: 'static>(&self) -> usize {
        self.topics
            .get(&TypeId::of::<E>())
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

use crate::component::{ComponentStore, SparseSet};
use crate::entity::EntityId;
use crate::eventbus::{EventBus, SubscriptionId};
use flare::logging;
use hashbrown::{HashMap, HashSet};
use std::any::{type_name, TypeId};
use std::cell::{Ref, RefCell, RefMut};

/// A fully isolated entity/component store. One world is owned by exactly one
/// session and is only ever touched from the thread driving that session.
///
/// Component stores are runtime borrow-checked: taking two views of different
/// component types is fine, taking a mutable view of a type that is already
/// borrowed is a programmer error and panics.
pub struct World {
    next_entity: u32,
    alive: HashSet<EntityId>,
    stores: HashMap<TypeId, RefCell<Box<dyn ComponentStore>>>,
    events: RefCell<EventBus>,
    log: logging::Logger,
}

impl World {
    #[inline]
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> World {
        let world_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        World {
            next_entity: 0,
            alive: HashSet::new(),
            stores: HashMap::new(),
            events: RefCell::new(EventBus::new()),
            log: world_log,
        }
    }

    /// Register a component type. Must happen before any `add` of that type.
    pub fn register<T: 'static>(&mut self) {
        logging::debug!(self.log, "registering component type";
                        "context" => "register",
                        "type" => type_name::<T>());

        let previous = self.stores.insert(
            TypeId::of::<T>(),
            RefCell::new(Box::new(SparseSet::<T>::new())),
        );

        if previous.is_some() {
            panic!("Component type registered twice: {}", type_name::<T>());
        }
    }

    /// Allocate a fresh entity id. Ids are never reused within the world's
    /// lifetime.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId::from(self.next_entity);
        self.next_entity += 1;
        self.alive.insert(id);

        logging::trace!(self.log, "entity spawned"; "context" => "spawn", "entity" => %id);

        id
    }

    /// Remove the entity and its record from every registered component type.
    /// Destroying an already dead entity is a no-op.
    pub fn destroy(&mut self, entity: EntityId) {
        if !self.alive.remove(&entity) {
            return;
        }

        for store in self.stores.values() {
            store.borrow_mut().discard(entity);
        }

        logging::trace!(self.log, "entity destroyed"; "context" => "destroy", "entity" => %entity);
    }

    #[inline]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.alive.contains(&entity)
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.alive.len()
    }

    /// Attach a component to a live entity. Adding to a dead entity is
    /// silently dropped; the destroy event is the authoritative end of life.
    pub fn add<T: 'static>(&self, entity: EntityId, value: T) {
        if !self.alive.contains(&entity) {
            logging::trace!(self.log, "component add on dead entity dropped";
                            "context" => "add",
                            "entity" => %entity,
                            "type" => type_name::<T>());
            return;
        }

        self.store_mut::<T>().insert(entity, value);
    }

    /// Detach a component from an entity.
    pub fn remove<T: 'static>(&self, entity: EntityId) -> Option<T> {
        self.store_mut::<T>().remove(entity)
    }

    #[inline]
    pub fn has<T: 'static>(&self, entity: EntityId) -> bool {
        self.view::<T>().contains(entity)
    }

    /// Borrow a single component record.
    pub fn get<T: 'static>(&self, entity: EntityId) -> Option<Ref<T>> {
        Ref::filter_map(self.view::<T>(), |set| set.get(entity)).ok()
    }

    /// Mutably borrow a single component record.
    pub fn get_mut<T: 'static>(&self, entity: EntityId) -> Option<RefMut<T>> {
        RefMut::filter_map(self.view_mut::<T>(), |set| set.get_mut(entity)).ok()
    }

    /// Shared view over all records of one component type.
    pub fn view<T: 'static>(&self) -> Ref<SparseSet<T>> {
        Ref::map(self.cell::<T>().borrow(), |store| {
            store
                .as_any()
                .downcast_ref::<SparseSet<T>>()
                .expect("store downcast can't fail")
        })
    }

    /// Exclusive view over all records of one component type.
    pub fn view_mut<T: 'static>(&self) -> RefMut<SparseSet<T>> {
        self.store_mut::<T>()
    }

    /// Publish an event on the world's bus. Dispatch is synchronous.
    #[inline]
    pub fn publish<E: 'static>(&self, event: &E) {
        self.events.borrow_mut().publish(event);
    }

    /// Subscribe a handler on the world's bus.
    #[inline]
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: 'static,
        F: FnMut(&E) + 'static,
    {
        self.events.borrow_mut().subscribe(handler)
    }

    #[inline]
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.borrow_mut().unsubscribe(id)
    }

    fn store_mut<T: 'static>(&self) -> RefMut<SparseSet<T>> {
        RefMut::map(self.cell::<T>().borrow_mut(), |store| {
            store
                .as_any_mut()
                .downcast_mut::<SparseSet<T>>()
                .expect("store downcast can't fail")
        })
    }

    fn cell<T: 'static>(&self) -> &RefCell<Box<dyn ComponentStore>> {
        self.stores
            .get(&TypeId::of::<T>())
            .unwrap_or_else(|| panic!("Component type not registered: {}", type_name::<T>()))
    }
}

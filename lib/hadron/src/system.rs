use crate::world::World;
use flare::logging;

/// A stateful simulation stage. Systems communicate only through components
/// and the world's event bus.
pub trait System {
    /// Stable name used for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Called once when the owning scheduler is built.
    fn init(&mut self, _world: &mut World) {}

    /// Called every tick with the fixed step delta in seconds.
    fn update(&mut self, world: &mut World, dt: f32);

    /// Called once when the owning scheduler shuts down.
    fn shutdown(&mut self, _world: &mut World) {}
}

/// Runs registered systems in declared order; that order defines the update
/// order within a tick.
pub struct Scheduler {
    systems: Vec<Box<dyn System>>,
    built: bool,
    log: logging::Logger,
}

impl Scheduler {
    #[inline]
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> Scheduler {
        let scheduler_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        Scheduler {
            systems: Vec::new(),
            built: false,
            log: scheduler_log,
        }
    }

    /// Register a system. Registration order is execution order.
    pub fn register(&mut self, system: Box<dyn System>) {
        if self.built {
            panic!("Can't register systems on a built scheduler");
        }

        logging::debug!(self.log, "registering system";
                        "context" => "register",
                        "system" => system.name());

        self.systems.push(system);
    }

    /// Finalize registration and run every system's `init` hook.
    pub fn build(&mut self, world: &mut World) {
        self.built = true;

        for system in self.systems.iter_mut() {
            logging::debug!(self.log, "initializing system";
                            "context" => "build",
                            "system" => system.name());
            system.init(world);
        }
    }

    /// Run one tick over all systems in registration order.
    pub fn run(&mut self, world: &mut World, dt: f32) {
        for system in self.systems.iter_mut() {
            logging::trace!(self.log, "system running";
                            "context" => "run",
                            "system" => system.name());
            system.update(world, dt);
        }
    }

    /// Run every system's `shutdown` hook in registration order.
    pub fn shutdown(&mut self, world: &mut World) {
        for system in self.systems.iter_mut() {
            logging::debug!(self.log, "shutting down system";
                            "context" => "shutdown",
                            "system" => system.name());
            system.shutdown(world);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.systems.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        tag: &'static str,
        trace: Rc<RefCell<Vec<String>>>,
    }

    impl System for Recorder {
        fn name(&self) -> &'static str {
            self.tag
        }

        fn init(&mut self, _world: &mut World) {
            self.trace.borrow_mut().push(format!("init:{}", self.tag));
        }

        fn update(&mut self, _world: &mut World, _dt: f32) {
            self.trace.borrow_mut().push(format!("update:{}", self.tag));
        }

        fn shutdown(&mut self, _world: &mut World) {
            self.trace.borrow_mut().push(format!("shutdown:{}", self.tag));
        }
    }

    #[test]
    fn test_declared_order_is_update_order() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut world = World::new(None);
        let mut scheduler = Scheduler::new(None);

        scheduler.register(Box::new(Recorder {
            tag: "first",
            trace: Rc::clone(&trace),
        }));
        scheduler.register(Box::new(Recorder {
            tag: "second",
            trace: Rc::clone(&trace),
        }));

        scheduler.build(&mut world);
        scheduler.run(&mut world, 0.05);
        scheduler.shutdown(&mut world);

        assert_eq!(
            *trace.borrow(),
            vec![
                "init:first",
                "init:second",
                "update:first",
                "update:second",
                "shutdown:first",
                "shutdown:second"
            ]
        );
    }

    #[test]
    #[should_panic(expected = "Can't register systems on a built scheduler")]
    fn test_register_after_build_panics() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let mut world = World::new(None);
        let mut scheduler = Scheduler::new(None);

        scheduler.build(&mut world);
        scheduler.register(Box::new(Recorder { tag: "late", trace }));
    }
}

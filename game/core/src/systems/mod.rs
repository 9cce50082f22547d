//! Server-side simulation systems. Registration order below is update order
//! within a tick: intent is integrated first, interactions resolved in the
//! middle, and destruction reaped last so every mutation of a tick is
//! reflected in that tick's snapshot.

pub mod attachment;
pub mod bounds;
pub mod collision;
pub mod destroy;
pub mod eating;
pub mod movement;
pub mod scroll;
pub mod shooting;
pub mod status;
pub mod transient;
pub mod waves;

pub use self::attachment::AttachmentSystem;
pub use self::bounds::BoundsSystem;
pub use self::collision::CollisionSystem;
pub use self::destroy::DestroySystem;
pub use self::eating::EatingSystem;
pub use self::movement::MovementSystem;
pub use self::scroll::ScrollSystem;
pub use self::shooting::ShootingSystem;
pub use self::status::StatusSystem;
pub use self::transient::TransientSystem;
pub use self::waves::WaveSystem;

use crate::protocol::Difficulty;
use crate::session::{SessionConfig, SessionKind};
use hadron::prelude::Scheduler;

pub fn register_all(scheduler: &mut Scheduler, difficulty: Difficulty, config: SessionConfig) {
    match config.kind {
        SessionKind::Shooter => {
            scheduler.register(Box::new(MovementSystem));
            scheduler.register(Box::new(AttachmentSystem));
            scheduler.register(Box::new(ScrollSystem));
            scheduler.register(Box::new(ShootingSystem::new()));
            scheduler.register(Box::new(WaveSystem::new(difficulty, config)));
            scheduler.register(Box::new(CollisionSystem));
            scheduler.register(Box::new(TransientSystem));
            scheduler.register(Box::new(BoundsSystem::new(config)));
            scheduler.register(Box::new(StatusSystem));
            scheduler.register(Box::new(DestroySystem));
        }
        SessionKind::Blob => {
            scheduler.register(Box::new(MovementSystem));
            scheduler.register(Box::new(AttachmentSystem));
            scheduler.register(Box::new(EatingSystem));
            scheduler.register(Box::new(TransientSystem));
            scheduler.register(Box::new(BoundsSystem::new(config)));
            scheduler.register(Box::new(StatusSystem));
            scheduler.register(Box::new(DestroySystem));
        }
    }
}

pub use crate::component::SparseSet;
pub use crate::entity::EntityId;
pub use crate::eventbus::{EventBus, SubscriptionId};
pub use crate::system::{Scheduler, System};
pub use crate::world::World;

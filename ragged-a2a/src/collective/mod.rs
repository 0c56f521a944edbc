mod backend;
mod group;
mod registration;

pub use backend::{Collectives, Communicator};
pub use group::{CollectiveOpGroupMode, GroupConfig, LogicalId, ReplicaGroup};
pub use registration::BufferRegistry;

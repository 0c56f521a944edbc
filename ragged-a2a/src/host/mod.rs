//! In-process participants: heap-backed executors, deferred-copy streams and
//! a mailbox communicator. Lets the engine run end to end without a GPU.

mod backend;
mod executor;
mod stream;
mod world;

pub use backend::{HostBackend, HostOpKind, IssuedOp};
pub use executor::HostExecutor;
pub use stream::HostStream;
pub use world::{HostParticipant, HostWorld};

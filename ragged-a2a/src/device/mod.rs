mod executor;
mod stream;

pub use executor::{Executor, HostAllocation};
pub use stream::Stream;

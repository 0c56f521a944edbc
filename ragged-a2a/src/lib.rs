pub mod collective;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod memory;
pub mod op;
pub mod ragged;
pub mod types;

pub use collective::{
    BufferRegistry, CollectiveOpGroupMode, Collectives, Communicator, GroupConfig, LogicalId,
    ReplicaGroup,
};
pub use config::EngineConfig;
pub use device::{Executor, HostAllocation, Stream};
pub use error::{RaggedError, Result};
pub use host::{HostBackend, HostExecutor, HostStream, HostWorld};
pub use memory::{BufferRef, Device, DeviceBufferPair, DeviceMemory, Host, HostMemory, MemorySpace};
pub use op::{PrimitiveType, RaggedAllToAllOp, Shape};
pub use ragged::{ExecuteParams, InitializeParams, RaggedAllToAllConfig, RaggedAllToAllThunk};
pub use types::{AsyncStreamKind, DataType, DeviceId, Rank};

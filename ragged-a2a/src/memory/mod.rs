mod buffer;
mod pair;

pub use buffer::{BufferRef, Device, DeviceMemory, Host, HostMemory, MemorySpace};
pub use pair::DeviceBufferPair;

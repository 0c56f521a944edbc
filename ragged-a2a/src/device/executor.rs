use crate::error::Result;
use crate::memory::HostMemory;
use crate::types::DeviceId;

/// A block of host memory that the device can DMA into.
///
/// Dropping the allocation releases it.
pub trait HostAllocation: Send + Sync {
    fn memory(&self) -> HostMemory;
}

/// A device context able to hand out pinned host memory.
///
/// - `HostExecutor` (built-in): plain heap memory for in-process participants.
/// - CUDA executors: page-locked memory via the driver (implemented externally).
pub trait Executor: Send + Sync {
    /// Identity used to key per-device resources.
    fn device_id(&self) -> DeviceId;

    /// Ordinal of the device within its process, used for logging.
    fn device_ordinal(&self) -> usize;

    /// Allocate `size_bytes` of host-addressable memory pinned for device
    /// transfers.
    fn host_memory_allocate(&self, size_bytes: usize) -> Result<Box<dyn HostAllocation>>;
}

use crate::error::Result;
use crate::memory::{DeviceMemory, HostMemory};
use crate::types::DeviceId;

/// An in-order queue of device work.
///
/// The engine only needs two capabilities from it: enqueue a device-to-host
/// copy, and block the calling thread until everything enqueued so far has
/// completed. Point-to-point transfers are attached to the stream by the
/// communicator, not through this trait.
pub trait Stream: Send + Sync {
    /// Device context that owns this stream.
    fn device_id(&self) -> DeviceId;

    /// Ordinal of the device within its process, used for logging.
    fn device_ordinal(&self) -> usize;

    /// Stable identifier used in error messages.
    fn label(&self) -> String;

    /// Enqueue a copy of `src.len_bytes()` bytes from device memory into
    /// `dst`. The copy is not host-visible until
    /// [`block_host_until_done`](Self::block_host_until_done) returns.
    ///
    /// # Safety
    /// `src` must be valid device memory and `dst` valid host memory of at
    /// least `src.len_bytes()` bytes, both kept alive until the stream is
    /// synchronized.
    unsafe fn memcpy_d2h(&self, dst: HostMemory, src: DeviceMemory) -> Result<()>;

    /// Block until all work enqueued on this stream has completed.
    fn block_host_until_done(&self) -> Result<()>;

    /// Raw backend handle (e.g. a `CUstream`), if the stream has one.
    fn native_handle(&self) -> Option<u64> {
        None
    }
}

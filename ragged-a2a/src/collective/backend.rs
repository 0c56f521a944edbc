use crate::device::Stream;
use crate::error::Result;
use crate::memory::DeviceMemory;
use crate::types::{DataType, Rank};

/// A communicator over a fixed set of ranks.
///
/// Sends and receives are enqueued on `stream`; completion is observed by
/// whatever consumes the stream afterwards.
pub trait Communicator: Send + Sync {
    /// Identity used to key buffer registrations.
    fn comm_id(&self) -> u64;

    /// Number of ranks in this communicator.
    fn num_ranks(&self) -> Result<usize>;

    /// Send `count` elements of `dtype` from `buf` to `peer`.
    ///
    /// # Safety
    /// `buf` must be valid device memory for `count * dtype.size_in_bytes()`
    /// bytes until the stream has drained.
    unsafe fn send(
        &self,
        buf: DeviceMemory,
        dtype: DataType,
        count: usize,
        peer: Rank,
        stream: &dyn Stream,
    ) -> Result<()>;

    /// Receive `count` elements of `dtype` from `peer` into `buf`.
    ///
    /// # Safety
    /// `buf` must be valid, writable device memory for
    /// `count * dtype.size_in_bytes()` bytes until the stream has drained.
    unsafe fn recv(
        &self,
        buf: DeviceMemory,
        dtype: DataType,
        count: usize,
        peer: Rank,
        stream: &dyn Stream,
    ) -> Result<()>;
}

/// Process-level collective library (NCCL or the host backend).
///
/// Operations issued between [`group_start`](Self::group_start) and
/// [`group_end`](Self::group_end) form one batch; the library may schedule
/// them in any order and only reports their outcome at `group_end`.
pub trait Collectives: Send + Sync {
    fn group_start(&self) -> Result<()>;

    fn group_end(&self) -> Result<()>;

    /// Close a group region after a failure inside it.
    ///
    /// Default: plain `group_end`. Backends that can discard the pending batch
    /// should do so instead of launching a partial exchange.
    fn group_abort(&self) -> Result<()> {
        self.group_end()
    }

    /// Whether buffers must be registered with the communicator before use.
    fn requires_buffer_registration(&self) -> bool {
        false
    }

    /// Register `buf` with `comm` for zero-copy transfers.
    ///
    /// # Safety
    /// `buf` must stay valid for as long as `comm` may use the registration.
    unsafe fn register_buffer(&self, _comm: &dyn Communicator, _buf: DeviceMemory) -> Result<()> {
        Ok(())
    }

    /// View of `count` elements of `dtype` starting at element `offset`.
    fn slice(&self, buf: DeviceMemory, dtype: DataType, offset: usize, count: usize) -> DeviceMemory {
        let elem = dtype.size_in_bytes();
        buf.slice_unchecked(offset * elem, count * elem)
    }
}

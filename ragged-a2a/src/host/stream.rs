use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;

use crate::device::Stream;
use crate::error::{RaggedError, Result};
use crate::memory::{DeviceMemory, HostMemory};
use crate::types::DeviceId;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Copy enqueued on a [`HostStream`], applied at the next synchronization.
#[derive(Debug)]
struct PendingCopy {
    dst: u64,
    src: u64,
    len: usize,
}

/// In-order work queue for an in-process participant.
///
/// Device-to-host copies are deferred until `block_host_until_done`, so a
/// reader that skips the wait sees stale host memory, as it would on a GPU.
#[derive(Debug)]
pub struct HostStream {
    id: u64,
    device: DeviceId,
    pending: SegQueue<PendingCopy>,
    completed: AtomicUsize,
    fail_next_sync: AtomicBool,
}

impl HostStream {
    pub fn new(device: DeviceId) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            device,
            pending: SegQueue::new(),
            completed: AtomicUsize::new(0),
            fail_next_sync: AtomicBool::new(false),
        }
    }

    /// Copies enqueued but not yet applied.
    pub fn pending_copies(&self) -> usize {
        self.pending.len()
    }

    /// Copies applied so far.
    pub fn completed_copies(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Make the next `block_host_until_done` fail. Pending copies are
    /// discarded, as if the device had faulted.
    pub fn fail_next_sync(&self) {
        self.fail_next_sync.store(true, Ordering::Release);
    }
}

impl Stream for HostStream {
    fn device_id(&self) -> DeviceId {
        self.device
    }

    fn device_ordinal(&self) -> usize {
        self.device as usize
    }

    fn label(&self) -> String {
        format!("host-stream#{}", self.id)
    }

    unsafe fn memcpy_d2h(&self, dst: HostMemory, src: DeviceMemory) -> Result<()> {
        if dst.len_bytes() < src.len_bytes() {
            return Err(RaggedError::BufferSizeMismatch {
                expected: src.len_bytes(),
                actual: dst.len_bytes(),
            });
        }
        self.pending.push(PendingCopy {
            dst: dst.as_u64(),
            src: src.as_u64(),
            len: src.len_bytes(),
        });
        Ok(())
    }

    fn block_host_until_done(&self) -> Result<()> {
        if self.fail_next_sync.swap(false, Ordering::AcqRel) {
            while self.pending.pop().is_some() {}
            return Err(RaggedError::device("injected stream fault"));
        }
        while let Some(copy) = self.pending.pop() {
            if copy.len > 0 {
                // SAFETY: both ranges were declared valid by the caller of
                // `memcpy_d2h` until this synchronization.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        copy.src as *const u8,
                        copy.dst as *mut u8,
                        copy.len,
                    );
                }
            }
            self.completed.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::device::{Executor, HostAllocation};
use crate::error::{RaggedError, Result};
use crate::memory::HostMemory;
use crate::types::DeviceId;

/// Heap block handed out by [`HostExecutor`]. 8-byte aligned.
struct HostBlock {
    ptr: *mut u64,
    words: usize,
    len_bytes: usize,
}

// SAFETY: the block is uniquely owned; concurrent access to its contents is
// governed by the scratch lease, not by this type.
unsafe impl Send for HostBlock {}
unsafe impl Sync for HostBlock {}

impl HostBlock {
    fn zeroed(len_bytes: usize) -> Self {
        let words = len_bytes.div_ceil(8);
        let ptr = Box::into_raw(vec![0u64; words].into_boxed_slice()) as *mut u64;
        Self {
            ptr,
            words,
            len_bytes,
        }
    }
}

impl HostAllocation for HostBlock {
    fn memory(&self) -> HostMemory {
        unsafe { HostMemory::new(self.ptr as u64, self.len_bytes) }
    }
}

impl Drop for HostBlock {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr, self.words,
            )));
        }
    }
}

/// In-process device context backed by ordinary heap memory.
#[derive(Debug)]
pub struct HostExecutor {
    device: DeviceId,
    allocations: AtomicUsize,
    fail_next: AtomicBool,
}

impl HostExecutor {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            allocations: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Successful allocations so far.
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Acquire)
    }

    /// Make the next `host_memory_allocate` fail.
    pub fn fail_next_allocation(&self) {
        self.fail_next.store(true, Ordering::Release);
    }
}

impl Executor for HostExecutor {
    fn device_id(&self) -> DeviceId {
        self.device
    }

    fn device_ordinal(&self) -> usize {
        self.device as usize
    }

    fn host_memory_allocate(&self, size_bytes: usize) -> Result<Box<dyn HostAllocation>> {
        if self.fail_next.swap(false, Ordering::AcqRel) {
            return Err(RaggedError::device(format!(
                "injected allocation failure for {size_bytes} bytes"
            )));
        }
        self.allocations.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(HostBlock::zeroed(size_bytes)))
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::{Executor, HostAllocation};
use crate::error::{RaggedError, Result};
use crate::memory::HostMemory;
use crate::types::DeviceId;

/// Width of one scratch slot. Tables may be 32- or 64-bit; every slot is
/// sized for the wider case so the region layout does not depend on type.
pub const SCRATCH_SLOT_BYTES: usize = std::mem::size_of::<i64>();

/// Number of metadata tables staged per invocation.
pub const SCRATCH_TABLES: usize = 4;

/// Pinned host block holding the four offset/size tables of one device.
pub struct HostScratch {
    device: DeviceId,
    rows: usize,
    allocation: Box<dyn HostAllocation>,
    leased: AtomicBool,
}

impl std::fmt::Debug for HostScratch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostScratch")
            .field("device", &self.device)
            .field("rows", &self.rows)
            .field("memory", &self.allocation.memory())
            .finish()
    }
}

impl HostScratch {
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Rows per table.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The whole block.
    pub fn memory(&self) -> HostMemory {
        self.allocation.memory()
    }

    /// Take exclusive use of the block for one invocation.
    ///
    /// Fails with `InvocationInFlight` if another invocation on the same
    /// device still holds it.
    pub fn lease(self: &Arc<Self>) -> Result<ScratchLease> {
        if self
            .leased
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(RaggedError::InvocationInFlight {
                device: self.device,
            });
        }
        Ok(ScratchLease {
            scratch: Arc::clone(self),
        })
    }

    pub fn is_leased(&self) -> bool {
        self.leased.load(Ordering::Acquire)
    }
}

/// Exclusive handle on a [`HostScratch`] for the duration of one invocation.
pub struct ScratchLease {
    scratch: Arc<HostScratch>,
}

impl ScratchLease {
    pub fn rows(&self) -> usize {
        self.scratch.rows
    }

    pub fn device(&self) -> DeviceId {
        self.scratch.device
    }

    /// Host region reserved for table `table` (0..4).
    pub fn region(&self, table: usize) -> Option<HostMemory> {
        if table >= SCRATCH_TABLES {
            return None;
        }
        let stride = self.scratch.rows * SCRATCH_SLOT_BYTES;
        self.scratch.memory().slice(table * stride, stride)
    }

    /// Bytes of table `table`.
    ///
    /// # Safety
    /// No device copy into this region may be in flight: the stream that
    /// filled it must have been synchronized.
    pub unsafe fn region_bytes(&self, table: usize) -> Option<&[u8]> {
        let region = self.region(table)?;
        if region.is_empty() {
            return Some(&[]);
        }
        Some(unsafe {
            std::slice::from_raw_parts(region.as_u64() as *const u8, region.len_bytes())
        })
    }
}

impl Drop for ScratchLease {
    fn drop(&mut self) {
        self.scratch.leased.store(false, Ordering::Release);
    }
}

/// Per-device registry of host scratch blocks.
///
/// Lookup-or-insert runs under one mutex; handles are used without it.
#[derive(Debug)]
pub struct HostScratchCache {
    rows: usize,
    allocs: Mutex<HashMap<DeviceId, Arc<HostScratch>>>,
}

impl HostScratchCache {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            allocs: Mutex::new(HashMap::new()),
        }
    }

    /// Bytes allocated per device.
    pub fn size_in_bytes(&self) -> usize {
        SCRATCH_TABLES * self.rows * SCRATCH_SLOT_BYTES
    }

    /// Return the block for `executor`'s device, allocating it on first use.
    pub fn ensure_allocated(&self, executor: &dyn Executor) -> Result<Arc<HostScratch>> {
        let device = executor.device_id();
        let mut allocs = self
            .allocs
            .lock()
            .map_err(|_| RaggedError::LockPoisoned("host scratch registry"))?;

        if let Some(existing) = allocs.get(&device) {
            return Ok(Arc::clone(existing));
        }

        let bytes = self.size_in_bytes();
        let allocation = executor
            .host_memory_allocate(bytes)
            .map_err(|e| RaggedError::Resource {
                device,
                bytes,
                reason: e.to_string(),
            })?;
        let got = allocation.memory().len_bytes();
        if got < bytes {
            return Err(RaggedError::Resource {
                device,
                bytes,
                reason: format!("allocator returned only {got} bytes"),
            });
        }

        tracing::info!(
            device,
            ordinal = executor.device_ordinal(),
            bytes,
            "allocated ragged all-to-all host scratch"
        );

        let scratch = Arc::new(HostScratch {
            device,
            rows: self.rows,
            allocation,
            leased: AtomicBool::new(false),
        });
        allocs.insert(device, Arc::clone(&scratch));
        Ok(scratch)
    }

    /// Block for `device`, which must have been initialized.
    pub fn get(&self, device: DeviceId) -> Result<Arc<HostScratch>> {
        let allocs = self
            .allocs
            .lock()
            .map_err(|_| RaggedError::LockPoisoned("host scratch registry"))?;
        allocs
            .get(&device)
            .cloned()
            .ok_or(RaggedError::NotInitialized { device })
    }

    /// Number of devices with a block.
    pub fn len(&self) -> usize {
        self.allocs.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use std::ffi::c_void;
use std::sync::Arc;

use cudarc::driver::CudaContext;
use ragged_a2a::{DeviceId, Executor, HostAllocation, HostMemory, RaggedError};

/// Page-locked host block from `cuMemHostAlloc`, freed on drop.
struct PinnedHostBlock {
    ptr: u64,
    len_bytes: usize,
}

impl HostAllocation for PinnedHostBlock {
    fn memory(&self) -> HostMemory {
        unsafe { HostMemory::new(self.ptr, self.len_bytes) }
    }
}

impl Drop for PinnedHostBlock {
    fn drop(&mut self) {
        if self.ptr == 0 {
            return;
        }
        unsafe {
            if let Err(e) = cudarc::driver::result::free_host(self.ptr as *mut c_void) {
                tracing::error!(
                    ptr = format_args!("0x{:x}", self.ptr),
                    bytes = self.len_bytes,
                    "failed to free pinned host scratch: {e}"
                );
            }
        }
    }
}

/// Device context for one GPU.
pub struct CudaExecutor {
    ctx: Arc<CudaContext>,
}

impl CudaExecutor {
    /// Create a context for the GPU with the given ordinal.
    pub fn new(device_ordinal: usize) -> ragged_a2a::Result<Self> {
        let ctx = CudaContext::new(device_ordinal).map_err(|e| {
            RaggedError::device_with_source(
                format!("failed to create CUDA context for GPU {device_ordinal}"),
                e,
            )
        })?;
        Ok(Self { ctx })
    }

    pub fn context(&self) -> &Arc<CudaContext> {
        &self.ctx
    }
}

impl Executor for CudaExecutor {
    fn device_id(&self) -> DeviceId {
        self.ctx.ordinal() as DeviceId
    }

    fn device_ordinal(&self) -> usize {
        self.ctx.ordinal()
    }

    fn host_memory_allocate(&self, size_bytes: usize) -> ragged_a2a::Result<Box<dyn HostAllocation>> {
        if size_bytes == 0 {
            return Ok(Box::new(PinnedHostBlock {
                ptr: 0,
                len_bytes: 0,
            }));
        }
        self.ctx
            .bind_to_thread()
            .map_err(|e| RaggedError::device_with_source("CUDA bind_to_thread failed", e))?;
        let ptr = unsafe { cudarc::driver::result::malloc_host(size_bytes, 0) }
            .map_err(|e| RaggedError::device_with_source("cuMemHostAlloc failed", e))?;
        Ok(Box::new(PinnedHostBlock {
            ptr: ptr as u64,
            len_bytes: size_bytes,
        }))
    }
}

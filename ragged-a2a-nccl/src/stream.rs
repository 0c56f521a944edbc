use std::ffi::c_void;
use std::sync::Arc;

use cudarc::driver::CudaStream;
use ragged_a2a::{DeviceId, DeviceMemory, HostMemory, RaggedError, Stream};

/// A CUDA stream as seen by the engine.
pub struct CudaStreamHandle {
    stream: Arc<CudaStream>,
    ordinal: usize,
}

impl CudaStreamHandle {
    pub fn new(stream: Arc<CudaStream>) -> Self {
        let ordinal = stream.context().ordinal();
        Self { stream, ordinal }
    }

    pub fn inner(&self) -> &Arc<CudaStream> {
        &self.stream
    }
}

impl Stream for CudaStreamHandle {
    fn device_id(&self) -> DeviceId {
        self.ordinal as DeviceId
    }

    fn device_ordinal(&self) -> usize {
        self.ordinal
    }

    fn label(&self) -> String {
        format!("{:p}", self.stream.cu_stream() as *const c_void)
    }

    unsafe fn memcpy_d2h(&self, dst: HostMemory, src: DeviceMemory) -> ragged_a2a::Result<()> {
        if dst.len_bytes() < src.len_bytes() {
            return Err(RaggedError::BufferSizeMismatch {
                expected: src.len_bytes(),
                actual: dst.len_bytes(),
            });
        }
        if src.is_empty() {
            return Ok(());
        }
        unsafe {
            let host = std::slice::from_raw_parts_mut(dst.as_u64() as *mut u8, src.len_bytes());
            cudarc::driver::result::memcpy_dtoh_async(
                host,
                src.as_u64() as cudarc::driver::sys::CUdeviceptr,
                self.stream.cu_stream(),
            )
        }
        .map_err(|e| RaggedError::device_with_source("cuMemcpyDtoHAsync failed", e))
    }

    fn block_host_until_done(&self) -> ragged_a2a::Result<()> {
        unsafe { cudarc::driver::result::stream::synchronize(self.stream.cu_stream()) }
            .map_err(|e| RaggedError::device_with_source("cuStreamSynchronize failed", e))
    }

    fn native_handle(&self) -> Option<u64> {
        Some(self.stream.cu_stream() as u64)
    }
}

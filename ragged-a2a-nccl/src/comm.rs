use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use cudarc::nccl::{result as nccl, safe::Id, sys};
use ragged_a2a::{Communicator, DataType, DeviceMemory, RaggedError, Rank, Stream};

use crate::error::{NcclCommError, Result};
use crate::types::to_nccl_dtype;

static NEXT_COMM_ID: AtomicU64 = AtomicU64::new(1);

/// Wrapper around a raw `ncclComm_t` handle.
///
/// Uses cudarc's `result` layer directly because device pointers are carried
/// as `u64` addresses throughout the engine.
pub struct NcclComm {
    comm: sys::ncclComm_t,
    id: u64,
    rank: Rank,
    world_size: usize,
}

// SAFETY: ncclComm_t is thread-safe per NCCL documentation when used with
// proper stream synchronization.
unsafe impl Send for NcclComm {}
unsafe impl Sync for NcclComm {}

impl NcclComm {
    /// Join a communicator of `world_size` ranks identified by `id`.
    ///
    /// Every rank must call this with the same `id` and `world_size` but its
    /// own `rank`. Blocks until all ranks have joined.
    pub fn init(rank: Rank, world_size: usize, id: Id) -> Result<Self> {
        if rank as usize >= world_size {
            return Err(NcclCommError::InvalidRank {
                rank,
                world_size: world_size as u32,
            });
        }
        let mut comm = MaybeUninit::uninit();
        unsafe {
            nccl::comm_init_rank(
                comm.as_mut_ptr(),
                world_size as i32,
                *id_to_sys(&id),
                rank as i32,
            )?;
        }
        let comm = Self {
            comm: unsafe { comm.assume_init() },
            id: NEXT_COMM_ID.fetch_add(1, Ordering::Relaxed),
            rank,
            world_size,
        };
        tracing::debug!(rank, world_size, comm = comm.id, "joined NCCL communicator");
        Ok(comm)
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    fn check_peer(&self, peer: Rank) -> ragged_a2a::Result<i32> {
        if peer as usize >= self.world_size {
            return Err(RaggedError::InvalidRank {
                rank: peer,
                world_size: self.world_size as u32,
            });
        }
        Ok(peer as i32)
    }
}

fn cuda_stream(stream: &dyn Stream) -> ragged_a2a::Result<sys::cudaStream_t> {
    stream
        .native_handle()
        .map(|h| h as sys::cudaStream_t)
        .ok_or_else(|| {
            RaggedError::device(format!(
                "stream {} has no CUDA handle; NCCL transfers need a CUDA stream",
                stream.label()
            ))
        })
}

fn element_bytes(buf: DeviceMemory, dtype: DataType, count: usize) -> ragged_a2a::Result<()> {
    let len = count * dtype.size_in_bytes();
    if len > buf.len_bytes() {
        return Err(RaggedError::BufferSizeMismatch {
            expected: len,
            actual: buf.len_bytes(),
        });
    }
    Ok(())
}

impl Communicator for NcclComm {
    fn comm_id(&self) -> u64 {
        self.id
    }

    fn num_ranks(&self) -> ragged_a2a::Result<usize> {
        Ok(self.world_size)
    }

    unsafe fn send(
        &self,
        buf: DeviceMemory,
        dtype: DataType,
        count: usize,
        peer: Rank,
        stream: &dyn Stream,
    ) -> ragged_a2a::Result<()> {
        let peer_i = self.check_peer(peer)?;
        element_bytes(buf, dtype, count)?;
        let cu_stream = cuda_stream(stream)?;
        unsafe {
            nccl::send(
                buf.as_u64() as *const c_void,
                count,
                to_nccl_dtype(dtype),
                peer_i,
                self.comm,
                cu_stream,
            )
        }
        .map_err(|e| RaggedError::CollectiveFailed {
            operation: "ncclSend",
            rank: peer,
            reason: format!("{e:?}"),
        })?;
        Ok(())
    }

    unsafe fn recv(
        &self,
        buf: DeviceMemory,
        dtype: DataType,
        count: usize,
        peer: Rank,
        stream: &dyn Stream,
    ) -> ragged_a2a::Result<()> {
        let peer_i = self.check_peer(peer)?;
        element_bytes(buf, dtype, count)?;
        let cu_stream = cuda_stream(stream)?;
        unsafe {
            nccl::recv(
                buf.as_u64() as *mut c_void,
                count,
                to_nccl_dtype(dtype),
                peer_i,
                self.comm,
                cu_stream,
            )
        }
        .map_err(|e| RaggedError::CollectiveFailed {
            operation: "ncclRecv",
            rank: peer,
            reason: format!("{e:?}"),
        })?;
        Ok(())
    }
}

impl Drop for NcclComm {
    fn drop(&mut self) {
        unsafe {
            // comm_abort does not wait on outstanding stream work.
            let _ = nccl::comm_abort(self.comm);
        }
    }
}

/// Convert our `Id` to the sys-level `ncclUniqueId`.
///
/// `ncclUniqueId` is `#[repr(C)]` with a single `internal: [c_char; 128]`
/// field, which is exactly what `Id::internal()` points at.
fn id_to_sys(id: &Id) -> &sys::ncclUniqueId {
    let internal = id.internal();
    unsafe { &*(internal as *const [std::ffi::c_char; 128] as *const sys::ncclUniqueId) }
}

/// Serialize an NCCL unique ID so rank 0 can hand it to the others.
pub fn id_to_bytes(id: &Id) -> Vec<u8> {
    id.internal().iter().map(|&c| c as u8).collect()
}

/// Rebuild an NCCL unique ID from the bytes produced by [`id_to_bytes`].
pub fn id_from_bytes(bytes: &[u8]) -> Result<Id> {
    if bytes.len() != 128 {
        return Err(NcclCommError::Bootstrap {
            reason: format!("unique id must be 128 bytes, got {}", bytes.len()),
        });
    }
    let mut internal = [0 as std::ffi::c_char; 128];
    for (dst, &b) in internal.iter_mut().zip(bytes) {
        *dst = b as std::ffi::c_char;
    }
    Ok(Id::uninit(internal))
}

use std::collections::HashSet;
use std::sync::Mutex;

use crate::collective::{Collectives, Communicator};
use crate::error::{RaggedError, Result};
use crate::memory::DeviceMemory;

/// Remembers which (communicator, buffer) pairs were registered with the
/// backend so each pair is registered at most once.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    registered: Mutex<HashSet<(u64, u64, usize)>>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every buffer in `buffers` that `comm` has not seen yet.
    ///
    /// No-op when the backend does not require registration. Returns the
    /// number of buffers registered by this call.
    ///
    /// # Safety
    /// Every buffer must stay valid for as long as `comm` may use it.
    pub unsafe fn maybe_register(
        &self,
        collectives: &dyn Collectives,
        comm: &dyn Communicator,
        buffers: &[DeviceMemory],
    ) -> Result<usize> {
        if !collectives.requires_buffer_registration() {
            return Ok(0);
        }

        let mut registered = self
            .registered
            .lock()
            .map_err(|_| RaggedError::LockPoisoned("buffer registry"))?;

        let mut added = 0;
        for buf in buffers {
            if buf.is_empty() {
                continue;
            }
            let key = (comm.comm_id(), buf.as_u64(), buf.len_bytes());
            if registered.contains(&key) {
                continue;
            }
            unsafe { collectives.register_buffer(comm, *buf)? };
            registered.insert(key);
            added += 1;
        }
        if added > 0 {
            tracing::debug!(comm = comm.comm_id(), added, "registered collective buffers");
        }
        Ok(added)
    }

    /// Number of distinct registrations recorded.
    pub fn len(&self) -> usize {
        self.registered.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

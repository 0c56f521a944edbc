//! Typed buffer references that encode memory space in the type system.
//!
//! Zero-cost wrappers around raw `u64` addresses. The type parameter keeps a
//! host scratch address from being handed to the backend where a device
//! address is expected (and vice versa).

use std::marker::PhantomData;

mod private {
    pub trait Sealed {}
}

/// Marker trait for memory spaces (host vs device).
pub trait MemorySpace: private::Sealed {}

/// Host (CPU) memory.
pub enum Host {}
impl private::Sealed for Host {}
impl MemorySpace for Host {}

/// Device (accelerator) memory.
pub enum Device {}
impl private::Sealed for Device {}
impl MemorySpace for Device {}

/// A typed, sized buffer reference in a specific memory space.
pub struct BufferRef<S: MemorySpace> {
    ptr: u64,
    len_bytes: usize,
    _space: PhantomData<S>,
}

// Manual impls: the derives would put bounds on `S`, which is uninhabited.
impl<S: MemorySpace> Clone for BufferRef<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: MemorySpace> Copy for BufferRef<S> {}

impl<S: MemorySpace> PartialEq for BufferRef<S> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.len_bytes == other.len_bytes
    }
}

impl<S: MemorySpace> Eq for BufferRef<S> {}

impl<S: MemorySpace> std::hash::Hash for BufferRef<S> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
        self.len_bytes.hash(state);
    }
}

impl<S: MemorySpace> std::fmt::Debug for BufferRef<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferRef(0x{:x}, {}B)", self.ptr, self.len_bytes)
    }
}

impl<S: MemorySpace> BufferRef<S> {
    /// Create a new buffer reference.
    ///
    /// # Safety
    /// `ptr` must point to at least `len_bytes` of valid memory in space `S`
    /// for as long as the reference is used.
    pub unsafe fn new(ptr: u64, len_bytes: usize) -> Self {
        Self {
            ptr,
            len_bytes,
            _space: PhantomData,
        }
    }

    /// Size of the buffer in bytes.
    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Returns true if the buffer has zero length.
    pub fn is_empty(&self) -> bool {
        self.len_bytes == 0
    }

    /// Get the raw `u64` address.
    pub fn as_u64(&self) -> u64 {
        self.ptr
    }

    /// Sub-range `[offset, offset + len)` in bytes, or `None` if it does not
    /// fit inside this buffer.
    pub fn slice(&self, offset_bytes: usize, len_bytes: usize) -> Option<Self> {
        let end = offset_bytes.checked_add(len_bytes)?;
        if end > self.len_bytes {
            return None;
        }
        Some(Self {
            ptr: self.ptr + offset_bytes as u64,
            len_bytes,
            _space: PhantomData,
        })
    }

    /// Same as [`slice`](Self::slice) but without the extent check.
    ///
    /// Used when the backend owns bounds validation.
    pub fn slice_unchecked(&self, offset_bytes: usize, len_bytes: usize) -> Self {
        Self {
            ptr: self.ptr.wrapping_add(offset_bytes as u64),
            len_bytes,
            _space: PhantomData,
        }
    }
}

impl<S: MemorySpace> std::fmt::Display for BufferRef<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferRef(0x{:x}, {}B)", self.ptr, self.len_bytes)
    }
}

/// Device address range.
pub type DeviceMemory = BufferRef<Device>;

/// Host address range.
pub type HostMemory = BufferRef<Host>;

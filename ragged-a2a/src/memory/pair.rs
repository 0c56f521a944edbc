use crate::memory::DeviceMemory;
use crate::types::DataType;

/// One operand of a collective, resolved to device addresses for a single
/// invocation.
///
/// For the payload operand `source` is the input buffer and `destination`
/// is the output buffer. Metadata operands only read `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBufferPair {
    pub element_type: DataType,
    pub element_count: usize,
    pub source: DeviceMemory,
    pub destination: DeviceMemory,
}

impl DeviceBufferPair {
    pub fn new(
        element_type: DataType,
        element_count: usize,
        source: DeviceMemory,
        destination: DeviceMemory,
    ) -> Self {
        Self {
            element_type,
            element_count,
            source,
            destination,
        }
    }

    /// Bytes covered by `element_count` elements of `element_type`.
    pub fn size_in_bytes(&self) -> usize {
        self.element_count * self.element_type.size_in_bytes()
    }
}

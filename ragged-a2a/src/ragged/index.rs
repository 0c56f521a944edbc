use crate::error::{RaggedError, Result};
use crate::types::DataType;

/// Integer width and signedness of an offset/size table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexWidth {
    S32,
    U32,
    S64,
    U64,
}

impl IndexWidth {
    pub fn from_data_type(dtype: DataType) -> Result<Self> {
        match dtype {
            DataType::I32 => Ok(Self::S32),
            DataType::U32 => Ok(Self::U32),
            DataType::I64 => Ok(Self::S64),
            DataType::U64 => Ok(Self::U64),
            other => Err(RaggedError::UnsupportedDType {
                dtype: other,
                op: "ragged index table",
            }),
        }
    }

    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::S32 | Self::U32 => 4,
            Self::S64 | Self::U64 => 8,
        }
    }
}

/// Read-only view of an offset/size table staged in host memory.
///
/// Every access widens to `i64`: unsigned 32-bit values are zero-extended,
/// unsigned 64-bit values above `i64::MAX` wrap negative and are rejected by
/// the exchange planner.
#[derive(Debug, Clone, Copy)]
pub struct IndexView<'a> {
    width: IndexWidth,
    bytes: &'a [u8],
    len: usize,
}

impl<'a> IndexView<'a> {
    /// View `len` entries of `dtype` at the start of `bytes`.
    pub fn new(dtype: DataType, bytes: &'a [u8], len: usize) -> Result<Self> {
        let width = IndexWidth::from_data_type(dtype)?;
        let needed = len * width.size_in_bytes();
        if bytes.len() < needed {
            return Err(RaggedError::BufferSizeMismatch {
                expected: needed,
                actual: bytes.len(),
            });
        }
        Ok(Self { width, bytes, len })
    }

    pub fn width(&self) -> IndexWidth {
        self.width
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entry `i`, or `None` past the end.
    pub fn try_get(&self, i: usize) -> Option<i64> {
        if i >= self.len {
            return None;
        }
        let size = self.width.size_in_bytes();
        let raw = &self.bytes[i * size..(i + 1) * size];
        let value = match self.width {
            IndexWidth::S32 => i32::from_ne_bytes(raw.try_into().ok()?) as i64,
            IndexWidth::U32 => u32::from_ne_bytes(raw.try_into().ok()?) as i64,
            IndexWidth::S64 => i64::from_ne_bytes(raw.try_into().ok()?),
            IndexWidth::U64 => u64::from_ne_bytes(raw.try_into().ok()?) as i64,
        };
        Some(value)
    }

    /// Entry `i`.
    ///
    /// # Panics
    /// If `i >= self.len()`.
    pub fn get(&self, i: usize) -> i64 {
        match self.try_get(i) {
            Some(v) => v,
            None => panic!("index {i} out of range for table of {} entries", self.len),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len).filter_map(|i| self.try_get(i))
    }
}

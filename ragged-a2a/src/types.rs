/// Rank of a participant in a communicator (0-indexed).
pub type Rank = u32;

/// Identity of a device context (one accelerator, or one host participant).
///
/// Scratch allocations and buffer registrations are keyed by this value.
pub type DeviceId = u64;

/// Element types that can cross the collective backend.
///
/// Mirrors the set of types NCCL can move natively. Metadata tables
/// (offsets/sizes) are restricted to the four integer index types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    F64 = 1,
    F16 = 2,
    BF16 = 3,
    I8 = 4,
    I32 = 5,
    I64 = 6,
    U8 = 7,
    U32 = 8,
    U64 = 9,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
            DataType::F16 | DataType::BF16 => 2,
            DataType::I8 | DataType::U8 => 1,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::F16 => "f16",
            DataType::BF16 => "bf16",
            DataType::I8 => "i8",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U8 => "u8",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
        }
    }

    /// Whether this type may back an offset/size table.
    pub const fn is_index_type(self) -> bool {
        matches!(
            self,
            DataType::I32 | DataType::U32 | DataType::I64 | DataType::U64
        )
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which async stream a scheduler should place the collective on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncStreamKind {
    /// Dedicated collective stream.
    Collective,
}

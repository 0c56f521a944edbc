use crate::types::DataType;

/// Element types an operation may declare, including ones no collective
/// backend can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    BF16,
    F32,
    F64,
    C64,
    C128,
    Tuple,
    Token,
}

impl PrimitiveType {
    /// Backend element type, or `None` when the collective backend cannot
    /// transfer this type.
    pub const fn to_data_type(self) -> Option<DataType> {
        match self {
            Self::S8 => Some(DataType::I8),
            Self::S32 => Some(DataType::I32),
            Self::S64 => Some(DataType::I64),
            Self::U8 | Self::Pred => Some(DataType::U8),
            Self::U32 => Some(DataType::U32),
            Self::U64 => Some(DataType::U64),
            Self::F16 => Some(DataType::F16),
            Self::BF16 => Some(DataType::BF16),
            Self::F32 => Some(DataType::F32),
            Self::F64 => Some(DataType::F64),
            Self::S16 | Self::U16 | Self::C64 | Self::C128 | Self::Tuple | Self::Token => None,
        }
    }

    pub const fn is_array(self) -> bool {
        !matches!(self, Self::Tuple | Self::Token)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Pred => "pred",
            Self::S8 => "s8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::C64 => "c64",
            Self::C128 => "c128",
            Self::Tuple => "tuple",
            Self::Token => "token",
        }
    }
}

/// Declared shape of an operand or result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    pub element_type: PrimitiveType,
    pub dims: Vec<usize>,
}

impl Shape {
    pub fn array(element_type: PrimitiveType, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            element_type,
            dims: dims.into(),
        }
    }

    /// Total number of elements (1 for a scalar).
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Size of dimension 0, if the shape has one.
    pub fn leading_dim(&self) -> Option<usize> {
        self.dims.first().copied()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.element_type.name())?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

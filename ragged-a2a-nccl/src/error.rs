use cudarc::nccl::result::NcclError;
use ragged_a2a::{RaggedError, Rank};

pub type Result<T> = std::result::Result<T, NcclCommError>;

#[derive(Debug, thiserror::Error)]
pub enum NcclCommError {
    #[error("NCCL error: {0:?}")]
    Nccl(NcclError),

    #[error("engine error: {0}")]
    Ragged(#[from] RaggedError),

    #[error("CUDA driver error: {0}")]
    CudaDriver(#[from] cudarc::driver::result::DriverError),

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("NCCL bootstrap failed: {reason}")]
    Bootstrap { reason: String },
}

impl From<NcclError> for NcclCommError {
    fn from(e: NcclError) -> Self {
        NcclCommError::Nccl(e)
    }
}

impl From<NcclCommError> for RaggedError {
    fn from(e: NcclCommError) -> Self {
        match e {
            NcclCommError::Ragged(inner) => inner,
            NcclCommError::InvalidRank { rank, world_size } => {
                RaggedError::InvalidRank { rank, world_size }
            }
            other => RaggedError::device(other.to_string()),
        }
    }
}

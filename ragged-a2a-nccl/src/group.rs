use cudarc::nccl::result as nccl;
use ragged_a2a::{Collectives, RaggedError};

/// Process-wide NCCL group calls.
///
/// NCCL has no way to discard a batch once it was opened, so closing a
/// group after a failure launches whatever was already issued.
#[derive(Debug, Default, Clone, Copy)]
pub struct NcclCollectives;

impl Collectives for NcclCollectives {
    fn group_start(&self) -> ragged_a2a::Result<()> {
        unsafe { nccl::group_start() }.map_err(|e| RaggedError::GroupFailed {
            operation: "ncclGroupStart",
            reason: format!("{e:?}"),
        })?;
        Ok(())
    }

    fn group_end(&self) -> ragged_a2a::Result<()> {
        unsafe { nccl::group_end() }.map_err(|e| RaggedError::GroupFailed {
            operation: "ncclGroupEnd",
            reason: format!("{e:?}"),
        })?;
        Ok(())
    }
}

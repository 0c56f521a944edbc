use crate::types::{DataType, DeviceId, Rank};

pub type Result<T> = std::result::Result<T, RaggedError>;

#[derive(Debug, thiserror::Error)]
pub enum RaggedError {
    #[error("invalid operand {index} ({shape}): {reason}")]
    InvalidOperand {
        index: usize,
        shape: String,
        reason: String,
    },

    #[error(
        "{op} is not implementable (replica_count={replica_count}, partition_count={partition_count}): {source}"
    )]
    NotImplementable {
        op: String,
        replica_count: usize,
        partition_count: usize,
        #[source]
        source: Box<RaggedError>,
    },

    #[error("unsupported data type: {dtype:?} for operation {op}")]
    UnsupportedDType { dtype: DataType, op: &'static str },

    #[error("operand {index} has element type {actual}, expected {expected}")]
    OperandTypeMismatch {
        index: usize,
        expected: DataType,
        actual: DataType,
    },

    #[error("operand count mismatch: expected {expected}, got {actual}")]
    OperandCountMismatch { expected: usize, actual: usize },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid ragged index for peer {peer}: {reason}")]
    InvalidRaggedIndex { peer: usize, reason: String },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("invalid replica groups: {0}")]
    ReplicaGroup(String),

    #[error("device {device} has not been initialized")]
    NotInitialized { device: DeviceId },

    #[error("an invocation is already in flight on device {device}")]
    InvocationInFlight { device: DeviceId },

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("failed to allocate {bytes} bytes of host scratch on device {device}: {reason}")]
    Resource {
        device: DeviceId,
        bytes: usize,
        reason: String,
    },

    #[error("failed to complete all work launched on stream {stream}: {reason}")]
    Transfer { stream: String, reason: String },

    #[error("{operation} failed: {reason}")]
    GroupFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation} failed at peer {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("device error: {message}")]
    DeviceError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RaggedError {
    /// Create a `Transfer` error for the given stream.
    pub fn transfer(stream: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Transfer {
            stream: stream.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a `DeviceError` with just a message.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::DeviceError {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `DeviceError` with a message and a source error.
    pub fn device_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DeviceError {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether a later `execute` on the same engine may still succeed.
    ///
    /// Only misconfiguration (validation and lifecycle misuse) is permanent.
    pub fn is_invocation_local(&self) -> bool {
        matches!(
            self,
            Self::Transfer { .. }
                | Self::GroupFailed { .. }
                | Self::CollectiveFailed { .. }
                | Self::InvalidRaggedIndex { .. }
                | Self::InvocationInFlight { .. }
                | Self::DeviceError { .. }
        )
    }
}

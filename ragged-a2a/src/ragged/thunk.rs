use crate::collective::{BufferRegistry, Collectives, CollectiveOpGroupMode, Communicator};
use crate::config::EngineConfig;
use crate::device::{Executor, Stream};
use crate::error::{RaggedError, Result};
use crate::memory::DeviceBufferPair;
use crate::op::{RaggedAllToAllOp, Shape, operand};
use crate::ragged::config::RaggedAllToAllConfig;
use crate::ragged::exchange::{ExchangeContext, run_ragged_all_to_all};
use crate::ragged::scratch::HostScratchCache;
use crate::types::AsyncStreamKind;

/// Arguments of [`RaggedAllToAllThunk::initialize`].
#[derive(Clone, Copy)]
pub struct InitializeParams<'a> {
    pub executor: &'a dyn Executor,
}

/// Arguments of [`RaggedAllToAllThunk::execute`].
#[derive(Clone, Copy)]
pub struct ExecuteParams<'a> {
    /// Payload pair followed by the four metadata tables.
    pub buffers: &'a [DeviceBufferPair],
    pub stream: &'a dyn Stream,
    pub collectives: &'a dyn Collectives,
    pub comm: &'a dyn Communicator,
}

/// Executable ragged all-to-all step.
///
/// Lifecycle: construct once per op, `initialize` once per device context
/// (idempotent, may run concurrently for different devices), then `execute`
/// any number of times. Dropping the thunk releases every host scratch block.
#[derive(Debug)]
pub struct RaggedAllToAllThunk {
    config: RaggedAllToAllConfig,
    engine: EngineConfig,
    is_sync: bool,
    scratch: HostScratchCache,
    registry: BufferRegistry,
}

impl RaggedAllToAllThunk {
    pub fn new(op: &RaggedAllToAllOp, engine: EngineConfig) -> Result<Self> {
        check_operands(op)?;
        let config = RaggedAllToAllConfig::resolve(op)?;
        Ok(Self {
            scratch: HostScratchCache::new(config.num_ragged_rows),
            registry: BufferRegistry::new(),
            is_sync: op.is_sync,
            config,
            engine,
        })
    }

    /// Whether this engine can run `op` on a `replica_count` x
    /// `partition_count` device grid. Pure; allocates nothing.
    pub fn check_implementable(
        op: &RaggedAllToAllOp,
        replica_count: usize,
        partition_count: usize,
    ) -> Result<()> {
        let status = (|| -> Result<()> {
            check_operands(op)?;
            let config = RaggedAllToAllConfig::resolve(op)?;
            let replicas = u32::try_from(replica_count)
                .map_err(|_| RaggedError::ReplicaGroup("replica count too large".into()))?;
            let partitions = u32::try_from(partition_count)
                .map_err(|_| RaggedError::ReplicaGroup("partition count too large".into()))?;
            config.group.validate(replicas, partitions)
        })();

        status.map_err(|source| RaggedError::NotImplementable {
            op: op.name.clone(),
            replica_count,
            partition_count,
            source: Box::new(source),
        })
    }

    /// Group mode the scheduler must use to pick co-participating devices.
    pub fn group_mode(op: &RaggedAllToAllOp) -> Result<CollectiveOpGroupMode> {
        Ok(RaggedAllToAllConfig::resolve(op)?.group.group_mode)
    }

    pub fn config(&self) -> &RaggedAllToAllConfig {
        &self.config
    }

    pub fn async_stream_kind(&self) -> AsyncStreamKind {
        AsyncStreamKind::Collective
    }

    pub fn is_sync(&self) -> bool {
        self.is_sync
    }

    /// Number of device contexts initialized so far.
    pub fn initialized_devices(&self) -> usize {
        self.scratch.len()
    }

    pub fn buffer_registry(&self) -> &BufferRegistry {
        &self.registry
    }

    /// Allocate host scratch for `params.executor`'s device if it has none.
    pub fn initialize(&self, params: &InitializeParams<'_>) -> Result<()> {
        self.scratch.ensure_allocated(params.executor)?;
        Ok(())
    }

    /// Run one exchange on `params.stream`.
    ///
    /// Requires `initialize` to have succeeded for the stream's device. Only
    /// one execution per device may be in flight; a concurrent second call
    /// fails with `InvocationInFlight`.
    ///
    /// # Safety
    /// Every buffer must be valid device memory of its declared size, and the
    /// payload buffers must stay valid until the stream has drained.
    pub unsafe fn execute(&self, params: &ExecuteParams<'_>) -> Result<()> {
        self.check_buffers(params.buffers)?;

        let scratch = self.scratch.get(params.stream.device_id())?;
        let lease = scratch.lease()?;

        let ctx = ExchangeContext {
            collectives: params.collectives,
            comm: params.comm,
            stream: params.stream,
            registry: &self.registry,
            config: &self.engine,
        };
        unsafe {
            run_ragged_all_to_all(&ctx, self.config.row_element_size, params.buffers, &lease)
        }
    }

    fn check_buffers(&self, buffers: &[DeviceBufferPair]) -> Result<()> {
        let group = &self.config.group;
        if buffers.len() != group.operand_count {
            return Err(RaggedError::OperandCountMismatch {
                expected: group.operand_count,
                actual: buffers.len(),
            });
        }
        for (index, (buf, &expected)) in buffers
            .iter()
            .zip(&group.operand_element_types)
            .enumerate()
        {
            if buf.element_type != expected {
                return Err(RaggedError::OperandTypeMismatch {
                    index,
                    expected,
                    actual: buf.element_type,
                });
            }
        }
        Ok(())
    }
}

fn invalid(index: usize, shape: &Shape, reason: &str) -> RaggedError {
    RaggedError::InvalidOperand {
        index,
        shape: shape.to_string(),
        reason: reason.into(),
    }
}

/// Operand legality: arrays of backend-supported types, with integer index
/// tables whose leading dimensions agree.
fn check_operands(op: &RaggedAllToAllOp) -> Result<()> {
    for (index, shape) in op.operands.iter().enumerate() {
        if !shape.element_type.is_array() {
            return Err(invalid(index, shape, "operand must be an array"));
        }
        if shape.element_type.to_data_type().is_none() {
            return Err(invalid(
                index,
                shape,
                "element type not supported by collectives",
            ));
        }
    }

    let Some(first) = op.operand(operand::INPUT_OFFSETS) else {
        return Ok(());
    };
    for index in operand::METADATA {
        let Some(shape) = op.operand(index) else {
            continue;
        };
        let is_index = shape
            .element_type
            .to_data_type()
            .is_some_and(|dt| dt.is_index_type());
        if !is_index {
            return Err(invalid(
                index,
                shape,
                "offset/size tables must be 32- or 64-bit integers",
            ));
        }
        if shape.leading_dim() != first.leading_dim() {
            return Err(invalid(
                index,
                shape,
                "offset/size tables must have the same number of rows",
            ));
        }
    }
    Ok(())
}

use crate::collective::{CollectiveOpGroupMode, GroupConfig};
use crate::error::{RaggedError, Result};
use crate::op::{RaggedAllToAllOp, Shape, operand};
use crate::types::DataType;

/// Number of device buffers a ragged all-to-all consumes per invocation:
/// the payload pair plus four metadata tables.
pub const RAGGED_BUFFER_COUNT: usize = 5;

/// Static parameters of a ragged all-to-all, resolved once from the op's
/// declared shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaggedAllToAllConfig {
    pub group: GroupConfig,
    /// Entries in each offset/size table.
    pub num_ragged_rows: usize,
    /// Scalar elements per row of the payload.
    pub row_element_size: usize,
}

impl RaggedAllToAllConfig {
    pub fn resolve(op: &RaggedAllToAllOp) -> Result<Self> {
        if op.operands.len() != operand::COUNT {
            return Err(RaggedError::OperandCountMismatch {
                expected: operand::COUNT,
                actual: op.operands.len(),
            });
        }

        let index_shape = &op.operands[operand::INPUT_OFFSETS];
        let num_ragged_rows = leading_dim(operand::INPUT_OFFSETS, index_shape)?;
        leading_dim(operand::OUTPUT, &op.shape)?;
        let row_element_size = row_size(&op.shape);

        let input = &op.operands[operand::INPUT];
        leading_dim(operand::INPUT, input)?;
        if row_size(input) != row_element_size {
            return Err(invalid(
                operand::INPUT,
                input,
                format!(
                    "row size {} does not match result row size {row_element_size}",
                    row_size(input)
                ),
            ));
        }

        let mut operand_element_types = Vec::with_capacity(RAGGED_BUFFER_COUNT);
        operand_element_types.push(data_type(operand::INPUT, input)?);
        for index in operand::METADATA {
            operand_element_types.push(data_type(index, &op.operands[index])?);
        }

        let group_mode =
            CollectiveOpGroupMode::from_attributes(op.channel_id.is_some(), op.use_global_device_ids)?;

        Ok(Self {
            group: GroupConfig {
                operand_count: RAGGED_BUFFER_COUNT,
                operand_element_types,
                replica_groups: op.replica_groups.clone(),
                group_mode,
            },
            num_ragged_rows,
            row_element_size,
        })
    }

    /// Host scratch needed per device: four tables at worst-case 8-byte width.
    pub fn scratch_size_in_bytes(&self) -> usize {
        4 * self.num_ragged_rows * std::mem::size_of::<i64>()
    }
}

fn invalid(index: usize, shape: &Shape, reason: impl Into<String>) -> RaggedError {
    RaggedError::InvalidOperand {
        index,
        shape: shape.to_string(),
        reason: reason.into(),
    }
}

fn leading_dim(index: usize, shape: &Shape) -> Result<usize> {
    shape
        .leading_dim()
        .ok_or_else(|| invalid(index, shape, "expected at least one dimension"))
}

/// Elements per leading-dimension row. Equal to `elements / dims[0]` whenever
/// `dims[0] > 0`, and still defined for empty shapes.
fn row_size(shape: &Shape) -> usize {
    shape.dims.iter().skip(1).product()
}

fn data_type(index: usize, shape: &Shape) -> Result<DataType> {
    shape
        .element_type
        .to_data_type()
        .ok_or_else(|| invalid(index, shape, "element type not supported by collectives"))
}

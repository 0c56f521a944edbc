//! Declarative description of a ragged all-to-all operation, as produced by
//! the compiler before any engine is instantiated.

mod shape;

pub use shape::{PrimitiveType, Shape};

use crate::collective::ReplicaGroup;

/// Operand positions of a ragged all-to-all.
pub mod operand {
    pub const INPUT: usize = 0;
    pub const OUTPUT: usize = 1;
    pub const INPUT_OFFSETS: usize = 2;
    pub const SEND_SIZES: usize = 3;
    pub const OUTPUT_OFFSETS: usize = 4;
    pub const RECV_SIZES: usize = 5;
    pub const COUNT: usize = 6;

    /// The four offset/size tables, in load order.
    pub const METADATA: [usize; 4] = [INPUT_OFFSETS, SEND_SIZES, OUTPUT_OFFSETS, RECV_SIZES];
}

/// A ragged all-to-all: `input` rows are scattered to peers according to
/// runtime offset/size tables and gathered into `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaggedAllToAllOp {
    pub name: String,
    /// `[input, output, input_offsets, send_sizes, output_offsets, recv_sizes]`.
    pub operands: Vec<Shape>,
    /// Result shape; equal to the output operand's shape.
    pub shape: Shape,
    pub replica_groups: Vec<ReplicaGroup>,
    pub channel_id: Option<u64>,
    pub use_global_device_ids: Option<bool>,
    /// Whether the scheduler runs this op synchronously with compute.
    pub is_sync: bool,
}

impl RaggedAllToAllOp {
    /// Build an op whose four metadata tables share `index_shape`.
    pub fn new(name: impl Into<String>, input: Shape, output: Shape, index_shape: Shape) -> Self {
        let shape = output.clone();
        Self {
            name: name.into(),
            operands: vec![
                input,
                output,
                index_shape.clone(),
                index_shape.clone(),
                index_shape.clone(),
                index_shape,
            ],
            shape,
            replica_groups: Vec::new(),
            channel_id: None,
            use_global_device_ids: None,
            is_sync: false,
        }
    }

    pub fn with_replica_groups(mut self, groups: Vec<ReplicaGroup>) -> Self {
        self.replica_groups = groups;
        self
    }

    pub fn with_channel_id(mut self, channel_id: u64) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_use_global_device_ids(mut self, value: bool) -> Self {
        self.use_global_device_ids = Some(value);
        self
    }

    pub fn with_sync(mut self, is_sync: bool) -> Self {
        self.is_sync = is_sync;
        self
    }

    pub fn operand(&self, index: usize) -> Option<&Shape> {
        self.operands.get(index)
    }
}

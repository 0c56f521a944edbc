use std::collections::HashSet;

use crate::error::{RaggedError, Result};
use crate::types::DataType;

/// How replica groups are interpreted when picking participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectiveOpGroupMode {
    /// Groups list replica ids; participants share the caller's partition.
    CrossReplica,
    /// Groups list partition ids; participants share the caller's replica.
    CrossPartition,
    /// Groups list replica ids; every partition of those replicas participates.
    CrossReplicaAndPartition,
    /// Groups list flattened `replica * partition_count + partition` ids.
    FlattenedId,
}

impl CollectiveOpGroupMode {
    /// Derive the mode from the op's `channel_id` / `use_global_device_ids`
    /// attributes.
    pub fn from_attributes(
        has_channel_id: bool,
        use_global_device_ids: Option<bool>,
    ) -> Result<Self> {
        match (has_channel_id, use_global_device_ids) {
            (false, None) | (false, Some(false)) => Ok(Self::CrossReplica),
            (false, Some(true)) => Err(RaggedError::ReplicaGroup(
                "use_global_device_ids requires a channel_id".into(),
            )),
            (true, None) => Ok(Self::CrossPartition),
            (true, Some(false)) => Ok(Self::CrossReplicaAndPartition),
            (true, Some(true)) => Ok(Self::FlattenedId),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::CrossReplica => "cross_replica",
            Self::CrossPartition => "cross_partition",
            Self::CrossReplicaAndPartition => "cross_replica_and_partition",
            Self::FlattenedId => "flattened_id",
        }
    }
}

impl std::fmt::Display for CollectiveOpGroupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One group of ids that communicate with each other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicaGroup {
    pub ids: Vec<u32>,
}

impl ReplicaGroup {
    pub fn new(ids: impl Into<Vec<u32>>) -> Self {
        Self { ids: ids.into() }
    }
}

/// A device's position in the replica x partition grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId {
    pub replica: u32,
    pub partition: u32,
}

impl LogicalId {
    pub const fn new(replica: u32, partition: u32) -> Self {
        Self { replica, partition }
    }
}

/// Static collective parameters shared by every invocation of an op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub operand_count: usize,
    pub operand_element_types: Vec<DataType>,
    pub replica_groups: Vec<ReplicaGroup>,
    pub group_mode: CollectiveOpGroupMode,
}

impl GroupConfig {
    /// Size of the id space the replica groups index into.
    fn id_space(&self, replica_count: u32, partition_count: u32) -> Result<u32> {
        match self.group_mode {
            CollectiveOpGroupMode::CrossReplica
            | CollectiveOpGroupMode::CrossReplicaAndPartition => Ok(replica_count),
            CollectiveOpGroupMode::CrossPartition => Ok(partition_count),
            CollectiveOpGroupMode::FlattenedId => replica_count
                .checked_mul(partition_count)
                .ok_or_else(|| {
                    RaggedError::ReplicaGroup(format!(
                        "{replica_count}x{partition_count} devices overflow the flattened id space"
                    ))
                }),
        }
    }

    /// Check every id is in range and appears in at most one group.
    pub fn validate(&self, replica_count: u32, partition_count: u32) -> Result<()> {
        if self.group_mode == CollectiveOpGroupMode::FlattenedId && self.replica_groups.is_empty()
        {
            return Err(RaggedError::ReplicaGroup(
                "flattened_id mode requires explicit replica groups".into(),
            ));
        }
        let space = self.id_space(replica_count, partition_count)?;
        let mut seen = HashSet::new();
        for group in &self.replica_groups {
            if group.ids.is_empty() {
                return Err(RaggedError::ReplicaGroup("empty replica group".into()));
            }
            for &id in &group.ids {
                if id >= space {
                    return Err(RaggedError::ReplicaGroup(format!(
                        "id {id} out of range for {} mode with {space} ids",
                        self.group_mode
                    )));
                }
                if !seen.insert(id) {
                    return Err(RaggedError::ReplicaGroup(format!(
                        "id {id} appears in more than one group"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Group (as ids in the mode's id space) that contains `id`.
    fn group_of(&self, id: u32, space: u32) -> Result<Vec<u32>> {
        if self.replica_groups.is_empty() {
            return Ok((0..space).collect());
        }
        self.replica_groups
            .iter()
            .find(|g| g.ids.contains(&id))
            .map(|g| g.ids.clone())
            .ok_or_else(|| RaggedError::ReplicaGroup(format!("id {id} is not in any group")))
    }

    /// Logical devices that participate together with `me`, in group order.
    pub fn participants(
        &self,
        me: LogicalId,
        replica_count: u32,
        partition_count: u32,
    ) -> Result<Vec<LogicalId>> {
        self.validate(replica_count, partition_count)?;
        if me.replica >= replica_count || me.partition >= partition_count {
            return Err(RaggedError::ReplicaGroup(format!(
                "device {me:?} outside {replica_count}x{partition_count} grid"
            )));
        }
        let space = self.id_space(replica_count, partition_count)?;

        let devices = match self.group_mode {
            CollectiveOpGroupMode::CrossReplica => self
                .group_of(me.replica, space)?
                .into_iter()
                .map(|r| LogicalId::new(r, me.partition))
                .collect(),
            CollectiveOpGroupMode::CrossPartition => self
                .group_of(me.partition, space)?
                .into_iter()
                .map(|p| LogicalId::new(me.replica, p))
                .collect(),
            CollectiveOpGroupMode::CrossReplicaAndPartition => {
                let replicas = self.group_of(me.replica, space)?;
                let mut out = Vec::with_capacity(replicas.len() * partition_count as usize);
                for r in replicas {
                    for p in 0..partition_count {
                        out.push(LogicalId::new(r, p));
                    }
                }
                out
            }
            CollectiveOpGroupMode::FlattenedId => {
                // `me` is inside the grid and the grid fits in `space`.
                let flat = me.replica * partition_count + me.partition;
                self.group_of(flat, space)?
                    .into_iter()
                    .map(|id| LogicalId::new(id / partition_count, id % partition_count))
                    .collect()
            }
        };
        Ok(devices)
    }
}

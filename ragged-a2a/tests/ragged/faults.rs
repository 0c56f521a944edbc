use ragged_a2a::{
    DataType, DeviceMemory, EngineConfig, HostWorld, PrimitiveType, RaggedAllToAllThunk,
    RaggedError, Stream,
};

use super::helpers::{IndexTable, Scenario, execute_one, initialize_all};

fn single_rank() -> (Scenario, HostWorld, RaggedAllToAllThunk) {
    let scenario = Scenario::new(vec![vec![3]], 2, PrimitiveType::S64);
    let world = HostWorld::new(1, EngineConfig::default()).unwrap();
    let thunk = scenario.thunk(EngineConfig::default());
    initialize_all(&world, &thunk);
    (scenario, world, thunk)
}

fn assert_recovers(scenario: &Scenario, world: &HostWorld, thunk: &RaggedAllToAllThunk) {
    let mut ranks = scenario.rank_buffers();
    execute_one(world.participant(0), thunk, &mut ranks[0]).unwrap();
    assert_eq!(ranks[0].output, scenario.expected_output(0));
}

#[test]
fn test_stream_failure_names_the_stream() {
    let (scenario, world, thunk) = single_rank();
    let p = world.participant(0);
    p.stream().fail_next_sync();

    let mut ranks = scenario.rank_buffers();
    let err = execute_one(p, &thunk, &mut ranks[0]).unwrap_err();
    assert!(matches!(err, RaggedError::Transfer { .. }));
    let msg = err.to_string();
    assert!(msg.contains(&p.stream().label()), "{msg}");
    assert!(msg.starts_with("failed to complete all work launched on stream"));

    // The metadata wait failed before any group was opened.
    assert!(p.backend().issued_ops().is_empty());
    assert_eq!(p.backend().group_depth(), 0);
    assert_recovers(&scenario, &world, &thunk);
}

#[test]
fn test_group_end_failure_is_reported_and_recoverable() {
    let (scenario, world, thunk) = single_rank();
    let backend = world.participant(0).backend();
    backend.fail_next_group_end();

    let mut ranks = scenario.rank_buffers();
    let err = execute_one(world.participant(0), &thunk, &mut ranks[0]).unwrap_err();
    assert!(matches!(err, RaggedError::GroupFailed { operation: "group_end", .. }));
    assert!(err.is_invocation_local());
    assert_eq!(backend.group_depth(), 0);
    assert_recovers(&scenario, &world, &thunk);
}

#[test]
fn test_send_failure_closes_the_group() {
    let (scenario, world, thunk) = single_rank();
    let backend = world.participant(0).backend();
    backend.fail_next_send();

    let mut ranks = scenario.rank_buffers();
    let err = execute_one(world.participant(0), &thunk, &mut ranks[0]).unwrap_err();
    assert!(matches!(err, RaggedError::CollectiveFailed { operation: "send", .. }));
    assert_eq!(backend.group_depth(), 0);
    assert_eq!(backend.groups_aborted(), 1);
    assert_eq!(backend.groups_completed(), 0);
    assert_recovers(&scenario, &world, &thunk);
}

#[test]
fn test_group_start_failure() {
    let (scenario, world, thunk) = single_rank();
    let backend = world.participant(0).backend();
    backend.fail_next_group_start();

    let mut ranks = scenario.rank_buffers();
    let err = execute_one(world.participant(0), &thunk, &mut ranks[0]).unwrap_err();
    assert!(matches!(err, RaggedError::GroupFailed { operation: "group_start", .. }));
    assert!(backend.issued_ops().is_empty());
    assert_recovers(&scenario, &world, &thunk);
}

#[test]
fn test_out_of_range_sizes_rejected_before_any_transfer() {
    let (scenario, world, thunk) = single_rank();
    let mut ranks = scenario.rank_buffers();
    ranks[0].send_sizes = IndexTable::new(DataType::I64, &[4]);

    let err = execute_one(world.participant(0), &thunk, &mut ranks[0]).unwrap_err();
    assert!(matches!(err, RaggedError::InvalidRaggedIndex { peer: 0, .. }), "{err}");
    let backend = world.participant(0).backend();
    assert!(backend.issued_ops().is_empty());
    assert_eq!(backend.group_depth(), 0);
    assert_recovers(&scenario, &world, &thunk);
}

#[test]
fn test_negative_offset_rejected() {
    let (scenario, world, thunk) = single_rank();
    let mut ranks = scenario.rank_buffers();
    ranks[0].output_offsets = IndexTable::new(DataType::I64, &[-1]);

    let err = execute_one(world.participant(0), &thunk, &mut ranks[0]).unwrap_err();
    assert!(err.to_string().contains("negative"), "{err}");
}

#[test]
fn test_wrong_buffer_count_and_type() {
    let (scenario, world, thunk) = single_rank();
    let p = world.participant(0);
    let backend = p.backend();
    let mut ranks = scenario.rank_buffers();
    let mut buffers = ranks[0].device_buffers();

    buffers.pop();
    let err = unsafe {
        thunk.execute(&ragged_a2a::ExecuteParams {
            buffers: &buffers,
            stream: p.stream(),
            collectives: &*backend,
            comm: &*backend,
        })
    }
    .unwrap_err();
    assert!(matches!(
        err,
        RaggedError::OperandCountMismatch {
            expected: 5,
            actual: 4
        }
    ));

    let mut buffers = ranks[0].device_buffers();
    buffers[2] = IndexTable::new(DataType::I32, &[3]).pair();
    let err = unsafe {
        thunk.execute(&ragged_a2a::ExecuteParams {
            buffers: &buffers,
            stream: p.stream(),
            collectives: &*backend,
            comm: &*backend,
        })
    }
    .unwrap_err();
    assert!(matches!(
        err,
        RaggedError::OperandTypeMismatch {
            index: 2,
            expected: DataType::I64,
            actual: DataType::I32,
        }
    ));
    assert_eq!(
        err.to_string(),
        "operand 2 has element type i32, expected i64"
    );
}

#[test]
fn test_metadata_copy_waits_for_stream() {
    let world = HostWorld::new(1, EngineConfig::default()).unwrap();
    let stream = world.participant(0).stream();
    let table = IndexTable::new(DataType::I32, &[11, 12]);
    let mut host = [0u8; 8];
    unsafe {
        stream
            .memcpy_d2h(
                ragged_a2a::HostMemory::new(host.as_mut_ptr() as u64, 8),
                DeviceMemory::new(table.bytes.as_ptr() as u64, 8),
            )
            .unwrap();
    }
    assert_eq!(host, [0u8; 8]);
    stream.block_host_until_done().unwrap();
    assert_eq!(&host[..], &table.bytes[..]);
}

#[test]
fn test_registration_happens_before_rank_query() {
    let (scenario, world, thunk) = single_rank();
    let backend = world.participant(0).backend();
    backend.set_requires_registration(true);
    backend.fail_next_num_ranks();

    let mut ranks = scenario.rank_buffers();
    let err = execute_one(world.participant(0), &thunk, &mut ranks[0]).unwrap_err();
    assert!(err.to_string().contains("communicator size"), "{err}");
    assert_eq!(backend.registered_buffers().len(), 2);
    assert!(backend.issued_ops().is_empty());
    assert_recovers(&scenario, &world, &thunk);
    assert_eq!(backend.registered_buffers().len(), 2);
}

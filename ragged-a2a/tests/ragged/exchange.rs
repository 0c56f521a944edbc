use ragged_a2a::host::HostOpKind;
use ragged_a2a::{DataType, EngineConfig, HostWorld, PrimitiveType, RaggedError};

use super::helpers::{IndexTable, Scenario, UNTOUCHED, execute_all, initialize_all};

fn run(scenario: &Scenario, config: EngineConfig) {
    let world = HostWorld::new(scenario.world_size(), config.clone()).unwrap();
    let thunk = scenario.thunk(config);
    initialize_all(&world, &thunk);

    let mut ranks = scenario.rank_buffers();
    for (rank, result) in execute_all(&world, &thunk, &mut ranks).into_iter().enumerate() {
        result.unwrap_or_else(|e| panic!("rank {rank}: {e}"));
    }
    for (q, bufs) in ranks.iter().enumerate() {
        assert_eq!(bufs.output, scenario.expected_output(q), "output of rank {q}");
    }
}

#[test]
fn test_uneven_four_rank_exchange() {
    let scenario = Scenario::new(
        vec![
            vec![1, 2, 0, 3],
            vec![0, 0, 4, 1],
            vec![2, 2, 2, 2],
            vec![5, 0, 1, 0],
        ],
        3,
        PrimitiveType::S64,
    );
    run(&scenario, EngineConfig::default());
}

#[test]
fn test_single_rank_copies_selected_rows() {
    let scenario = Scenario::new(vec![vec![4]], 2, PrimitiveType::S32);
    run(&scenario, EngineConfig::default());
}

#[test]
fn test_every_index_width_moves_the_same_data() {
    let counts = vec![vec![2, 1, 0], vec![1, 1, 3], vec![0, 2, 1]];
    for index_type in [
        PrimitiveType::S32,
        PrimitiveType::U32,
        PrimitiveType::S64,
        PrimitiveType::U64,
    ] {
        run(&Scenario::new(counts.clone(), 4, index_type), EngineConfig::default());
    }
}

#[test]
fn test_all_zero_sizes_leave_output_untouched() {
    let scenario = Scenario::new(vec![vec![0, 0], vec![0, 0]], 2, PrimitiveType::S32);
    let world = HostWorld::new(2, EngineConfig::default()).unwrap();
    // Capacity is zero rows, so give each rank a little room to observe.
    let op = ragged_a2a::RaggedAllToAllOp::new(
        "ragged-all-to-all",
        ragged_a2a::Shape::array(PrimitiveType::F32, [2, 2]),
        ragged_a2a::Shape::array(PrimitiveType::F32, [2, 2]),
        ragged_a2a::Shape::array(PrimitiveType::S32, [2]),
    );
    let thunk = ragged_a2a::RaggedAllToAllThunk::new(&op, EngineConfig::default()).unwrap();
    initialize_all(&world, &thunk);

    let mut ranks = scenario.rank_buffers();
    for bufs in &mut ranks {
        bufs.input = vec![7.0; 4];
        bufs.output = vec![UNTOUCHED; 4];
    }
    for result in execute_all(&world, &thunk, &mut ranks) {
        result.unwrap();
    }
    for bufs in &ranks {
        assert_eq!(bufs.output, vec![UNTOUCHED; 4]);
    }
}

#[test]
fn test_repeated_execution_reuses_scratch() {
    let config = EngineConfig::default();
    let first = Scenario::new(vec![vec![1, 2], vec![3, 0]], 2, PrimitiveType::S64);
    let world = HostWorld::new(2, config.clone()).unwrap();
    let thunk = first.thunk(config);
    initialize_all(&world, &thunk);

    // Same shapes, different runtime sizes on each pass.
    let passes = [
        vec![vec![1, 2], vec![3, 0]],
        vec![vec![2, 1], vec![2, 1]],
        vec![vec![1, 3], vec![1, 1]],
    ];
    for counts in passes {
        let scenario = Scenario::new(counts, 2, PrimitiveType::S64);
        assert_eq!(scenario.capacity_rows(), first.capacity_rows());
        let mut ranks = scenario.rank_buffers();
        for result in execute_all(&world, &thunk, &mut ranks) {
            result.unwrap();
        }
        for (q, bufs) in ranks.iter().enumerate() {
            assert_eq!(bufs.output, scenario.expected_output(q));
        }
    }

    for p in world.participants() {
        assert_eq!(p.executor().allocation_count(), 1);
        assert_eq!(p.backend().groups_completed(), 3);
    }
    assert_eq!(thunk.initialized_devices(), 2);
}

#[test]
fn test_transfers_issued_peer_ascending_inside_one_group() {
    let scenario = Scenario::new(
        vec![vec![1, 1, 1], vec![1, 1, 1], vec![1, 1, 1]],
        5,
        PrimitiveType::S32,
    );
    let world = HostWorld::new(3, EngineConfig::default()).unwrap();
    let thunk = scenario.thunk(EngineConfig::default());
    initialize_all(&world, &thunk);
    let mut ranks = scenario.rank_buffers();
    for result in execute_all(&world, &thunk, &mut ranks) {
        result.unwrap();
    }

    for p in world.participants() {
        let ops = p.backend().issued_ops();
        let shape: Vec<_> = ops.iter().map(|op| (op.kind, op.peer)).collect();
        assert_eq!(
            shape,
            vec![
                (HostOpKind::Send, 0),
                (HostOpKind::Recv, 0),
                (HostOpKind::Send, 1),
                (HostOpKind::Recv, 1),
                (HostOpKind::Send, 2),
                (HostOpKind::Recv, 2),
            ]
        );
        assert!(ops.iter().all(|op| op.bytes == 5 * 4));
        assert_eq!(p.backend().groups_completed(), 1);
        assert_eq!(p.backend().group_depth(), 0);
    }
}

#[test]
fn test_payload_buffers_registered_once() {
    let scenario = Scenario::new(vec![vec![1, 1], vec![1, 1]], 2, PrimitiveType::S32);
    let world = HostWorld::new(2, EngineConfig::default()).unwrap();
    for p in world.participants() {
        p.backend().set_requires_registration(true);
    }
    let thunk = scenario.thunk(EngineConfig::default());
    initialize_all(&world, &thunk);

    let mut ranks = scenario.rank_buffers();
    for _ in 0..2 {
        for result in execute_all(&world, &thunk, &mut ranks) {
            result.unwrap();
        }
    }

    for p in world.participants() {
        // Input and output of this rank, registered on the first pass only.
        assert_eq!(p.backend().registered_buffers().len(), 2);
    }
    assert_eq!(thunk.buffer_registry().len(), 4);
}

#[test]
fn test_registration_disabled_by_config() {
    let config = EngineConfig {
        register_buffers: false,
        ..EngineConfig::default()
    };
    let scenario = Scenario::new(vec![vec![2]], 1, PrimitiveType::S32);
    let world = HostWorld::new(1, config.clone()).unwrap();
    world.participant(0).backend().set_requires_registration(true);
    let thunk = scenario.thunk(config);
    initialize_all(&world, &thunk);

    let mut ranks = scenario.rank_buffers();
    execute_all(&world, &thunk, &mut ranks)[0].as_ref().unwrap();
    assert!(world.participant(0).backend().registered_buffers().is_empty());
    assert!(thunk.buffer_registry().is_empty());
}

#[test]
fn test_size_disagreement_fails_the_group() {
    let scenario = Scenario::new(vec![vec![1, 1], vec![1, 1]], 2, PrimitiveType::S32);
    let world = HostWorld::new(2, EngineConfig::default()).unwrap();
    let thunk = scenario.thunk(EngineConfig::default());
    initialize_all(&world, &thunk);

    let mut ranks = scenario.rank_buffers();
    // Rank 1 expects two rows from rank 0, which only sends one.
    ranks[1].recv_sizes = IndexTable::new(DataType::I32, &[2, 1]);
    ranks[1].output_offsets = IndexTable::new(DataType::I32, &[0, 0]);

    let results = execute_all(&world, &thunk, &mut ranks);
    results[0].as_ref().unwrap();
    let err = results[1].as_ref().unwrap_err();
    assert!(matches!(err, RaggedError::GroupFailed { operation: "group_end", .. }), "{err}");
    assert!(err.to_string().contains("expected 16 bytes, got 8"), "{err}");
    assert_eq!(ranks[1].output, vec![UNTOUCHED; 4]);
    assert_eq!(ranks[0].output, scenario.expected_output(0));
}

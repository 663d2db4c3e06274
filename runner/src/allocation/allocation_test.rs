use super::{allocate, AllocationError, HostAllocation, HostSlot, ACCELERATOR_SLOTS};

#[test]
pub fn allocate_seven() {
    assert_eq!(allocate(7).unwrap().pairs(), vec![(1, 0), (2, 5), (3, 2)]);
}

#[test]
pub fn allocate_exactly_one_group() {
    // 10 is not > 10, so the tail handles it
    assert_eq!(allocate(10).unwrap().pairs(), vec![(1, 0), (2, 5), (3, 5)]);
}

#[test]
pub fn allocate_twenty_three() {
    assert_eq!(
        allocate(23).unwrap().pairs(),
        vec![
            (1, 0),
            (2, 5),
            (3, 5),
            (4, 0),
            (5, 5),
            (6, 5),
            (7, 0),
            (8, 3),
            (9, 0)
        ]
    );
}

#[test]
pub fn allocate_small_tail_leaves_last_node_empty() {
    assert_eq!(allocate(1).unwrap().pairs(), vec![(1, 0), (2, 1), (3, 0)]);
    assert_eq!(allocate(5).unwrap().pairs(), vec![(1, 0), (2, 5), (3, 0)]);
    assert_eq!(allocate(6).unwrap().pairs(), vec![(1, 0), (2, 5), (3, 1)]);
}

#[test]
pub fn allocate_twenty_keeps_remainder_in_tail() {
    // 20 -> one loop iteration, then a tail of exactly 10
    assert_eq!(
        allocate(20).unwrap().pairs(),
        vec![(1, 0), (2, 5), (3, 5), (4, 0), (5, 5), (6, 5)]
    );
}

#[test]
pub fn allocate_up_to_ten_uses_three_nodes() {
    for pc in 1..=10 {
        let allocation = allocate(pc).unwrap();

        assert_eq!(allocation.len(), 3, "pc = {pc}");
        assert_eq!(allocation.total_slots(), pc, "pc = {pc}");
    }
}

#[test]
pub fn allocate_preserves_rank_count_and_node_order() {
    for pc in 1..=250 {
        let allocation = allocate(pc).unwrap();
        let entries = allocation.entries();

        assert_eq!(allocation.total_slots(), pc, "pc = {pc}");
        assert_eq!(entries[0].node, 1);
        assert_eq!(entries.len() as u32, 3 * ((pc - 1) / 10 + 1), "pc = {pc}");
        assert!(entries.windows(2).all(|pair| pair[1].node == pair[0].node + 1));
        assert!(entries.iter().all(|entry| entry.slots <= ACCELERATOR_SLOTS));
        // head nodes never receive ranks
        assert!(entries.iter().step_by(3).all(|entry| entry.slots == 0));
    }
}

#[test]
pub fn allocate_is_deterministic() {
    assert_eq!(allocate(37).unwrap(), allocate(37).unwrap());
}

#[test]
pub fn allocate_rejects_zero() {
    assert!(matches!(
        allocate(0),
        Err(AllocationError::InvalidArgument(0))
    ));
}

#[test]
pub fn host_file_format() {
    assert_eq!(
        allocate(13).unwrap().to_string(),
        "node1:0\nnode2:5\nnode3:5\nnode4:0\nnode5:3\nnode6:0\n"
    );
}

#[test]
pub fn host_file_parses_back() {
    let allocation = allocate(42).unwrap();
    let parsed: HostAllocation = allocation.to_string().parse().unwrap();

    assert_eq!(parsed, allocation);
}

#[test]
pub fn host_file_rejects_garbage() {
    match "node1:0\nnode2:five\n".parse::<HostAllocation>() {
        Err(AllocationError::Parse { line, content }) => {
            assert_eq!(line, 2);
            assert_eq!(content, "node2:five");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
pub fn host_file_skips_blank_lines() {
    let parsed: HostAllocation = "node1:0\n\nnode2:4\n".parse().unwrap();

    assert_eq!(
        parsed.entries(),
        &[HostSlot::new(1, 0), HostSlot::new(2, 4)]
    );
}

#[test]
pub fn host_file_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(super::HOSTS_FILE_NAME);
    let allocation = allocate(8).unwrap();

    allocation.write_to(&path).unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "node1:0\nnode2:5\nnode3:3\n"
    );
    assert_eq!(HostAllocation::read_from(&path).unwrap(), allocation);
}

use super::*;
use proptest::prelude::*;

fn raid5(width: usize, element: u64) -> Geometry {
    Geometry::new(RaidType::Raid5, width, element, 1).expect("valid geometry")
}

fn raid6(width: usize, element: u64) -> Geometry {
    Geometry::new(RaidType::Raid6, width, element, 1).expect("valid geometry")
}

#[test]
fn new_rejects_unsupported_widths_and_zero_sizes() {
    assert!(Geometry::new(RaidType::Raid5, 2, 8, 1).is_err());
    assert!(Geometry::new(RaidType::Raid6, 3, 8, 1).is_err());
    assert!(Geometry::new(RaidType::Raid5, MAX_WIDTH + 1, 8, 1).is_err());
    assert!(Geometry::new(RaidType::Raid5, 5, 0, 1).is_err());
    assert!(Geometry::new(RaidType::Raid5, 5, 8, 0).is_err());
    assert!(Geometry::new(RaidType::Raid6, 4, 8, 1).is_ok());
}

#[test]
fn parity_rotates_backwards_from_last_member() {
    let g = raid5(5, 8);
    let placements: Vec<usize> = (0..6).map(|ps| g.parity_position(ps)).collect();
    assert_eq!(placements, vec![4, 3, 2, 1, 0, 4]);
}

#[test]
fn data_positions_follow_parity() {
    let g = raid5(5, 8);
    let phys: Vec<usize> = (0..4)
        .map(|d| g.physical_position(d, 3).expect("data position"))
        .collect();
    assert_eq!(phys, vec![4, 0, 1, 2]);
}

#[test]
fn parity_member_has_no_data_position() {
    assert!(position_to_stripe_relative(3, 3, 5, 1).is_err());
    assert!(position_to_stripe_relative(4, 3, 5, 2).is_err());
    assert_eq!(position_to_stripe_relative(0, 3, 5, 2).expect("data"), 0);
}

#[test]
fn malformed_shapes_are_rejected() {
    assert!(position_to_stripe_relative(0, 0, 2, 2).is_err());
    assert!(position_to_stripe_relative(0, 1, 5, 3).is_err());
    assert!(position_to_stripe_relative(5, 1, 5, 1).is_err());
    assert!(stripe_relative_to_position(4, 0, 5, 1).is_err());
}

#[test]
fn extent_order_puts_parity_last() {
    let g = raid6(6, 4);
    assert_eq!(g.extent_position(5, 5), 4);
    assert_eq!(g.extent_position(0, 5), 5);
    assert_eq!(g.extent_position(1, 5), 0);
    for extent in 0..6 {
        let phys = g.extent_to_physical(extent, 5);
        assert_eq!(g.extent_position(phys, 5), extent);
    }
}

#[test]
fn resolve_dead_positions_skips_parity_members() {
    let g = raid6(6, 4);

    let dead = g.resolve_dead_positions([Some(5), Some(2)], 5).expect("resolve");
    assert_eq!(dead.first, Some(1));
    assert_eq!(dead.second, None);

    let dead = g.resolve_dead_positions([Some(0), None], 5).expect("resolve");
    assert!(dead.is_empty());

    let dead = g.resolve_dead_positions([None, Some(3)], 5).expect("resolve");
    assert_eq!(dead.first, Some(2));

    let dead = g.resolve_dead_positions([Some(4), Some(1)], 5).expect("resolve");
    assert_eq!(dead.iter().collect::<Vec<_>>(), vec![3, 0]);
}

#[test]
fn resolve_dead_positions_rejects_bad_combinations() {
    let g5 = raid5(5, 8);
    assert!(g5.resolve_dead_positions([Some(0), Some(1)], 4).is_err());
    assert!(g5.resolve_dead_positions([Some(7), None], 4).is_err());

    let g6 = raid6(6, 4);
    assert!(g6.resolve_dead_positions([Some(2), Some(2)], 5).is_err());
}

#[test]
fn map_host_range_inside_one_element() {
    let g = raid5(5, 8);
    let sg = g.map_host_range(2, 3).expect("map");
    assert_eq!(sg.parity_stripe, 0);
    assert_eq!(sg.parity_pos, 4);
    assert_eq!(sg.start_index, 0);
    assert_eq!(sg.blocks_remaining_in_data, 6);
    assert_eq!(sg.parity_start, 2);
    assert_eq!(sg.parity_count, 3);
}

#[test]
fn map_host_range_takes_hull_of_touched_rows() {
    let g = raid5(5, 4);
    let sg = g.map_host_range(6, 8).expect("map");
    assert_eq!(sg.start_index, 1);
    assert_eq!(sg.blocks_remaining_in_data, 2);
    assert_eq!(sg.parity_start, 0);
    assert_eq!(sg.parity_count, 4);
}

#[test]
fn map_host_range_second_parity_stripe() {
    let g = Geometry::new(RaidType::Raid5, 3, 2, 2).expect("geometry");
    // 2 data disks * 2 blocks * 2 element rows = 8 host blocks per parity stripe.
    let sg = g.map_host_range(9, 4).expect("map");
    assert_eq!(sg.parity_stripe, 1);
    assert_eq!(sg.parity_pos, 1);
    assert_eq!(sg.logical_parity_start, 4);
    assert_eq!(sg.parity_start, 4);
    assert_eq!(sg.parity_count, 3);
    assert_eq!(sg.parity_start_offset(), 0);
}

#[test]
fn map_host_range_rejects_empty_and_crossing_requests() {
    let g = raid5(5, 4);
    assert!(g.map_host_range(0, 0).is_err());
    assert!(g.map_host_range(14, 4).is_err());
    assert!(g.map_host_range(u64::MAX, 2).is_err());
}

#[test]
fn split_host_range_cuts_at_parity_stripes() {
    let g = raid5(5, 4);
    assert_eq!(
        g.split_host_range(14, 20),
        vec![(14, 2), (16, 16), (32, 2)]
    );
    assert!(g.split_host_range(3, 0).is_empty());
}

#[test]
fn locate_host_block_follows_rotation() {
    let g = Geometry::new(RaidType::Raid5, 4, 2, 2).expect("geometry");
    // Parity stripe 0 has parity on member 3, so data starts at member 0.
    assert_eq!(g.locate_host_block(0), (0, 0));
    assert_eq!(g.locate_host_block(3), (1, 1));
    assert_eq!(g.locate_host_block(6), (0, 2));
    // Parity stripe 1 moves parity to member 2; data position 0 sits on member 3.
    assert_eq!(g.locate_host_block(12), (3, 4));
    assert_eq!(g.locate_host_block(15), (0, 5));
}

proptest! {
    #[test]
    fn stripe_relative_mapping_roundtrips(
        parity_count in 1usize..=2,
        parity_pos in 0usize..5,
        position in 0usize..5,
    ) {
        let width = 5;
        let rotating_parity = (parity_pos..parity_pos + parity_count).map(|p| p % width);
        if rotating_parity.clone().any(|p| p == position) {
            prop_assert!(position_to_stripe_relative(position, parity_pos, width, parity_count).is_err());
        } else {
            let data = position_to_stripe_relative(position, parity_pos, width, parity_count)
                .expect("data member");
            prop_assert!(data < width - parity_count);
            let back = stripe_relative_to_position(data, parity_pos, width, parity_count)
                .expect("inverse");
            prop_assert_eq!(back, position);
        }
    }

    #[test]
    fn host_mapping_hull_covers_every_block(
        element in 1u64..9,
        width in 3usize..8,
        lba_seed in 0u64..1000,
        count_seed in 1u64..1000,
    ) {
        let g = raid5(width, element);
        let per = g.data_blocks_per_parity_stripe();
        let lba = lba_seed % (per * 4);
        let count = 1 + count_seed % (per - lba % per);
        let sg = g.map_host_range(lba, count).expect("map");
        for block in lba..lba + count {
            let row = (block / element) / g.data_disks() as u64 * element + block % element;
            prop_assert!(row >= sg.parity_start);
            prop_assert!(row < sg.parity_start + sg.parity_count);
        }
    }
}

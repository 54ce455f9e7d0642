use super::*;
use crate::error::RaidError;
use crate::layout::geometry::{Geometry, RaidType};
use crate::memory::{HostBuffer, HostPlacement, Segment};

struct NoHostElements;

impl HostScatter for NoHostElements {
    fn count_sgs(&self, _: &HostPlacement, _: &mut [usize]) -> RaidResult<()> {
        Ok(())
    }

    fn scatter(
        &self,
        _: &HostPlacement,
        _: &mut dyn FnMut(usize, Segment) -> RaidResult<()>,
    ) -> RaidResult<()> {
        Ok(())
    }
}

fn config(page_blocks: u64) -> PlannerConfig {
    PlannerConfig { page_blocks }
}

#[test]
fn count_uniform_blocks_continues_in_current_page() {
    let mut left = 0;
    assert_eq!(count_uniform_blocks(4, 4, &mut left), 1);
    assert_eq!(left, 0);
    assert_eq!(count_uniform_blocks(6, 4, &mut left), 2);
    assert_eq!(left, 2);
    assert_eq!(count_uniform_blocks(3, 4, &mut left), 2);
    assert_eq!(left, 3);
    assert_eq!(count_uniform_blocks(0, 4, &mut left), 0);
    assert_eq!(left, 3);
}

#[test]
fn split_position_counts_gaps_apart_from_host_data() {
    let g = Geometry::new(RaidType::Raid5, 5, 4, 4).expect("geometry");
    let mut request = StripeRequest::new(&g, 10, 8, [Some(2), None]).expect("request");
    assert_eq!(request.preread.r1[2], 2);
    assert_eq!(request.preread.r2[2], 2);

    let host = HostBuffer::new(8).expect("host buffer");
    let plan = plan_sizes(&mut request, &host, &config(4)).expect("plan");

    // Position 2: one element before the host data, one host element, one after.
    assert_eq!(plan.read_sgs, vec![2, 2, 3, 2, 2]);
    assert_eq!(plan.write_sgs, vec![0, 1, 1]);
    assert_eq!(plan.pool_blocks, 22);
    assert_eq!(plan.total_blocks_to_read, 30);
    assert_eq!(plan.pool_blocks + 8, plan.total_blocks_to_read);
    assert_eq!(plan.pages(), 6);

    let mem = plan.memory_request().expect("request");
    assert_eq!(mem.pages, 6);
    assert_eq!(mem.sg_lists, [3, 5, 0, 0, 0]);
    assert!(request.read_info.iter().all(|e| e.sg_index == 1));
    assert!(request.write_info.iter().all(|e| e.sg_index == 0));
}

#[test]
fn member_without_sg_elements_is_rejected() {
    let g = Geometry::new(RaidType::Raid5, 5, 4, 1).expect("geometry");
    let mut request = StripeRequest::new(&g, 0, 16, [Some(1), None]).expect("request");
    let err = plan_sizes(&mut request, &NoHostElements, &config(4)).expect_err("zero count");
    assert!(matches!(err, RaidError::InvalidParameter(_)));
}

#[test]
fn oversized_chain_is_insufficient_resources() {
    let g = Geometry::new(RaidType::Raid5, 3, 3000, 1).expect("geometry");
    let mut request = StripeRequest::new(&g, 0, 3000, [Some(0), None]).expect("request");
    let host = HostBuffer::new(3000).expect("host buffer");
    let err = plan_sizes(&mut request, &host, &config(1)).expect_err("too many elements");
    assert!(matches!(err, RaidError::InsufficientResources(_)));
}

#[test]
fn zero_page_size_is_invalid() {
    let g = Geometry::new(RaidType::Raid5, 5, 4, 1).expect("geometry");
    let mut request = StripeRequest::new(&g, 0, 4, [Some(0), None]).expect("request");
    let host = HostBuffer::new(4).expect("host buffer");
    assert!(plan_sizes(&mut request, &host, &config(0)).is_err());
}

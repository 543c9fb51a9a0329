use offload::workload::distributed_sum::{self, DistributedSumParams};
use offload::{LocalSizePolicy, OffloadError, RemainderPolicy};

use super::helpers::host_config;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_four_ranks_sum_64() {
    let config = host_config(128, RemainderPolicy::Pad);
    let report = distributed_sum::run(&config, &DistributedSumParams::default())
        .await
        .unwrap();
    assert_eq!(report.total, 2080);

    let ranges: Vec<(u64, u64)> = report
        .ranks
        .iter()
        .map(|r| (r.range.first(), r.range.last()))
        .collect();
    assert_eq!(ranges, vec![(1, 16), (17, 32), (33, 48), (49, 64)]);
    let locals: Vec<i64> = report.ranks.iter().map(|r| r.local_sum).collect();
    assert_eq!(locals, vec![136, 392, 648, 904]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uneven_split_and_odd_world() {
    let config = host_config(64, RemainderPolicy::Pad);
    let params = DistributedSumParams {
        problem_size: 1001,
        world_size: 3,
        local_size: LocalSizePolicy::Fixed(16),
        root: 1,
    };
    let report = distributed_sum::run(&config, &params).await.unwrap();
    assert_eq!(report.total, 1001 * 1002 / 2);
    assert_eq!(report.ranks.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_more_ranks_than_elements() {
    let config = host_config(64, RemainderPolicy::Pad);
    let params = DistributedSumParams {
        problem_size: 2,
        world_size: 4,
        local_size: LocalSizePolicy::Fixed(4),
        root: 0,
    };
    let report = distributed_sum::run(&config, &params).await.unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(
        report.ranks.iter().filter(|r| r.geometry.is_none()).count(),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_rank_does_not_hang() {
    let config = host_config(64, RemainderPolicy::Truncate);
    // Each rank owns 16 elements; truncating to groups of 32 leaves none.
    let params = DistributedSumParams {
        problem_size: 64,
        world_size: 4,
        local_size: LocalSizePolicy::Fixed(32),
        root: 0,
    };
    let err = distributed_sum::run(&config, &params).await.unwrap_err();
    assert!(matches!(
        err,
        OffloadError::InvalidGeometry(_) | OffloadError::PeerDisconnected { .. }
    ));
}

#[tokio::test]
async fn test_root_out_of_range() {
    let config = host_config(64, RemainderPolicy::Pad);
    let params = DistributedSumParams {
        root: 4,
        ..DistributedSumParams::default()
    };
    assert!(matches!(
        distributed_sum::run(&config, &params).await,
        Err(OffloadError::InvalidRank { rank: 4, .. })
    ));
}

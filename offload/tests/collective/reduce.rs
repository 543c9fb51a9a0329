use offload::{OffloadError, ReduceOp};

use super::helpers::run_ranks;

#[tokio::test]
async fn test_reduce_4_ranks_sum() {
    let locals = [10i64, 20, 30, 40];
    let results = run_ranks(4, move |comm| async move {
        let value = locals[comm.rank() as usize];
        comm.reduce_value(value, ReduceOp::Sum, 0).await.unwrap()
    })
    .await;
    assert_eq!(results, vec![Some(100), None, None, None]);
}

#[tokio::test]
async fn test_reduce_3_ranks_nonzero_root() {
    let results = run_ranks(3, |comm| async move {
        let value = comm.rank() as i64 + 1;
        comm.reduce_value(value, ReduceOp::Sum, 2).await.unwrap()
    })
    .await;
    assert_eq!(results, vec![None, None, Some(6)]);
}

#[tokio::test]
async fn test_reduce_non_power_of_two_worlds() {
    for world in [3u32, 5, 6, 7] {
        let results = run_ranks(world, |comm| async move {
            let value = (comm.rank() as u64 + 1) * 1_000_000_007;
            comm.reduce_value(value, ReduceOp::Sum, 0).await.unwrap()
        })
        .await;
        let n = world as u64;
        assert_eq!(results[0], Some(n * (n + 1) / 2 * 1_000_000_007), "world={world}");
        assert!(results[1..].iter().all(Option::is_none));
    }
}

#[tokio::test]
async fn test_reduce_max_and_min() {
    let results = run_ranks(4, |comm| async move {
        let value = [3.5f64, -2.0, 9.25, 0.0][comm.rank() as usize];
        let max = comm.reduce_value(value, ReduceOp::Max, 1).await.unwrap();
        let min = comm.reduce_value(value, ReduceOp::Min, 1).await.unwrap();
        (max, min)
    })
    .await;
    assert_eq!(results[1], (Some(9.25), Some(-2.0)));
    assert_eq!(results[0], (None, None));
}

#[tokio::test]
async fn test_reduce_invalid_root() {
    let results = run_ranks(2, |comm| async move {
        comm.reduce_value(1i32, ReduceOp::Sum, 2).await
    })
    .await;
    for r in results {
        assert!(matches!(
            r,
            Err(OffloadError::InvalidRank {
                rank: 2,
                world_size: 2
            })
        ));
    }
}

use offload::collective::tree_reduce;
use offload::types::{decode, encode};
use offload::{DataType, LocalCluster, OffloadError, ReduceOp};
use std::time::Duration;

use super::helpers::run_ranks;

#[tokio::test]
async fn test_tree_reduce_vector() {
    let results = run_ranks(4, |comm| async move {
        let rank = comm.rank() as f32;
        let mut buf = encode(&[rank, rank * 2.0, 1.0]);
        tree_reduce(&comm, &mut buf, 3, DataType::F32, ReduceOp::Sum, 0)
            .await
            .unwrap();
        (comm.rank(), decode::<f32>(&buf).unwrap())
    })
    .await;
    assert_eq!(results[0], (0, vec![6.0, 12.0, 4.0]));
}

#[tokio::test]
async fn test_tree_reduce_size_mismatch() {
    let comms = LocalCluster::bootstrap(1).unwrap();
    let mut buf = vec![0u8; 6];
    let err = tree_reduce(&comms[0], &mut buf, 1, DataType::I64, ReduceOp::Sum, 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OffloadError::BufferSizeMismatch {
            expected: 8,
            actual: 6
        }
    ));
}

#[tokio::test]
async fn test_missing_rank_disconnects_root() {
    let mut comms = LocalCluster::bootstrap(2).unwrap();
    let absent = comms.pop().unwrap();
    drop(absent);
    let err = comms[0]
        .reduce_value(5i64, ReduceOp::Sum, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, OffloadError::PeerDisconnected { rank: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_rank_times_out() {
    let comms =
        LocalCluster::bootstrap_with_timeout(2, Some(Duration::from_secs(5))).unwrap();
    // Rank 1 is alive but never joins the reduce.
    let err = comms[0]
        .reduce_value(5i64, ReduceOp::Sum, 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OffloadError::CollectiveFailed {
            operation: "reduce",
            rank: 1,
            ..
        }
    ));
    drop(comms);
}

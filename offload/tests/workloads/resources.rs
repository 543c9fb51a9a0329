use offload::workload::convolution::{self, ConvParams};
use offload::workload::matmul::{self, MatmulParams};
use offload::workload::pi::{self, PiParams};
use offload::workload::sum::{self, SumParams};
use offload::{ComputeSession, HostRuntime, LocalSizePolicy, OffloadError, RemainderPolicy};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::helpers::host_config;

fn counted_session() -> (ComputeSession, Arc<AtomicUsize>) {
    let config = host_config(256, RemainderPolicy::Pad);
    let rt = HostRuntime::new(config.host_max_work_group).unwrap();
    let live = rt.live_objects();
    (ComputeSession::with_runtime(Box::new(rt), config), live)
}

#[test]
fn test_repeated_sum_runs_hold_one_program() {
    let (mut session, live) = counted_session();
    for _ in 0..5 {
        let report = sum::run(&mut session, &SumParams::default()).unwrap();
        assert_eq!(report.total, 2080);
        assert_eq!(live.load(Ordering::Relaxed), 1);
    }
}

#[test]
fn test_mixed_workloads_stay_flat() {
    let (mut session, live) = counted_session();
    let pi_params = PiParams {
        samples: 100_000,
        seed: Some(7),
        ..PiParams::default()
    };
    let conv_params = ConvParams {
        seed: Some(11),
        ..ConvParams::default()
    };
    for round in 0..3 {
        sum::run(&mut session, &SumParams::default()).unwrap();
        convolution::run(&mut session, &conv_params).unwrap();
        matmul::run(&mut session, &MatmulParams::default()).unwrap();
        pi::run(&mut session, &pi_params).unwrap();
        // One program per kernel file, nothing else outlives a run.
        assert_eq!(live.load(Ordering::Relaxed), 4, "round {round}");
    }
    drop(session);
    assert_eq!(live.load(Ordering::Relaxed), 0);
}

#[test]
fn test_failed_runs_do_not_leak() {
    let (mut session, live) = counted_session();
    let params = SumParams {
        problem_size: 64,
        local_size: LocalSizePolicy::Fixed(512),
    };
    for _ in 0..3 {
        assert!(matches!(
            sum::run(&mut session, &params),
            Err(OffloadError::InvalidGeometry(_))
        ));
    }
    assert_eq!(live.load(Ordering::Relaxed), 1);
}

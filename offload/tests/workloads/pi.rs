use offload::workload::pi::{self, PiParams};
use offload::{LocalSizePolicy, RemainderPolicy};

use super::helpers::host_session;

#[test]
fn test_estimate_close_to_pi() {
    let mut session = host_session(256, RemainderPolicy::Pad);
    let params = PiParams {
        samples: 2_000_000,
        seed: Some(2024),
        ..PiParams::default()
    };
    let report = pi::run(&mut session, &params).unwrap();
    assert_eq!(report.geometry.group_count, 128);
    assert_eq!(report.geometry.global_size, 4096);
    assert!(
        (report.estimate - std::f64::consts::PI).abs() < 0.02,
        "estimate {}",
        report.estimate
    );
}

#[test]
fn test_every_sample_is_counted_once() {
    let mut session = host_session(64, RemainderPolicy::Pad);
    // Fewer samples than work-items: most items draw nothing.
    let params = PiParams {
        samples: 100,
        work_items: 256,
        local_size: LocalSizePolicy::Fixed(32),
        seed: Some(7),
    };
    let report = pi::run(&mut session, &params).unwrap();
    assert!(report.inside <= 100);
    assert!(report.inside > 50);
}

#[test]
fn test_same_seed_same_result() {
    let params = PiParams {
        samples: 100_000,
        seed: Some(99),
        ..PiParams::default()
    };
    let a = pi::run(&mut host_session(128, RemainderPolicy::Pad), &params).unwrap();
    let b = pi::run(&mut host_session(128, RemainderPolicy::Pad), &params).unwrap();
    assert_eq!(a.inside, b.inside);
}

#[test]
fn test_zero_samples() {
    let mut session = host_session(64, RemainderPolicy::Pad);
    let params = PiParams {
        samples: 0,
        seed: Some(1),
        ..PiParams::default()
    };
    let report = pi::run(&mut session, &params).unwrap();
    assert_eq!(report.inside, 0);
    assert_eq!(report.estimate, 0.0);
}

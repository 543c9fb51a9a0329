use offload::workload::sum::{self, SumParams};
use offload::{LocalSizePolicy, OffloadError, RemainderPolicy};

use super::helpers::host_session;

#[test]
fn test_sum_64_in_two_groups() {
    let mut session = host_session(128, RemainderPolicy::Pad);
    let report = sum::run(&mut session, &SumParams::default()).unwrap();
    assert_eq!(report.geometry.group_count, 2);
    assert_eq!(report.geometry.global_size, 64);
    assert_eq!(report.partial_count, 2);
    assert_eq!(report.total, 2080);
}

#[test]
fn test_group_size_does_not_change_total() {
    for local in [1, 2, 8, 32, 64] {
        let mut session = host_session(128, RemainderPolicy::Pad);
        let params = SumParams {
            problem_size: 64,
            local_size: LocalSizePolicy::Fixed(local),
        };
        assert_eq!(sum::run(&mut session, &params).unwrap().total, 2080, "local={local}");
    }
}

#[test]
fn test_remainder_policies() {
    let params = SumParams {
        problem_size: 70,
        local_size: LocalSizePolicy::Fixed(32),
    };
    let mut padded = host_session(128, RemainderPolicy::Pad);
    let report = sum::run(&mut padded, &params).unwrap();
    assert_eq!(report.geometry.global_size, 96);
    assert_eq!(report.total, 70 * 71 / 2);

    let mut truncated = host_session(128, RemainderPolicy::Truncate);
    let report = sum::run(&mut truncated, &params).unwrap();
    assert_eq!(report.geometry.global_size, 64);
    assert_eq!(report.total, 2080);
}

#[test]
fn test_large_sum_widens() {
    let mut session = host_session(256, RemainderPolicy::Pad);
    let params = SumParams {
        problem_size: 1_000_000,
        local_size: LocalSizePolicy::Fixed(256),
    };
    let report = sum::run(&mut session, &params).unwrap();
    assert_eq!(report.total, 1_000_000i64 * 1_000_001 / 2);
}

#[test]
fn test_degenerate_geometry() {
    let mut session = host_session(128, RemainderPolicy::Truncate);
    let params = SumParams {
        problem_size: 16,
        local_size: LocalSizePolicy::Fixed(32),
    };
    assert!(matches!(
        sum::run(&mut session, &params),
        Err(OffloadError::InvalidGeometry(_))
    ));

    let params = SumParams {
        problem_size: 64,
        local_size: LocalSizePolicy::Fixed(256),
    };
    assert!(matches!(
        sum::run(&mut session, &params),
        Err(OffloadError::InvalidGeometry(_))
    ));
}

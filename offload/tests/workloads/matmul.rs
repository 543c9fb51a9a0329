use offload::workload::matmul::{self, MatmulParams, multiply, operands};
use offload::{RemainderPolicy, plan_tiled};

use super::helpers::host_session;

fn reference(a: &[u32], b: &[u32], m: usize) -> Vec<u32> {
    let mut c = vec![0u32; m * m];
    for r in 0..m {
        for col in 0..m {
            c[r * m + col] = (0..m).map(|k| a[r * m + k] * b[k * m + col]).sum();
        }
    }
    c
}

#[test]
fn test_5x5_padded_to_one_tile() {
    let mut session = host_session(256, RemainderPolicy::Pad);
    let report = matmul::run(&mut session, &MatmulParams::default()).unwrap();
    assert_eq!(report.geometry.tile_size, 16);
    assert_eq!(report.geometry.padded_extent, 16);
    assert_eq!(report.geometry.group_count_x, 1);

    let expected = reference(&report.a.logical_block(), &report.b.logical_block(), 5);
    assert_eq!(report.c.logical_block(), expected);
    assert_eq!(report.c.get(0, 0), 55);
    // Padding contributes nothing outside the logical block either.
    assert!((0..16).all(|i| report.c.get(5, i) == 0 && report.c.get(i, 5) == 0));
}

#[test]
fn test_multi_tile_uneven_size() {
    let mut session = host_session(16, RemainderPolicy::Pad);
    let report = matmul::run(&mut session, &MatmulParams { problem_size: 10 }).unwrap();
    assert_eq!(report.geometry.tile_size, 4);
    assert_eq!(report.geometry.padded_extent, 12);
    assert_eq!(report.geometry.group_count(), 9);
    let expected = reference(&report.a.logical_block(), &report.b.logical_block(), 10);
    assert_eq!(report.c.logical_block(), expected);
}

#[test]
fn test_padding_does_not_change_logical_block() {
    let mut session = host_session(64, RemainderPolicy::Pad);
    let exact = plan_tiled(8, 64).unwrap();
    let (a, b) = operands(8, exact.padded_extent).unwrap();
    let (c_exact, _) = multiply(&mut session, exact, &a, &b).unwrap();

    let mut padded = exact;
    padded.padded_extent = 16;
    padded.group_count_x = 2;
    padded.group_count_y = 2;
    let (a, b) = operands(8, 16).unwrap();
    let (c_padded, _) = multiply(&mut session, padded, &a, &b).unwrap();

    assert_eq!(c_exact.logical_block(), c_padded.logical_block());
}

#[test]
fn test_operand_shape_mismatch() {
    let mut session = host_session(64, RemainderPolicy::Pad);
    let geometry = plan_tiled(8, 64).unwrap();
    let (a, b) = operands(8, 16).unwrap();
    assert!(multiply(&mut session, geometry, &a, &b).is_err());
}

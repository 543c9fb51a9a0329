use offload::workload::convolution::{self, ConvParams, convolve, random_signal};
use offload::{LocalSizePolicy, RemainderPolicy};

use super::helpers::host_session;

fn box_filter(input: &[u32], radius: usize) -> Vec<u32> {
    (0..input.len())
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(input.len() - 1);
            input[lo..=hi].iter().sum()
        })
        .collect()
}

#[test]
fn test_default_run_matches_reference() {
    let mut session = host_session(256, RemainderPolicy::Pad);
    let params = ConvParams {
        seed: Some(42),
        ..ConvParams::default()
    };
    let report = convolution::run(&mut session, &params).unwrap();
    assert_eq!(report.geometry.group_count, 1);
    assert_eq!(report.geometry.local_size, 256);
    assert_eq!(report.input.len(), 256);
    assert_eq!(report.output, box_filter(&report.input, 4));
}

#[test]
fn test_constant_signal_edges() {
    let mut session = host_session(64, RemainderPolicy::Pad);
    let input = vec![1u32; 20];
    let (_, out, _) = convolve(&mut session, &input, 2, LocalSizePolicy::Fixed(8)).unwrap();
    assert_eq!(&out[..3], &[3, 4, 5]);
    assert!(out[2..18].iter().all(|&v| v == 5));
    assert_eq!(&out[17..], &[5, 4, 3]);
}

#[test]
fn test_padded_launch_leaves_output_length() {
    let mut session = host_session(64, RemainderPolicy::Pad);
    let input = random_signal(100, Some(1));
    let (geometry, out, _) =
        convolve(&mut session, &input, 4, LocalSizePolicy::FullCapacity).unwrap();
    assert_eq!(geometry.global_size, 128);
    assert_eq!(out.len(), 100);
    assert_eq!(out, box_filter(&input, 4));
}

#[test]
fn test_empty_signal_is_rejected() {
    let mut session = host_session(64, RemainderPolicy::Pad);
    assert!(convolve(&mut session, &[], 4, LocalSizePolicy::FullCapacity).is_err());
}

use offload::cli::{finish, init_logging, parse_args, problem_size};
use offload::workload::matmul::{self, MatmulParams};
use offload::{ComputeSession, OffloadConfig, Result};
use std::process::ExitCode;

/// Matrices up to this size are printed.
const PRINT_LIMIT: usize = 16;

fn run(requested: Option<u64>) -> Result<()> {
    let config = OffloadConfig::from_env();
    let mut session = ComputeSession::open(&config)?;
    let mut params = MatmulParams::default();
    if let Some(m) = requested {
        params.problem_size = problem_size(m)?;
    }

    let report = matmul::run(&mut session, &params)?;
    println!("New padded M: {}", report.geometry.padded_extent);
    println!("{}", report.geometry);
    println!(
        "Device execution time: {:.3} ms",
        report.elapsed.as_secs_f64() * 1e3
    );
    if params.problem_size <= PRINT_LIMIT {
        println!("{}", report.a);
        println!("{}", report.b);
        println!("{}", report.c);
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = parse_args();
    finish(run(args.problem_size))
}

use offload::cli::{finish, init_logging, parse_args, problem_size};
use offload::workload::sum::{self, SumParams};
use offload::{ComputeSession, OffloadConfig, Result};
use std::process::ExitCode;
use std::time::Instant;

fn run(requested: Option<u64>) -> Result<()> {
    let start = Instant::now();
    let config = OffloadConfig::from_env();
    let mut session = ComputeSession::open(&config)?;
    let mut params = SumParams::default();
    if let Some(m) = requested {
        params.problem_size = problem_size(m)?;
    }

    let report = sum::run(&mut session, &params)?;
    println!("{}", report.geometry);
    println!(
        "Device execution time: {:.3} ms",
        report.elapsed.as_secs_f64() * 1e3
    );
    println!("Computed sum = {}.", report.total);
    println!("Total time: {:.6} s", start.elapsed().as_secs_f64());
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = parse_args();
    finish(run(args.problem_size))
}

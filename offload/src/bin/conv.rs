use offload::cli::{finish, init_logging, parse_args, problem_size};
use offload::workload::convolution::{self, ConvParams};
use offload::{ComputeSession, OffloadConfig, Result};
use std::process::ExitCode;

fn join(values: &[u32]) -> String {
    values.iter().map(|v| format!("{v}, ")).collect()
}

fn run(requested: Option<u64>) -> Result<()> {
    let config = OffloadConfig::from_env();
    let mut session = ComputeSession::open(&config)?;
    let mut params = ConvParams::default();
    if let Some(n) = requested {
        params.problem_size = problem_size(n)?;
    }

    let report = convolution::run(&mut session, &params)?;
    println!("{}", report.geometry);
    println!(
        "Device execution time: {:.3} ms",
        report.elapsed.as_secs_f64() * 1e3
    );
    println!("{}\n", join(&report.input));
    println!("{}", join(&report.output));
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = parse_args();
    finish(run(args.problem_size))
}

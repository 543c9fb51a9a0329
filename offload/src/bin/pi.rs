use offload::cli::{finish, init_logging, parse_args};
use offload::workload::pi::{self, PiParams};
use offload::{ComputeSession, OffloadConfig, OffloadError, Result};
use std::process::ExitCode;

fn run(samples: Option<u64>) -> Result<()> {
    let config = OffloadConfig::from_env();
    let mut session = ComputeSession::open(&config)?;
    let mut params = PiParams::default();
    if let Some(m) = samples {
        params.samples = u32::try_from(m).map_err(|_| {
            OffloadError::geometry(format!("{m} samples do not fit the kernel's 32-bit counter"))
        })?;
    }

    let report = pi::run(&mut session, &params)?;
    println!("{}", report.geometry);
    println!(
        "Device execution time: {:.3} ms",
        report.elapsed.as_secs_f64() * 1e3
    );
    println!("{:.50}", report.estimate);
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = parse_args();
    finish(run(args.problem_size))
}

use offload::cli::{finish, init_logging, parse_args};
use offload::workload::distributed_sum::{self, DistributedSumParams};
use offload::{OffloadConfig, OffloadError, Result};
use std::process::ExitCode;
use std::time::Instant;

async fn run(problem_size: Option<u64>) -> Result<()> {
    let start = Instant::now();
    let config = OffloadConfig::from_env();
    let mut params = DistributedSumParams {
        world_size: config.world_size,
        ..DistributedSumParams::default()
    };
    if let Some(m) = problem_size {
        params.problem_size = m;
    }

    let report = distributed_sum::run(&config, &params).await?;
    for rank in &report.ranks {
        match &rank.geometry {
            Some(g) => println!(
                "[rank {}] range {}..={}: {g}",
                rank.rank,
                rank.range.first(),
                rank.range.last()
            ),
            None => println!("[rank {}] empty range", rank.rank),
        }
        println!(
            "[rank {}] Device execution time: {:.3} ms",
            rank.rank,
            rank.elapsed.as_secs_f64() * 1e3
        );
    }
    println!("Computed sum = {}", report.total);
    println!("Total time: {:.6} s", start.elapsed().as_secs_f64());
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args = parse_args();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| OffloadError::setup_with_source("couldn't start the async runtime", e));
    finish(runtime.and_then(|rt| rt.block_on(run(args.problem_size))))
}

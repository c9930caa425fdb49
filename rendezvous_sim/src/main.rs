//! Rendezvous scenario harness CLI
//!
//! Run problem × discipline scenarios against a seeded context and report
//! which passed.

use clap::Parser;
use rendezvous_core::{Discipline, EngineConfig, Problem};
use rendezvous_sim::{Scenario, ScenarioResult, ScenarioRunner};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Rendezvous synchronization scenario harness
#[derive(Parser, Debug)]
#[command(name = "rendezvous-sim")]
#[command(about = "Run synchronization scenarios and check safety, progress and teardown", long_about = None)]
struct Args {
    /// Problem to run (bounded_buffer, readers_writers, dining_philosophers,
    /// sleeping_barber, cigarette_smokers, virtual_assistants, all)
    #[arg(short, long, default_value = "all")]
    problem: String,

    /// Discipline to run (mutex, semaphore, monitor, barrier, deadlock, all)
    #[arg(short = 'D', long, default_value = "all")]
    discipline: String,

    /// Master seed (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to run every scenario with
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Seconds each scenario runs before it is stopped
    #[arg(short, long, default_value = "2")]
    duration: f64,

    /// Speed-up applied to every pause
    #[arg(long, default_value = "1")]
    time_scale: f64,

    /// JSON engine configuration; missing keys keep their defaults
    #[arg(short, long)]
    config: Option<String>,

    /// List the supported scenarios and exit
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn parse_filter<T>(raw: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr<Err = String>,
{
    if raw.eq_ignore_ascii_case("all") {
        Ok(None)
    } else {
        raw.parse().map(Some)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let problem = match parse_filter::<Problem>(&args.problem) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let discipline = match parse_filter::<Discipline>(&args.discipline) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let scenarios = Scenario::matching(problem, discipline);
    if scenarios.is_empty() {
        eprintln!("Error: no supported scenario matches {}/{}", args.problem, args.discipline);
        eprintln!("Deadlock is only defined for dining_philosophers");
        return ExitCode::FAILURE;
    }

    if args.list {
        for scenario in &scenarios {
            println!("{:<40} {}", scenario.name(), scenario.problem.description());
        }
        return ExitCode::SUCCESS;
    }

    let config = match &args.config {
        Some(path) => match EngineConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let base_seed = if args.seed == 0 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    if !args.json {
        info!("Rendezvous scenario harness v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds.max(1) {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = match ScenarioRunner::new(seed, config.clone())
            .with_duration(args.duration)
            .with_time_scale(args.time_scale)
        {
            Ok(runner) => runner,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED, {} rounds", scenario.name(), seed, result.progress);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": &all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

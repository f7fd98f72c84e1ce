//! Command line driver for the fax session simulator.
//!
//! `fuzz` sweeps many seeded fax sessions through a degraded channel and
//! logs every session whose reassembly differs from the expectation model.
//! `replay` reruns one logged session seed.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use t38star_sim::{FaxSimulator, SimConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Seeded T.38 fax session simulator", long_about = None)]
struct CliArgs {
    #[arg(value_enum)]
    mode: RunMode,

    /// Session seed to replay, or the seed that derives every session seed of a sweep.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Fax sessions per sweep.
    #[arg(short = 'i', long, default_value_t = 1000)]
    iterations: usize,

    /// HDLC frames or T.4 pages sent per session.
    #[arg(short = 'u', long, default_value_t = 50)]
    units: usize,

    /// Upper bound for the channel's datagram loss rate.
    #[arg(long, default_value_t = 0.2)]
    max_loss: f64,

    /// Let the channel reorder and duplicate datagrams.
    #[arg(long)]
    disorder: bool,

    /// Where mismatching sessions are written.
    #[arg(short = 'o', long, default_value = "t38_sim_failures.log")]
    output_file: PathBuf,

    /// Sessions run in parallel.
    #[arg(short = 'w', long, default_value_t = num_cpus::get())]
    workers: usize,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RunMode {
    /// Sweep randomized fax sessions.
    Fuzz,
    /// Rerun the session behind one seed.
    Replay,
}

fn main() {
    env_logger::init();
    let args = CliArgs::parse();

    match args.mode {
        RunMode::Fuzz => run_fuzz_mode(args),
        RunMode::Replay => run_replay_mode(args),
    }
}

/// Derives a fax session from its seed: unit sizes, fragment size, page mix,
/// redundancy depth and channel impairments.
fn session_config(session_seed: u64, units: usize, max_loss: f64, disorder: bool) -> SimConfig {
    let mut rng = StdRng::seed_from_u64(session_seed);
    let min_unit_len = rng.random_range(1..=16);

    SimConfig {
        seed: rng.random(),
        num_units: units,
        start_seq: rng.random(),
        min_unit_len,
        max_unit_len: rng.random_range(min_unit_len..=1024),
        max_fragment_len: rng.random_range(1..=256),
        t4_page_probability: if rng.random_bool(0.5) {
            0.0
        } else {
            rng.random_range(0.0..=1.0)
        },
        redundancy: rng.random_range(0..=3),
        channel_packet_loss_probability: if rng.random_bool(0.5) {
            0.0
        } else {
            rng.random_range(0.0..=max_loss.clamp(0.0, 1.0))
        },
        channel_reorder_probability: if disorder && rng.random_bool(0.5) {
            rng.random_range(0.0..=0.2)
        } else {
            0.0
        },
        channel_duplicate_probability: if disorder && rng.random_bool(0.5) {
            rng.random_range(0.0..=0.2)
        } else {
            0.0
        },
    }
}

/// Sweeps sessions across a rayon pool and exits 1 if any session failed.
///
/// Session seeds are drawn from the sweep seed before any work starts, so a
/// logged seed replays the same session whatever the scheduling was.
fn run_fuzz_mode(args: CliArgs) {
    println!(
        "[{}] Sweeping {} fax sessions of {} units, loss up to {}%, disorder {}, {} workers",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        args.iterations,
        args.units,
        (args.max_loss * 100.0) as u32,
        if args.disorder { "on" } else { "off" },
        args.workers
    );
    let started = Instant::now();

    let finished = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let interrupted = AtomicBool::new(false);

    let failure_log = match File::create(&args.output_file) {
        Ok(file) => Mutex::new(file),
        Err(e) => {
            eprintln!("Cannot open failure log {}: {}", args.output_file.display(), e);
            std::process::exit(2);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        println!("\nInterrupted, finishing sessions in flight");
        running_ctrlc.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Interrupt handler not installed: {}", e);
    }

    let sweep_seed = args.seed.unwrap_or_else(rand::random);
    println!("Sweep seed: {}", sweep_seed);
    let mut seed_rng = StdRng::seed_from_u64(sweep_seed);
    let session_seeds: Vec<u64> = (0..args.iterations).map(|_| seed_rng.random()).collect();

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers.max(1))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Cannot start {} workers: {}", args.workers, e);
            std::process::exit(2);
        }
    };

    pool.install(|| {
        session_seeds.par_iter().for_each(|&session_seed| {
            if !running.load(Ordering::Relaxed) {
                interrupted.store(true, Ordering::Relaxed);
                return;
            }
            let config = session_config(session_seed, args.units, args.max_loss, args.disorder);
            let mut simulator = FaxSimulator::new(config.clone());

            if let Err(sim_error) = simulator.run() {
                let entry = format!(
                    "[{}] session seed {}: {:?}\n{:#?}\n\n",
                    chrono::Local::now().to_rfc3339(),
                    session_seed,
                    sim_error,
                    config
                );
                eprint!("{}", entry);
                if let Ok(mut file) = failure_log.lock() {
                    let _ = file.write_all(entry.as_bytes());
                    let _ = file.flush();
                }
                failed.fetch_add(1, Ordering::Relaxed);
            }

            let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
            if done % (100 * args.workers).max(1) == 0 || done == args.iterations {
                println!(
                    "{}/{} sessions, {} failed",
                    done,
                    args.iterations,
                    failed.load(Ordering::Relaxed)
                );
            }
        });
    });

    let failed = failed.load(Ordering::SeqCst);
    println!(
        "\n{} of {} sessions run in {:.2?}, {} failed",
        finished.load(Ordering::SeqCst),
        args.iterations,
        started.elapsed(),
        failed
    );
    if interrupted.load(Ordering::SeqCst) {
        println!("Sweep stopped early");
    }
    if failed > 0 {
        println!("Failing sessions logged to '{}'", args.output_file.display());
        std::process::exit(1);
    }
}

/// Reruns one session. The same `--units`, `--max-loss` and `--disorder`
/// flags as the sweep are needed to rebuild its configuration.
fn run_replay_mode(args: CliArgs) {
    let Some(session_seed) = args.seed else {
        eprintln!("replay needs --seed <SESSION_SEED>");
        std::process::exit(2);
    };

    let config = session_config(session_seed, args.units, args.max_loss, args.disorder);
    println!("Session {}: {:#?}", session_seed, config);

    match FaxSimulator::new(config).run() {
        Ok(stats) => println!("Session {} reassembled cleanly: {:?}", session_seed, stats),
        Err(e) => {
            eprintln!("Session {} failed: {:?}", session_seed, e);
            std::process::exit(1);
        }
    }
}

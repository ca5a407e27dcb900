//! Long-running soak test for machine lifecycle orchestration.
//!
//! Drives a mock-backed machine through hundreds of start/restart/kill
//! cycles with a settling backend, checking after every operation that the
//! observed state is the one the operation promised, that redundant
//! transitions are refused, and that the machine survives repeated
//! save/load through the store under its lock.
//!
//! Usage:
//!   cargo run --bin lifecycle_soak -- [--cycles N] [--settle N] [--verbose]

use dockhand_core::{CoreError, Machine, MachineLock, PollPolicy};
use dockhand_driver::{MachineState, MockDriver};
use dockhand_schema::HostOptions;
use dockhand_store::{MachineStore, StoreLayout};
use std::time::{Duration, Instant};

const MACHINE: &str = "soak-01";

struct Timings {
    start: Duration,
    restart: Duration,
    kill: Duration,
    persist: Duration,
}

fn arg_value(args: &[String], flag: &str, default: u32) -> u32 {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn expect_state(machine: &Machine, expected: MachineState, step: &str) -> Result<(), String> {
    match machine.state() {
        Ok(state) if state == expected => Ok(()),
        Ok(state) => Err(format!("{step}: expected {expected}, observed {state}")),
        Err(e) => Err(format!("{step}: STATE QUERY FAILED: {e}")),
    }
}

fn expect_refused(result: Result<(), CoreError>, step: &str) -> Result<(), String> {
    match result {
        Err(CoreError::AlreadyInState { .. }) => Ok(()),
        Ok(()) => Err(format!("{step}: redundant transition was not refused")),
        Err(e) => Err(format!("{step}: unexpected error: {e}")),
    }
}

fn run_cycle(machine: &Machine, cycle: u32, timings: &mut Timings) -> Result<(), String> {
    let t0 = Instant::now();
    machine
        .start()
        .map_err(|e| format!("cycle {cycle}: START FAILED: {e}"))?;
    timings.start += t0.elapsed();
    expect_state(machine, MachineState::Running, &format!("cycle {cycle}: start"))?;
    expect_refused(machine.start(), &format!("cycle {cycle}: second start"))?;

    let t0 = Instant::now();
    machine
        .restart()
        .map_err(|e| format!("cycle {cycle}: RESTART FAILED: {e}"))?;
    timings.restart += t0.elapsed();
    expect_state(machine, MachineState::Running, &format!("cycle {cycle}: restart"))?;

    let t0 = Instant::now();
    machine
        .kill()
        .map_err(|e| format!("cycle {cycle}: KILL FAILED: {e}"))?;
    timings.kill += t0.elapsed();
    expect_state(machine, MachineState::Stopped, &format!("cycle {cycle}: kill"))?;
    expect_refused(machine.stop(), &format!("cycle {cycle}: stop after kill"))?;

    Ok(())
}

fn persist_round_trip(
    machine: &Machine,
    store: &MachineStore,
    policy: PollPolicy,
    cycle: u32,
) -> Result<Machine, String> {
    let _lock = MachineLock::for_machine(store.layout(), MACHINE)
        .map_err(|e| format!("cycle {cycle}: LOCK FAILED: {e}"))?;
    machine
        .save(store)
        .map_err(|e| format!("cycle {cycle}: SAVE FAILED: {e}"))?;
    let loaded = Machine::load(store, MACHINE)
        .map_err(|e| format!("cycle {cycle}: LOAD FAILED: {e}"))?
        .with_poll_policy(policy);
    expect_state(&loaded, MachineState::Stopped, &format!("cycle {cycle}: reload"))?;
    Ok(loaded)
}

fn print_report(cycles: u32, failures: u64, timings: &Timings, store: &MachineStore) {
    let per_cycle = |d: Duration| d.as_secs_f64() * 1000.0 / f64::from(cycles.max(1));

    println!();
    println!("============================================");
    println!("Results: {cycles} cycles, {failures} failures");
    println!(
        "  start:   {:.3}s total, {:.3}ms avg",
        timings.start.as_secs_f64(),
        per_cycle(timings.start)
    );
    println!(
        "  restart: {:.3}s total, {:.3}ms avg",
        timings.restart.as_secs_f64(),
        per_cycle(timings.restart)
    );
    println!(
        "  kill:    {:.3}s total, {:.3}ms avg",
        timings.kill.as_secs_f64(),
        per_cycle(timings.kill)
    );
    println!("  persist: {:.3}s total", timings.persist.as_secs_f64());
    match store.list() {
        Ok(machines) => println!("  machines in store: {}", machines.len()),
        Err(e) => println!("  machines in store: ERROR: {e}"),
    }

    if failures > 0 {
        eprintln!("\nSOAK TEST FAILED");
        std::process::exit(1);
    } else {
        println!("\nSOAK TEST PASSED");
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let cycles = arg_value(&args, "--cycles", 500);
    let settle = arg_value(&args, "--settle", 2);
    let default_level = if args.iter().any(|a| a == "--verbose") {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DOCKHAND_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    println!("dockhand lifecycle soak: {cycles} cycles, settle {settle}");
    println!("============================================");

    let store_dir = tempfile::tempdir().expect("create temp dir");
    let layout = StoreLayout::new(store_dir.path());
    layout.initialize().expect("initialize store");
    let store = MachineStore::new(layout);

    // Budget comfortably above the settle lag so only real bugs time out.
    let policy = PollPolicy::new(settle + 5, Duration::ZERO);
    let mut machine = Machine::new(
        MACHINE,
        Box::new(MockDriver::new(MACHINE).with_settle_polls(settle)),
        HostOptions::default(),
    )
    .expect("create machine")
    .with_poll_policy(policy);

    let mut timings = Timings {
        start: Duration::ZERO,
        restart: Duration::ZERO,
        kill: Duration::ZERO,
        persist: Duration::ZERO,
    };
    let mut failures = 0u64;

    for cycle in 1..=cycles {
        if let Err(msg) = run_cycle(&machine, cycle, &mut timings) {
            eprintln!("  {msg}");
            failures += 1;
            continue;
        }
        if cycle % 10 == 0 {
            let t0 = Instant::now();
            match persist_round_trip(&machine, &store, policy, cycle) {
                Ok(loaded) => machine = loaded,
                Err(msg) => {
                    eprintln!("  {msg}");
                    failures += 1;
                    break;
                }
            }
            timings.persist += t0.elapsed();
        }
        if cycle % 100 == 0 {
            let elapsed = timings.start + timings.restart + timings.kill + timings.persist;
            println!(
                "  cycle {cycle}/{cycles}: {:.1}s elapsed, {failures} failures",
                elapsed.as_secs_f64()
            );
        }
    }

    print_report(cycles, failures, &timings, &store);
}

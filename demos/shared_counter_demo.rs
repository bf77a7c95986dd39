//! Demo application driving a shared counter from the command line.
//!
//! Run several copies against the same key to watch them share one value:
//! ```bash
//! cargo run --example shared_counter_demo --features demo -- --key 0xac00ac simulate --threads 4
//! cargo run --example shared_counter_demo --features demo -- --key 0xac00ac get
//! cargo run --example shared_counter_demo --features demo -- --key 0xac00ac remove
//! ```
//!
//! Without `--key`, the `SHMCOUNTER_*` environment variables are used.

use clap::{Parser, Subcommand};
use shmcounter::observers::json::JsonObserver;
use shmcounter::{segment, CounterConfig, SegmentKey, SharedCounter};
use std::error::Error;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Demo application for shmcounter - atomic counters in shared memory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Segment key, hex (0x...) or decimal. Falls back to SHMCOUNTER_KEY.
    #[arg(short, long)]
    key: Option<SegmentKey>,

    /// Initial value if this run creates the counter [default: 0, or SHMCOUNTER_INITIAL]
    #[arg(short, long)]
    initial: Option<u32>,

    /// Display name of the counter [default: demo_counter, or SHMCOUNTER_NAME]
    #[arg(short, long)]
    name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current value
    Get,
    /// Increment by one
    Inc,
    /// Decrement by one
    Dec,
    /// Add a value (wrapping)
    Add { value: u32 },
    /// Store a value
    Set { value: u32 },
    /// Print the value and reset it to zero
    Reset,
    /// Print the counter as JSON
    Json {
        /// Pretty print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Hammer the counter with concurrent increments
    Simulate {
        /// Number of threads
        #[arg(long, default_value = "4")]
        threads: usize,
        /// Increments per thread
        #[arg(long, default_value = "10000")]
        iterations: usize,
    },
    /// Print the value every N milliseconds
    Watch {
        #[arg(default_value = "500")]
        interval_ms: u64,
    },
    /// Mark the segment for removal
    Remove,
}

/// Flags given on the command line win over the environment.
fn config(args: &Args, env: impl Fn(&str) -> Option<String>) -> shmcounter::Result<CounterConfig> {
    let mut config = match args.key {
        Some(key) => CounterConfig::new(key).with_name("demo_counter"),
        None => CounterConfig::from_lookup(env)?,
    };
    if let Some(initial) = args.initial {
        config.initial_value = initial;
    }
    if let Some(name) = &args.name {
        config.name = name.clone();
    }
    Ok(config)
}

/// Increments `counter` from `threads` threads, stopping at the first error.
fn simulate(
    counter: &SharedCounter,
    threads: usize,
    iterations: usize,
) -> Result<(), Box<dyn Error>> {
    thread::scope(|s| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| -> shmcounter::Result<()> {
                    for _ in 0..iterations {
                        counter.inc()?;
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            worker.join().map_err(|_| "simulate worker panicked")??;
        }
        Ok(())
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = config(&args, |name| std::env::var(name).ok())?;

    if let Command::Remove = args.command {
        segment::remove(config.key)?;
        println!("{} marked for removal", config.key);
        return Ok(());
    }

    let counter = SharedCounter::from_config(&config)?;
    if counter.created() {
        println!("created {} with value {}", config.key, config.initial_value);
    }

    match args.command {
        Command::Get => println!("{}", counter.get()?),
        Command::Inc => println!("{}", counter.inc()?),
        Command::Dec => println!("{}", counter.dec()?),
        Command::Add { value } => println!("{}", counter.add(value)?),
        Command::Set { value } => println!("{}", counter.set(value)?),
        Command::Reset => println!("{}", counter.value_and_reset()?),
        Command::Json { pretty } => {
            println!("{}", JsonObserver::new().pretty(pretty).to_json([&counter])?)
        }
        Command::Simulate {
            threads,
            iterations,
        } => {
            let before = counter.get()?;
            simulate(&counter, threads, iterations)?;
            println!(
                "{before} -> {} ({} attached)",
                counter.get()?,
                counter.attach_count()?
            );
        }
        Command::Watch { interval_ms } => loop {
            println!("{counter}");
            thread::sleep(Duration::from_millis(interval_ms));
        },
        Command::Remove => unreachable!("handled above"),
    }

    Ok(())
}

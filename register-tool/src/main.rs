use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use register_core::{ExchangeLog, Region};
use register_orc::{dump_register, init_register, resolve_config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rsf")]
#[command(about = "Register exchange files and store maintenance", long_about = None)]
struct Cli {
    /// Path to the store program
    #[arg(long, global = true)]
    program: Option<PathBuf>,

    /// Path to the store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check an exchange file and summarise its entries
    Verify {
        file: PathBuf,
    },
    /// Create a register in the store
    Init {
        register: String,
    },
    /// Write a register's current state to a file
    Dump {
        register: String,
        output: PathBuf,
    },
}

fn verify(file: &Path) -> anyhow::Result<()> {
    let reader = File::open(file)
        .map(BufReader::new)
        .with_context(|| format!("opening {}", file.display()))?;
    let log = ExchangeLog::parse(reader)
        .with_context(|| format!("verifying {}", file.display()))?;

    let mut entries: BTreeMap<Region, usize> = BTreeMap::new();
    let mut items = 0;
    for entry in log.entries() {
        *entries.entry(entry.region).or_default() += 1;
        items += entry.digests.len();
    }

    println!("{}: ok", file.display());
    for region in Region::ALL {
        println!("  {region}: {} entries", entries.get(&region).copied().unwrap_or(0));
    }
    println!("  {items} item references");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Verify { file } => verify(&file)?,
        Command::Init { register } => {
            let config = resolve_config(cli.program, cli.store);
            init_register(&config, &register)?;
            info!(register, "initialised");
        }
        Command::Dump { register, output } => {
            let config = resolve_config(cli.program, cli.store);
            dump_register(&config, &register, &output)?;
            info!(register, output = %output.display(), "dumped");
        }
    }

    Ok(())
}

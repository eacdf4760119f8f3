use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

mod address;
mod network;
mod output_id;
mod tx;

#[derive(Parser)]
#[command(name = "utxo-core")]
#[command(about = "Inspect addresses, transactions and output ids of UTXO networks")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Address encoding and decoding
    #[command(subcommand)]
    Address(address::AddressCommand),
    /// Transaction inspection
    #[command(subcommand)]
    Tx(tx::TxCommand),
    /// Output id parsing
    #[command(subcommand)]
    OutputId(output_id::OutputIdCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Address(cmd) => address::handle_command(cmd),
        Commands::Tx(cmd) => tx::handle_command(cmd),
        Commands::OutputId(cmd) => output_id::handle_command(cmd),
    }
}

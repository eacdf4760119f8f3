use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;
use utxo_core::fixed_script_wallet::parse_output_id;
use utxo_core::Network;

use crate::network::NetworkArg;

#[derive(Subcommand)]
pub enum OutputIdCommand {
    /// Parse an output id of the form `<txid>:<vout>`
    Parse {
        /// The output id
        id: String,
        /// Network (btc, tbtc, ltc, bch, zec, etc.)
        #[arg(short, long, value_enum)]
        network: NetworkArg,
    },
}

pub fn handle_command(command: OutputIdCommand) -> Result<()> {
    match command {
        OutputIdCommand::Parse { id, network } => {
            let network: Network = network.into();
            let output_id = parse_output_id(&id).context("Failed to parse output id")?;
            let summary = json!({
                "network": network.to_string(),
                "txid": output_id.txid.to_string(),
                "vout": output_id.vout,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

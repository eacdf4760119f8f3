use anyhow::{Context, Result};
use clap::Subcommand;
use utxo_core::bitcoin::Script;
use utxo_core::{
    from_output_script_with_network, to_output_script_with_network, AddressFormat, Network,
};

use crate::network::NetworkArg;

#[derive(Subcommand)]
pub enum AddressCommand {
    /// Decode an address to its output script (hex)
    Decode {
        /// The address to decode
        address: String,
        /// Network (btc, tbtc, ltc, bch, zec, etc.)
        #[arg(short, long, value_enum)]
        network: NetworkArg,
    },
    /// Encode an output script (hex) to an address
    Encode {
        /// Output script as hex
        script: String,
        /// Network (btc, tbtc, ltc, bch, zec, etc.)
        #[arg(short, long, value_enum)]
        network: NetworkArg,
        /// Address format (default or cashaddr)
        #[arg(short, long, default_value = "default")]
        format: AddressFormat,
    },
}

pub fn handle_command(command: AddressCommand) -> Result<()> {
    match command {
        AddressCommand::Decode { address, network } => {
            let network: Network = network.into();
            let script = to_output_script_with_network(&address, network)
                .with_context(|| format!("Failed to decode {} address", network))?;
            println!("{}", hex::encode(script.as_bytes()));
            Ok(())
        }
        AddressCommand::Encode {
            script,
            network,
            format,
        } => {
            let network: Network = network.into();
            let script_bytes =
                hex::decode(&script).context("Invalid hex string for output script")?;
            let script = Script::from_bytes(&script_bytes);
            let address = from_output_script_with_network(script, network, format)
                .context("Failed to encode output script to address")?;
            println!("{}", address);
            Ok(())
        }
    }
}

use std::io::Read;

use anyhow::{Context, Result};
use clap::Subcommand;
use log::debug;
use serde_json::{json, Value};
use utxo_core::fixed_script_wallet::{get_strict_signature_count, parse_signature_script};
use utxo_core::{
    from_output_script_with_network, AddressFormat, Network, SerializableTransaction,
    UtxoTransaction,
};

use crate::network::NetworkArg;

#[derive(Subcommand)]
pub enum TxCommand {
    /// Parse a hex encoded transaction and print a JSON summary
    Parse {
        /// Transaction hex (use '-' to read from stdin)
        hex: String,
        /// Network the transaction belongs to
        #[arg(long, short, value_enum)]
        network: NetworkArg,
    },
}

pub fn handle_command(command: TxCommand) -> Result<()> {
    match command {
        TxCommand::Parse { hex, network } => {
            let hex = if hex == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read transaction from stdin")?;
                buf
            } else {
                hex
            };
            let summary = summarize(hex.trim(), network.into())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn summarize(hex: &str, network: Network) -> Result<Value> {
    let tx = UtxoTransaction::from_hex(hex, network)
        .with_context(|| format!("Failed to decode {} transaction", network))?;
    debug!("decoded {:?} transaction", network.family());
    let inner = tx.transaction();

    let mut inputs = vec![];
    for (index, input) in inner.input.iter().enumerate() {
        let parsed = parse_signature_script(input)
            .with_context(|| format!("Failed to parse input {}", index))?;
        let signature_count = get_strict_signature_count(input)
            .with_context(|| format!("Invalid signatures on input {}", index))?;
        inputs.push(json!({
            "prevout": input.previous_output.to_string(),
            "sequence": input.sequence.0,
            "scriptType": parsed.as_ref().map(|p| p.script_type().as_str()),
            "signatureCount": signature_count,
        }));
    }

    let outputs: Vec<Value> = inner
        .output
        .iter()
        .map(|output| {
            json!({
                "value": output.value.to_sat(),
                "script": hex::encode(output.script_pubkey.as_bytes()),
                "address": from_output_script_with_network(
                    &output.script_pubkey,
                    network,
                    AddressFormat::Default,
                )
                .ok(),
            })
        })
        .collect();

    Ok(json!({
        "network": network.to_string(),
        "txid": tx.txid()?.to_string(),
        "version": inner.version.0,
        "lockTime": inner.lock_time.to_consensus_u32(),
        "size": tx.byte_length()?,
        "inputs": inputs,
        "outputs": outputs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF_SIGNED: &str = "01000000013aa073dc10f75be76acbf18ffb76f902ebaa5aef77d4575d984774955a0c50f300000000b700483045022100f095b5486f11b03431f19804b67dd5fd7fbee74daf917d1ce8a1d55873003b6a02207f25750af44603047dbedd2f12c0ba9c38fa699bf20b307916646a0eb6a331040100004c6952210263c23e18172e1367e9a8fbcd414d7ee38f9c1d4557febd7b59560eea34fe9afa2103fb0952a682cdf71936fd62ba42ea493f3d53e0c0064c7c8697df02adf78d9d2221039fd154eab712d38200f30a28ab39a876b82ebc6f575d72498c21991c7bce039253aeffffffff0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac00000000";

    #[test]
    fn half_signed_summary() {
        let summary = summarize(HALF_SIGNED, Network::Bitcoin).unwrap();
        assert_eq!(summary["version"], 1);
        assert_eq!(summary["inputs"][0]["scriptType"], "p2sh");
        assert_eq!(summary["inputs"][0]["signatureCount"], 1);
        assert_eq!(summary["outputs"][0]["value"], 99_999_000u64);
        assert!(summary["outputs"][0]["address"].is_string());
    }

    #[test]
    fn rejects_invalid_hex() {
        assert!(summarize("zz", Network::Bitcoin).is_err());
    }
}

//! Address <-> output script conversion per network.
//!
//! Supports Base58Check (p2pkh, p2sh), Bech32/Bech32m segwit programs and
//! CashAddr for Bitcoin Cash and eCash.

mod cashaddr;
pub mod networks;

use bech32::{Fe32, Hrp};

use crate::bitcoin::base58;
use crate::bitcoin::hashes::Hash;
use crate::bitcoin::script::PushBytesBuf;
use crate::bitcoin::{PubkeyHash, Script, ScriptBuf, ScriptHash, WitnessVersion};
use crate::error::{Result, UtxoError};
use crate::networks::Network;

pub use cashaddr::CashAddrType;
pub use networks::{AddressFormat, OutputScriptSupport};

fn hash20(bytes: &[u8]) -> Result<[u8; 20]> {
    bytes
        .try_into()
        .map_err(|_| UtxoError::format(format!("expected 20 byte hash, got {}", bytes.len())))
}

fn from_base58(address: &str, network: Network) -> Result<ScriptBuf> {
    let payload = base58::decode_check(address)
        .map_err(|e| UtxoError::format(format!("invalid base58 address: {}", e)))?;
    let versions = network.base58_versions();
    let split = versions.pub_key_hash.len();
    if payload.len() != split + 20 {
        return Err(UtxoError::format("invalid base58 payload length"));
    }
    let (version, hash) = payload.split_at(split);
    let hash = hash20(hash)?;
    if version == versions.pub_key_hash {
        Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)))
    } else if version == versions.script_hash {
        Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)))
    } else {
        Err(UtxoError::format(format!(
            "address version {} is not valid for {}",
            hex::encode(version),
            network
        )))
    }
}

fn from_bech32(address: &str, hrp: &str) -> Result<ScriptBuf> {
    let (decoded_hrp, version, program) = bech32::segwit::decode(address)
        .map_err(|e| UtxoError::format(format!("invalid bech32 address: {}", e)))?;
    if decoded_hrp.to_lowercase() != hrp {
        return Err(UtxoError::format(format!(
            "bech32 prefix '{}' does not match '{}'",
            decoded_hrp, hrp
        )));
    }
    let version = WitnessVersion::try_from(version.to_u8())
        .map_err(|e| UtxoError::format(e.to_string()))?;
    let program = PushBytesBuf::try_from(program).map_err(|e| UtxoError::format(e.to_string()))?;
    Ok(ScriptBuf::builder()
        .push_opcode(version.into())
        .push_slice(program)
        .into_script())
}

fn from_cashaddr(address: &str, prefix: &str) -> Result<ScriptBuf> {
    let (addr_type, hash) = cashaddr::decode(address, prefix).map_err(UtxoError::format)?;
    Ok(match addr_type {
        CashAddrType::P2pkh => ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)),
        CashAddrType::P2sh => ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)),
    })
}

/// Decode `address` into the output script it pays to under `network` rules.
pub fn to_output_script_with_network(address: &str, network: Network) -> Result<ScriptBuf> {
    if let Some(prefix) = network.cashaddr_prefix() {
        if address.contains(':') {
            return from_cashaddr(address, prefix);
        }
        if let Ok(script) = from_base58(address, network) {
            return Ok(script);
        }
        return from_cashaddr(address, prefix);
    }

    if let Some(hrp) = network.bech32_hrp() {
        let lower = address.to_ascii_lowercase();
        if lower.starts_with(&format!("{}1", hrp)) {
            return from_bech32(address, hrp);
        }
    }

    from_base58(address, network)
}

pub fn to_output_script_with_coin(address: &str, coin: &str) -> Result<ScriptBuf> {
    let network = Network::from_coin_name(coin)
        .ok_or_else(|| UtxoError::configuration(format!("unknown coin '{}'", coin)))?;
    to_output_script_with_network(address, network)
}

/// Encode `script` as an address of `network`.
pub fn from_output_script_with_network(
    script: &Script,
    network: Network,
    format: AddressFormat,
) -> Result<String> {
    let bytes = script.as_bytes();

    if format == AddressFormat::Cashaddr {
        let prefix = network.cashaddr_prefix().ok_or_else(|| {
            UtxoError::configuration(format!("{} does not support cashaddr", network))
        })?;
        let (addr_type, hash) = if script.is_p2pkh() {
            (CashAddrType::P2pkh, hash20(&bytes[3..23])?)
        } else if script.is_p2sh() {
            (CashAddrType::P2sh, hash20(&bytes[2..22])?)
        } else {
            return Err(UtxoError::format("script has no cashaddr encoding"));
        };
        return cashaddr::encode(prefix, addr_type, &hash).map_err(UtxoError::format);
    }

    let versions = network.base58_versions();
    if script.is_p2pkh() {
        let mut payload = versions.pub_key_hash.to_vec();
        payload.extend_from_slice(&bytes[3..23]);
        return Ok(base58::encode_check(&payload));
    }
    if script.is_p2sh() {
        let mut payload = versions.script_hash.to_vec();
        payload.extend_from_slice(&bytes[2..22]);
        return Ok(base58::encode_check(&payload));
    }
    if let Some(version) = script.witness_version() {
        let hrp = network.bech32_hrp().ok_or_else(|| {
            UtxoError::configuration(format!("{} does not support segwit addresses", network))
        })?;
        let hrp = Hrp::parse(hrp).map_err(|e| UtxoError::configuration(e.to_string()))?;
        let fe = Fe32::try_from(version.to_num()).map_err(|e| UtxoError::format(e.to_string()))?;
        return bech32::segwit::encode(hrp, fe, &bytes[2..])
            .map_err(|e| UtxoError::format(e.to_string()));
    }

    Err(UtxoError::format(format!(
        "script {} has no address encoding",
        script.to_hex_string()
    )))
}

pub fn from_output_script_with_coin(
    script: &Script,
    coin: &str,
    format: AddressFormat,
) -> Result<String> {
    let network = Network::from_coin_name(coin)
        .ok_or_else(|| UtxoError::configuration(format!("unknown coin '{}'", coin)))?;
    from_output_script_with_network(script, network, format)
}

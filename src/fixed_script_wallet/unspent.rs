//! Spendable outputs as supplied by an indexer, and their classification.

use std::fmt;
use std::str::FromStr;

use crate::address::to_output_script_with_network;
use crate::bitcoin::{Amount, OutPoint, ScriptBuf, TxOut, Txid};
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::replay_protection::ReplayProtection;
use crate::networks::Network;

const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// `<txid>:<vout>` reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId {
    pub txid: Txid,
    pub vout: u32,
}

impl OutputId {
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

impl From<OutPoint> for OutputId {
    fn from(outpoint: OutPoint) -> Self {
        Self::new(outpoint.txid, outpoint.vout)
    }
}

/// Parse `<64 hex chars>:<decimal vout>`.
pub fn parse_output_id(id: &str) -> Result<OutputId> {
    let invalid = || UtxoError::format(format!("invalid output id '{}'", id));
    let (txid, vout) = id.split_once(':').ok_or_else(invalid)?;
    if txid.len() != 64 || !txid.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    if vout.is_empty() || !vout.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let vout: u64 = vout.parse().map_err(|_| invalid())?;
    if vout > MAX_SAFE_INTEGER {
        return Err(invalid());
    }
    let vout = u32::try_from(vout).map_err(|_| invalid())?;
    let txid = Txid::from_str(&txid.to_ascii_lowercase()).map_err(|_| invalid())?;
    Ok(OutputId { txid, vout })
}

pub fn format_output_id(id: &OutputId) -> String {
    id.to_string()
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl FromStr for OutputId {
    type Err = UtxoError;

    fn from_str(s: &str) -> Result<Self> {
        parse_output_id(s)
    }
}

/// An output the wallet may spend.
///
/// Wallet unspents carry `chain` and `index`; replay protection unspents carry
/// neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unspent {
    pub id: String,
    pub address: String,
    pub value: u64,
    pub chain: Option<u32>,
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnspentKind {
    Wallet { chain: u32, index: u32 },
    ReplayProtection,
}

impl Unspent {
    pub fn wallet(id: impl Into<String>, address: impl Into<String>, value: u64, chain: u32, index: u32) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            value,
            chain: Some(chain),
            index: Some(index),
        }
    }

    pub fn replay_protection(id: impl Into<String>, address: impl Into<String>, value: u64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            value,
            chain: None,
            index: None,
        }
    }

    pub fn output_id(&self) -> Result<OutputId> {
        parse_output_id(&self.id)
    }

    pub fn is_wallet_unspent(&self) -> bool {
        self.chain.is_some()
    }

    pub fn is_replay_protection_unspent(&self, network: Network) -> Result<bool> {
        if self.chain.is_some() || self.index.is_some() {
            return Ok(false);
        }
        let script = self.script_pub_key(network)?;
        Ok(ReplayProtection::for_network(network).is_replay_protection_input(&script))
    }

    /// Classify the unspent; anything that is neither kind is a consistency error.
    pub fn kind(&self, network: Network) -> Result<UnspentKind> {
        match (self.chain, self.index) {
            (Some(chain), Some(index)) => Ok(UnspentKind::Wallet { chain, index }),
            (Some(_), None) => Err(UtxoError::consistency(format!(
                "wallet unspent {} has no index",
                self.id
            ))),
            _ if self.is_replay_protection_unspent(network)? => Ok(UnspentKind::ReplayProtection),
            _ => Err(UtxoError::consistency(format!(
                "unspent {}: not a wallet unspent, not a replay protection unspent",
                self.id
            ))),
        }
    }

    pub fn script_pub_key(&self, network: Network) -> Result<ScriptBuf> {
        to_output_script_with_network(&self.address, network)
    }

    /// The previous output this unspent refers to, with the script re-derived
    /// from the address under `network` rules.
    pub fn to_output(&self, network: Network) -> Result<TxOut> {
        Ok(TxOut {
            value: Amount::from_sat(self.value),
            script_pubkey: self.script_pub_key(network)?,
        })
    }
}

pub fn to_prev_outputs(unspents: &[Unspent], network: Network) -> Result<Vec<TxOut>> {
    unspents.iter().map(|u| u.to_output(network)).collect()
}

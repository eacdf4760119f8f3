//! Byte-level PSBT rewriting for networks whose transactions differ from
//! bitcoin's.
//!
//! rust-bitcoin only understands bitcoin-layout transactions and standard
//! ECDSA sighash types. On the wire the global unsigned transaction uses the
//! network's own layout and fork-id signatures carry `SIGHASH_FORKID`. The
//! in-memory [`Psbt`] holds the bitcoin layout with the FORKID bit cleared;
//! the network template keeps the fields rust-bitcoin cannot represent.

use crate::bitcoin::consensus::encode::{deserialize_partial, serialize, VarInt};
use crate::bitcoin::psbt::Psbt;
use crate::error::{Result, UtxoError};
use crate::networks::{Network, SIGHASH_FORKID};
use crate::transaction::{SerializableTransaction, UtxoTransaction};

const PSBT_MAGIC: &[u8] = b"psbt\xff";
const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;
const PSBT_IN_PARTIAL_SIG: u8 = 0x02;

type RawMap = Vec<(Vec<u8>, Vec<u8>)>;

/// Key-value maps of a PSBT: the global map, then one per input and output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawPsbt {
    maps: Vec<RawMap>,
}

fn read_item(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let (VarInt(len), consumed) = deserialize_partial::<VarInt>(&bytes[*pos..])?;
    *pos += consumed;
    let end = usize::try_from(len)
        .ok()
        .and_then(|len| pos.checked_add(len))
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| UtxoError::format("truncated PSBT"))?;
    let item = bytes[*pos..end].to_vec();
    *pos = end;
    Ok(item)
}

fn write_item(out: &mut Vec<u8>, item: &[u8]) {
    out.extend(serialize(&VarInt(item.len() as u64)));
    out.extend_from_slice(item);
}

impl RawPsbt {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if !bytes.starts_with(PSBT_MAGIC) {
            return Err(UtxoError::format("invalid PSBT magic"));
        }
        let mut pos = PSBT_MAGIC.len();
        let mut maps = vec![];
        while pos < bytes.len() {
            let mut map = vec![];
            loop {
                let key = read_item(bytes, &mut pos)?;
                if key.is_empty() {
                    break;
                }
                let value = read_item(bytes, &mut pos)?;
                map.push((key, value));
            }
            maps.push(map);
        }
        Ok(Self { maps })
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = PSBT_MAGIC.to_vec();
        for map in &self.maps {
            for (key, value) in map {
                write_item(&mut out, key);
                write_item(&mut out, value);
            }
            out.push(0x00);
        }
        out
    }

    fn unsigned_tx_mut(&mut self) -> Result<&mut Vec<u8>> {
        self.maps
            .first_mut()
            .and_then(|global| {
                global
                    .iter_mut()
                    .find(|(key, _)| key.as_slice() == [PSBT_GLOBAL_UNSIGNED_TX])
            })
            .map(|(_, value)| value)
            .ok_or_else(|| UtxoError::format("PSBT has no unsigned transaction"))
    }

    /// Apply `f` to the sighash byte of every partial signature.
    fn map_partial_sig_sighash(
        &mut self,
        input_count: usize,
        f: impl Fn(usize, u8) -> Result<u8>,
    ) -> Result<()> {
        for (input_index, map) in self.maps.iter_mut().skip(1).take(input_count).enumerate() {
            for (key, value) in map.iter_mut() {
                if key.first() != Some(&PSBT_IN_PARTIAL_SIG) {
                    continue;
                }
                if let Some(last) = value.last_mut() {
                    *last = f(input_index, *last)?;
                }
            }
        }
        Ok(())
    }
}

/// Decode a PSBT whose global transaction uses the layout of `network`.
///
/// Returns the bitcoin-layout PSBT and the network transaction it was read
/// from.
pub fn deserialize(bytes: &[u8], network: Network) -> Result<(Psbt, UtxoTransaction)> {
    let mut raw = RawPsbt::parse(bytes)?;
    let tx_bytes = raw.unsigned_tx_mut()?;
    let template = UtxoTransaction::from_bytes(tx_bytes, network)?;
    *tx_bytes = serialize(template.transaction());

    if network.fork_id().is_some() {
        let forkid = SIGHASH_FORKID as u8;
        raw.map_partial_sig_sighash(template.transaction().input.len(), |input_index, b| {
            if b & forkid == 0 {
                return Err(UtxoError::format(format!(
                    "input {}: {} signature without SIGHASH_FORKID",
                    input_index, network
                )));
            }
            Ok(b & !forkid)
        })?;
    }

    let psbt = Psbt::deserialize(&raw.encode())
        .map_err(|e| UtxoError::format(format!("invalid PSBT: {}", e)))?;
    Ok((psbt, template))
}

/// Encode `psbt` with its global transaction in the layout of `template`.
pub fn serialize_psbt(psbt: &Psbt, template: &UtxoTransaction) -> Result<Vec<u8>> {
    let mut wire = template.clone();
    *wire.transaction_mut() = psbt.unsigned_tx.clone();

    let mut raw = RawPsbt::parse(&psbt.serialize())?;
    *raw.unsigned_tx_mut()? = wire.to_bytes()?;
    if template.network.fork_id().is_some() {
        let forkid = SIGHASH_FORKID as u8;
        raw.map_partial_sig_sighash(psbt.inputs.len(), |_, b| Ok(b | forkid))?;
    }
    Ok(raw.encode())
}

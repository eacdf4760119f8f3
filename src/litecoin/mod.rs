//! Litecoin transactions with the MWEB extension flag.
//!
//! An MWEB transaction is marked by `0x00` followed by a flag byte with bit
//! `0x08` set right after the version. Bit `0x01` keeps its segwit meaning.
//! The MWEB body sits between the witnesses and the lock time and is kept
//! verbatim; the txid never commits to it.

use miniscript::bitcoin::consensus::{deserialize, serialize, Decodable, Encodable};
use miniscript::bitcoin::locktime::absolute::LockTime;
use miniscript::bitcoin::transaction::Version;
use miniscript::bitcoin::{Transaction, TxIn, TxOut, Txid, Witness};

const MWEB_FLAG: u8 = 0x08;
const WITNESS_FLAG: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LitecoinTransaction {
    pub transaction: Transaction,
    /// MWEB extension bytes, present when the wire format carried the MWEB flag.
    pub mweb: Option<Vec<u8>>,
}

impl LitecoinTransaction {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            mweb: None,
        }
    }

    pub fn txid(&self) -> Txid {
        self.transaction.compute_txid()
    }
}

fn encode_err(e: impl std::fmt::Display) -> String {
    format!("Failed to encode transaction: {}", e)
}

fn has_witness(tx: &Transaction) -> bool {
    tx.input.iter().any(|i| !i.witness.is_empty())
}

pub fn decode_litecoin_transaction(bytes: &[u8]) -> Result<LitecoinTransaction, String> {
    let is_mweb = bytes.len() > 6 && bytes[4] == 0x00 && bytes[5] & MWEB_FLAG != 0;
    if !is_mweb {
        let transaction: Transaction =
            deserialize(bytes).map_err(|e| format!("Failed to decode transaction: {}", e))?;
        return Ok(LitecoinTransaction::new(transaction));
    }

    log::debug!("decoding litecoin transaction with mweb flag {:#x}", bytes[5]);
    let flags = bytes[5];
    if flags & !(MWEB_FLAG | WITNESS_FLAG) != 0 {
        return Err(format!("Unsupported transaction flags {:#x}", flags));
    }
    if bytes.len() < 10 {
        return Err("Transaction too short".to_string());
    }

    let mut slice = &bytes[..4];
    let version =
        i32::consensus_decode(&mut slice).map_err(|e| format!("Failed to decode version: {}", e))?;

    let (body, lock_time_bytes) = bytes[6..].split_at(bytes.len() - 10);
    let mut slice = body;
    let mut input: Vec<TxIn> =
        Vec::consensus_decode(&mut slice).map_err(|e| format!("Failed to decode inputs: {}", e))?;
    let output: Vec<TxOut> = Vec::consensus_decode(&mut slice)
        .map_err(|e| format!("Failed to decode outputs: {}", e))?;
    if flags & WITNESS_FLAG != 0 {
        for txin in input.iter_mut() {
            txin.witness = Witness::consensus_decode(&mut slice)
                .map_err(|e| format!("Failed to decode witness: {}", e))?;
        }
    }
    let mweb = slice.to_vec();

    let mut slice = lock_time_bytes;
    let lock_time = LockTime::consensus_decode(&mut slice)
        .map_err(|e| format!("Failed to decode lock_time: {}", e))?;

    Ok(LitecoinTransaction {
        transaction: Transaction {
            version: Version::non_standard(version),
            input,
            output,
            lock_time,
        },
        mweb: Some(mweb),
    })
}

pub fn encode_litecoin_transaction(tx: &LitecoinTransaction) -> Result<Vec<u8>, String> {
    let Some(mweb) = &tx.mweb else {
        return Ok(serialize(&tx.transaction));
    };

    let inner = &tx.transaction;
    let segwit = has_witness(inner);
    let mut bytes = Vec::new();
    inner
        .version
        .0
        .consensus_encode(&mut bytes)
        .map_err(encode_err)?;
    bytes.push(0x00);
    bytes.push(if segwit {
        MWEB_FLAG | WITNESS_FLAG
    } else {
        MWEB_FLAG
    });
    inner
        .input
        .consensus_encode(&mut bytes)
        .map_err(encode_err)?;
    inner
        .output
        .consensus_encode(&mut bytes)
        .map_err(encode_err)?;
    if segwit {
        for txin in &inner.input {
            txin.witness
                .consensus_encode(&mut bytes)
                .map_err(encode_err)?;
        }
    }
    bytes.extend_from_slice(mweb);
    inner
        .lock_time
        .consensus_encode(&mut bytes)
        .map_err(encode_err)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNSIGNED: &str = "01000000013aa073dc10f75be76acbf18ffb76f902ebaa5aef77d4575d984774955a0c50f30000000000ffffffff0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac00000000";

    fn with_mweb_flag(flag: &str, mweb: &str) -> String {
        // version || 00 flag || vin || vout || mweb || lock_time
        format!(
            "0100000000{}{}{}00000000",
            flag,
            &UNSIGNED[8..UNSIGNED.len() - 8],
            mweb
        )
    }

    #[test]
    fn standard_transaction_round_trip() {
        let bytes = hex::decode(UNSIGNED).unwrap();
        let tx = decode_litecoin_transaction(&bytes).unwrap();
        assert!(tx.mweb.is_none());
        assert_eq!(encode_litecoin_transaction(&tx).unwrap(), bytes);
    }

    #[test]
    fn mweb_marker_is_stripped_and_restored() {
        let plain = decode_litecoin_transaction(&hex::decode(UNSIGNED).unwrap()).unwrap();
        let bytes = hex::decode(with_mweb_flag("08", "00")).unwrap();
        let tx = decode_litecoin_transaction(&bytes).unwrap();
        assert_eq!(tx.mweb, Some(vec![0x00]));
        assert_eq!(tx.transaction, plain.transaction);
        assert_eq!(tx.txid(), plain.txid());
        assert_eq!(encode_litecoin_transaction(&tx).unwrap(), bytes);
    }

    #[test]
    fn mweb_body_is_preserved() {
        let bytes = hex::decode(with_mweb_flag("08", "01deadbeef")).unwrap();
        let tx = decode_litecoin_transaction(&bytes).unwrap();
        assert_eq!(tx.mweb, Some(hex::decode("01deadbeef").unwrap()));
        assert_eq!(encode_litecoin_transaction(&tx).unwrap(), bytes);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let bytes = hex::decode(with_mweb_flag("18", "00")).unwrap();
        assert!(decode_litecoin_transaction(&bytes).is_err());
    }
}

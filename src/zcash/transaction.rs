//! Zcash transaction encoding/decoding helpers
//!
//! Zcash uses an "overwintered transaction format" which includes extra fields
//! (version_group_id, expiry_height, and shielded sections) that are not part of
//! standard Bitcoin transaction consensus encoding. Only transparent
//! transactions are supported: every shielded section must be empty.
//!
//! Layouts:
//! - v1/v2 (not overwintered): bitcoin layout
//! - v3 (Overwinter): header, vgid, vin, vout, lock_time, expiry, joinsplits
//! - v4 (Sapling): as v3 with valueBalance, spends and outputs before joinsplits
//! - v5 (NU5): header, vgid, branch id, lock_time, expiry, vin, vout,
//!   sapling spends, sapling outputs, orchard actions

use miniscript::bitcoin::consensus::{Decodable, Encodable};
use miniscript::bitcoin::locktime::absolute::LockTime;
use miniscript::bitcoin::{Transaction, TxIn, TxOut, VarInt};

use crate::error::{Result, UtxoError};
use crate::zcash::{default_branch_id_for_version, default_version_group_id};

const OVERWINTERED_FLAG: u32 = 0x8000_0000;

/// Parsed Zcash transaction fields, preserving Zcash-specific data needed for round-tripping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZcashTransactionParts {
    /// Bitcoin-compatible transaction (version without the overwintered bit)
    pub transaction: Transaction,
    /// Whether the original encoding had the overwintered bit set
    pub is_overwintered: bool,
    /// Zcash-specific: version group id (present only for overwintered transactions)
    pub version_group_id: Option<u32>,
    /// Zcash-specific: expiry height (present only for overwintered transactions)
    pub expiry_height: Option<u32>,
    /// Consensus branch id committed to by signature hashes. Encoded on the
    /// wire only by v5 transactions.
    pub consensus_branch_id: u32,
}

fn format_err(what: &str, e: impl std::fmt::Display) -> UtxoError {
    UtxoError::format(format!("Failed to decode {}: {}", what, e))
}

fn encode_err(what: &str, e: impl std::fmt::Display) -> UtxoError {
    UtxoError::format(format!("Failed to encode {}: {}", what, e))
}

fn read_u32(slice: &mut &[u8], what: &str) -> Result<u32> {
    u32::consensus_decode(slice).map_err(|e| format_err(what, e))
}

fn read_empty_vec(slice: &mut &[u8], what: &str) -> Result<()> {
    let len = VarInt::consensus_decode(slice).map_err(|e| format_err(what, e))?;
    if len.0 != 0 {
        return Err(UtxoError::unsupported(format!("{} not supported", what)));
    }
    Ok(())
}

impl ZcashTransactionParts {
    /// A transparent transaction of `version`, with defaults for the
    /// overwinter fields.
    pub fn new(transaction: Transaction) -> Result<Self> {
        let version = version_u32(&transaction)?;
        let is_overwintered = version >= 3;
        let consensus_branch_id = default_branch_id_for_version(version).ok_or_else(|| {
            UtxoError::configuration(format!("unsupported zcash version {}", version))
        })?;
        Ok(Self {
            transaction,
            is_overwintered,
            version_group_id: if is_overwintered {
                default_version_group_id(version)
            } else {
                None
            },
            expiry_height: if is_overwintered { Some(0) } else { None },
            consensus_branch_id,
        })
    }

    pub fn version(&self) -> Result<u32> {
        version_u32(&self.transaction)
    }

    /// The `header` field: version with the overwintered bit.
    pub fn header(&self) -> Result<u32> {
        let version = self.version()?;
        Ok(if self.is_overwintered {
            version | OVERWINTERED_FLAG
        } else {
            version
        })
    }

    pub fn is_overwinter_compatible(&self) -> bool {
        self.is_overwintered && self.transaction.version.0 >= 3
    }

    pub fn is_sapling_compatible(&self) -> bool {
        self.is_overwintered && self.transaction.version.0 >= 4
    }

    pub fn is_nu5(&self) -> bool {
        self.is_overwintered && self.transaction.version.0 >= 5
    }

    fn supports_join_splits(&self) -> bool {
        self.is_overwintered && self.transaction.version.0 >= 2
    }

    pub fn byte_length(&self) -> Result<usize> {
        encode_zcash_transaction_parts(self).map(|b| b.len())
    }
}

fn version_u32(tx: &Transaction) -> Result<u32> {
    u32::try_from(tx.version.0)
        .map_err(|_| UtxoError::format(format!("Invalid tx version (negative): {}", tx.version.0)))
}

/// Decode a Zcash transaction, extracting Zcash-specific fields.
pub fn decode_zcash_transaction_parts(bytes: &[u8]) -> Result<ZcashTransactionParts> {
    let mut slice = bytes;

    let header = read_u32(&mut slice, "version")?;
    let is_overwintered = (header & OVERWINTERED_FLAG) != 0;
    let version = header & !OVERWINTERED_FLAG;

    let version_group_id = if is_overwintered && version >= 3 {
        Some(read_u32(&mut slice, "version_group_id")?)
    } else {
        None
    };

    let mut parts = if is_overwintered && version >= 5 {
        let consensus_branch_id = read_u32(&mut slice, "consensus_branch_id")?;
        let lock_time =
            LockTime::consensus_decode(&mut slice).map_err(|e| format_err("lock_time", e))?;
        let expiry_height = read_u32(&mut slice, "expiry_height")?;
        let input: Vec<TxIn> =
            Vec::consensus_decode(&mut slice).map_err(|e| format_err("inputs", e))?;
        let output: Vec<TxOut> =
            Vec::consensus_decode(&mut slice).map_err(|e| format_err("outputs", e))?;
        read_empty_vec(&mut slice, "sapling spends")?;
        read_empty_vec(&mut slice, "sapling outputs")?;
        read_empty_vec(&mut slice, "orchard actions")?;
        ZcashTransactionParts {
            transaction: Transaction {
                version: miniscript::bitcoin::transaction::Version::non_standard(version as i32),
                input,
                output,
                lock_time,
            },
            is_overwintered,
            version_group_id,
            expiry_height: Some(expiry_height),
            consensus_branch_id,
        }
    } else {
        let input: Vec<TxIn> =
            Vec::consensus_decode(&mut slice).map_err(|e| format_err("inputs", e))?;
        let output: Vec<TxOut> =
            Vec::consensus_decode(&mut slice).map_err(|e| format_err("outputs", e))?;
        let lock_time =
            LockTime::consensus_decode(&mut slice).map_err(|e| format_err("lock_time", e))?;
        let expiry_height = if is_overwintered && version >= 3 {
            Some(read_u32(&mut slice, "expiry_height")?)
        } else {
            None
        };
        let consensus_branch_id = default_branch_id_for_version(version).ok_or_else(|| {
            UtxoError::unsupported(format!("unsupported zcash version {}", version))
        })?;
        ZcashTransactionParts {
            transaction: Transaction {
                version: miniscript::bitcoin::transaction::Version::non_standard(version as i32),
                input,
                output,
                lock_time,
            },
            is_overwintered,
            version_group_id,
            expiry_height,
            consensus_branch_id,
        }
    };

    if parts.is_sapling_compatible() && !parts.is_nu5() {
        let value_balance =
            i64::consensus_decode(&mut slice).map_err(|e| format_err("valueBalance", e))?;
        if value_balance != 0 {
            return Err(UtxoError::unsupported("unsupported valueBalance"));
        }
        read_empty_vec(&mut slice, "shielded spend")?;
        read_empty_vec(&mut slice, "shielded output")?;
    }
    if parts.supports_join_splits() && !parts.is_nu5() {
        read_empty_vec(&mut slice, "joinSplits")?;
    }

    if !slice.is_empty() {
        return Err(UtxoError::format(
            "Unexpected trailing bytes after Zcash transaction",
        ));
    }

    if !parts.is_overwintered {
        parts.version_group_id = None;
    }
    Ok(parts)
}

/// Encode a Zcash transaction back to bytes, including Zcash-specific fields.
pub fn encode_zcash_transaction_parts(parts: &ZcashTransactionParts) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let tx = &parts.transaction;

    parts
        .header()?
        .consensus_encode(&mut bytes)
        .map_err(|e| encode_err("version", e))?;

    let (version_group_id, expiry_height) = if parts.is_overwinter_compatible() {
        (
            parts
                .version_group_id
                .ok_or_else(|| UtxoError::format("Missing version_group_id for overwintered tx"))?,
            parts
                .expiry_height
                .ok_or_else(|| UtxoError::format("Missing expiry_height for overwintered tx"))?,
        )
    } else {
        if parts.version_group_id.is_some() || parts.expiry_height.is_some() {
            return Err(UtxoError::format(
                "Non-overwintered tx must not have version_group_id or expiry_height",
            ));
        }
        (0, 0)
    };

    if parts.is_overwinter_compatible() {
        version_group_id
            .consensus_encode(&mut bytes)
            .map_err(|e| encode_err("version_group_id", e))?;
    }

    if parts.is_nu5() {
        parts
            .consensus_branch_id
            .consensus_encode(&mut bytes)
            .map_err(|e| encode_err("consensus_branch_id", e))?;
        tx.lock_time
            .consensus_encode(&mut bytes)
            .map_err(|e| encode_err("lock_time", e))?;
        expiry_height
            .consensus_encode(&mut bytes)
            .map_err(|e| encode_err("expiry_height", e))?;
        tx.input
            .consensus_encode(&mut bytes)
            .map_err(|e| encode_err("inputs", e))?;
        tx.output
            .consensus_encode(&mut bytes)
            .map_err(|e| encode_err("outputs", e))?;
        // sapling spends, sapling outputs, orchard actions
        bytes.extend_from_slice(&[0, 0, 0]);
        return Ok(bytes);
    }

    tx.input
        .consensus_encode(&mut bytes)
        .map_err(|e| encode_err("inputs", e))?;
    tx.output
        .consensus_encode(&mut bytes)
        .map_err(|e| encode_err("outputs", e))?;
    tx.lock_time
        .consensus_encode(&mut bytes)
        .map_err(|e| encode_err("lock_time", e))?;
    if parts.is_overwinter_compatible() {
        expiry_height
            .consensus_encode(&mut bytes)
            .map_err(|e| encode_err("expiry_height", e))?;
    }
    if parts.is_sapling_compatible() {
        // valueBalance, vShieldedSpend, vShieldedOutput
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&[0, 0]);
    }
    if parts.supports_join_splits() {
        bytes.push(0);
    }
    Ok(bytes)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use rstest::rstest;

    const INPUT: &str = "013aa073dc10f75be76acbf18ffb76f902ebaa5aef77d4575d984774955a0c50f30000000000ffffffff";
    const OUTPUT: &str = "0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac";

    /// Transparent v4 transaction with one input and one output.
    pub fn v4_hex() -> String {
        format!(
            "0400008085202f89{}{}{}{}{}",
            INPUT, OUTPUT, "00000000", "a0860100", "00000000000000000000"
        ) + "00"
    }

    /// Overwinter v3 transaction with one input and one output.
    pub fn v3_hex() -> String {
        format!(
            "030000807082c403{}{}{}{}",
            INPUT, OUTPUT, "00000000", "a0860100"
        ) + "00"
    }

    /// Transparent v5 transaction with one input and one output.
    pub fn v5_hex() -> String {
        format!(
            "050000800a27a726b4d0d6c2{}{}{}{}000000",
            "00000000", "a0860100", INPUT, OUTPUT
        )
    }

    #[test]
    fn v4_round_trip() {
        let bytes = hex::decode(v4_hex()).unwrap();
        let parts = decode_zcash_transaction_parts(&bytes).unwrap();
        assert!(parts.is_overwintered);
        assert!(parts.is_sapling_compatible());
        assert!(!parts.is_nu5());
        assert_eq!(parts.transaction.version.0, 4);
        assert_eq!(parts.version_group_id, Some(0x892F2085));
        assert_eq!(parts.expiry_height, Some(100_000));
        assert_eq!(parts.consensus_branch_id, 0xe9ff75a6);
        assert_eq!(encode_zcash_transaction_parts(&parts).unwrap(), bytes);
        assert_eq!(parts.byte_length().unwrap(), bytes.len());
    }

    #[test]
    fn v5_round_trip() {
        let bytes = hex::decode(v5_hex()).unwrap();
        let parts = decode_zcash_transaction_parts(&bytes).unwrap();
        assert!(parts.is_nu5());
        assert_eq!(parts.version_group_id, Some(0x26A7270A));
        assert_eq!(parts.consensus_branch_id, 0xc2d6d0b4);
        assert_eq!(parts.transaction.input.len(), 1);
        assert_eq!(parts.transaction.output.len(), 1);
        assert_eq!(encode_zcash_transaction_parts(&parts).unwrap(), bytes);
    }

    #[test]
    fn non_overwintered_round_trip() {
        let hex = format!("01000000{}{}00000000", INPUT, OUTPUT);
        let bytes = hex::decode(hex).unwrap();
        let parts = decode_zcash_transaction_parts(&bytes).unwrap();
        assert!(!parts.is_overwintered);
        assert_eq!(parts.version_group_id, None);
        assert_eq!(parts.consensus_branch_id, 0);
        assert_eq!(encode_zcash_transaction_parts(&parts).unwrap(), bytes);
    }

    #[rstest]
    // non-zero valueBalance
    #[case(format!("0400008085202f89{}{}00000000a08601000100000000000000000000", INPUT, OUTPUT))]
    // one shielded spend
    #[case(format!("0400008085202f89{}{}00000000a08601000000000000000000010000", INPUT, OUTPUT))]
    // one shielded output
    #[case(format!("0400008085202f89{}{}00000000a08601000000000000000000000100", INPUT, OUTPUT))]
    // joinsplits
    #[case(format!("0400008085202f89{}{}00000000a08601000000000000000000000001", INPUT, OUTPUT))]
    // orchard actions
    #[case(format!("050000800a27a726b4d0d6c200000000a0860100{}{}000001", INPUT, OUTPUT))]
    fn rejects_shielded_data(#[case] hex: String) {
        let bytes = hex::decode(hex).unwrap();
        assert!(matches!(
            decode_zcash_transaction_parts(&bytes),
            Err(UtxoError::UnsupportedTransaction(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = hex::decode(v4_hex()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_zcash_transaction_parts(&bytes),
            Err(UtxoError::Format(_))
        ));
    }

    #[test]
    fn new_uses_version_defaults() {
        let bytes = hex::decode(v4_hex()).unwrap();
        let parsed = decode_zcash_transaction_parts(&bytes).unwrap();
        let mut fresh = ZcashTransactionParts::new(parsed.transaction.clone()).unwrap();
        fresh.expiry_height = Some(100_000);
        assert_eq!(fresh, parsed);
    }
}

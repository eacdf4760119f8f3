//! Dash transaction encoding/decoding helpers
//!
//! Dash "special transactions" encode an extra `type` in the transaction version and append an
//! extra payload after the lock_time:
//! - version: u32 where low 16 bits are the base version and high 16 bits are the special tx type
//! - if type != 0: varint payload_size + payload bytes

use miniscript::bitcoin::consensus::{Decodable, Encodable};
use miniscript::bitcoin::{Transaction, TxIn, TxOut, VarInt};

/// Parsed Dash transaction fields needed for round-tripping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashTransactionParts {
    /// Bitcoin-compatible transaction (version without the Dash type bits)
    pub transaction: Transaction,
    /// Dash-specific special transaction type (0 = standard transaction)
    pub tx_type: u16,
    /// Extra payload for special transactions (empty when tx_type == 0)
    pub extra_payload: Vec<u8>,
}

fn version_i32_to_u16(version: i32) -> Result<u16, String> {
    let v = u32::try_from(version)
        .map_err(|_| format!("Invalid tx version (negative): {}", version))?;
    u16::try_from(v).map_err(|_| format!("Invalid base version: {}", v))
}

impl DashTransactionParts {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            tx_type: 0,
            extra_payload: Vec::new(),
        }
    }

    /// The version field as it appears on the wire.
    pub fn wire_version(&self) -> Result<u32, String> {
        let base = version_i32_to_u16(self.transaction.version.0)?;
        Ok(u32::from(base) | (u32::from(self.tx_type) << 16))
    }

    /// Bytes that follow the lock time: `varint(len) || payload` for special
    /// transactions, nothing otherwise.
    pub fn payload_trailer(&self) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::new();
        if self.tx_type != 0 {
            VarInt(self.extra_payload.len() as u64)
                .consensus_encode(&mut bytes)
                .map_err(|e| format!("Failed to encode extra_payload size: {}", e))?;
            bytes.extend_from_slice(&self.extra_payload);
        } else if !self.extra_payload.is_empty() {
            return Err("tx_type=0 must not have extra_payload".to_string());
        }
        Ok(bytes)
    }

    pub fn byte_length(&self) -> Result<usize, String> {
        encode_dash_transaction_parts(self).map(|b| b.len())
    }
}

/// Decode a Dash transaction, extracting the special tx type and extra payload (if present).
pub fn decode_dash_transaction_parts(bytes: &[u8]) -> Result<DashTransactionParts, String> {
    let mut slice = bytes;

    // Dash encodes tx_type in the high 16 bits of the version.
    let version_u32 = u32::consensus_decode(&mut slice)
        .map_err(|e| format!("Failed to decode version: {}", e))?;
    let base_version = (version_u32 & 0xFFFF) as i32;
    let tx_type = ((version_u32 >> 16) & 0xFFFF) as u16;

    let inputs: Vec<TxIn> =
        Vec::consensus_decode(&mut slice).map_err(|e| format!("Failed to decode inputs: {}", e))?;
    let outputs: Vec<TxOut> = Vec::consensus_decode(&mut slice)
        .map_err(|e| format!("Failed to decode outputs: {}", e))?;
    let lock_time = miniscript::bitcoin::locktime::absolute::LockTime::consensus_decode(&mut slice)
        .map_err(|e| format!("Failed to decode lock_time: {}", e))?;

    let (extra_payload, remaining) = if tx_type != 0 {
        let payload_len: VarInt = Decodable::consensus_decode(&mut slice)
            .map_err(|e| format!("Failed to decode extra_payload size: {}", e))?;
        let payload_len = payload_len.0 as usize;
        if slice.len() < payload_len {
            return Err("extra_payload size exceeds remaining bytes".to_string());
        }
        (slice[..payload_len].to_vec(), &slice[payload_len..])
    } else {
        (Vec::new(), slice)
    };

    if !remaining.is_empty() {
        return Err("Unexpected trailing bytes after Dash transaction".to_string());
    }

    Ok(DashTransactionParts {
        transaction: Transaction {
            version: miniscript::bitcoin::transaction::Version::non_standard(base_version),
            input: inputs,
            output: outputs,
            lock_time,
        },
        tx_type,
        extra_payload,
    })
}

/// Encode a Dash transaction back to bytes, including tx_type and extra payload.
pub fn encode_dash_transaction_parts(parts: &DashTransactionParts) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();

    parts
        .wire_version()?
        .consensus_encode(&mut bytes)
        .map_err(|e| format!("Failed to encode version: {}", e))?;
    parts
        .transaction
        .input
        .consensus_encode(&mut bytes)
        .map_err(|e| format!("Failed to encode inputs: {}", e))?;
    parts
        .transaction
        .output
        .consensus_encode(&mut bytes)
        .map_err(|e| format!("Failed to encode outputs: {}", e))?;
    parts
        .transaction
        .lock_time
        .consensus_encode(&mut bytes)
        .map_err(|e| format!("Failed to encode lock_time: {}", e))?;
    bytes.extend_from_slice(&parts.payload_trailer()?);

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    // version 3, type 5 (coinbase payload), no inputs, no outputs
    const SPECIAL_TX: &str = "030005000000000000000401020304";
    // version 2, one input, one output
    const STANDARD_TX: &str = "0200000001f3500c5a957447985d57d477ef5aaaeb02f976fb8ff1cb6ae75bf710dc73a03a0000000000ffffffff0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac00000000";

    #[test]
    fn special_transaction_round_trip() {
        let bytes = hex::decode(SPECIAL_TX).unwrap();
        let parts = decode_dash_transaction_parts(&bytes).unwrap();
        assert_eq!(parts.tx_type, 5);
        assert_eq!(parts.transaction.version.0, 3);
        assert_eq!(parts.extra_payload, vec![1, 2, 3, 4]);
        assert_eq!(parts.wire_version().unwrap(), 0x0005_0003);
        assert_eq!(encode_dash_transaction_parts(&parts).unwrap(), bytes);
        assert_eq!(parts.byte_length().unwrap(), bytes.len());
    }

    #[test]
    fn standard_transaction_round_trip() {
        let bytes = hex::decode(STANDARD_TX).unwrap();
        let parts = decode_dash_transaction_parts(&bytes).unwrap();
        assert_eq!(parts.tx_type, 0);
        assert!(parts.extra_payload.is_empty());
        assert_eq!(encode_dash_transaction_parts(&parts).unwrap(), bytes);
        assert_eq!(parts.byte_length().unwrap(), bytes.len());
    }

    #[test]
    fn rejects_trailing_and_truncated_payload() {
        let mut bytes = hex::decode(STANDARD_TX).unwrap();
        bytes.push(0);
        assert!(decode_dash_transaction_parts(&bytes).is_err());

        let bytes = hex::decode("0300050000000000000005010203").unwrap();
        assert!(decode_dash_transaction_parts(&bytes).is_err());
    }

    #[test]
    fn rejects_payload_without_type() {
        let bytes = hex::decode(STANDARD_TX).unwrap();
        let mut parts = decode_dash_transaction_parts(&bytes).unwrap();
        parts.extra_payload = vec![1];
        assert!(encode_dash_transaction_parts(&parts).is_err());
    }
}

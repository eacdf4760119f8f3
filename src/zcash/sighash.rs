//! Zcash signature hashes for transparent inputs.
//!
//! Sapling (v4) inputs are hashed by `Psbt::sighash_zcash` from the miniscript
//! fork. This module covers the transcripts it does not:
//!
//! - v3: ZIP-143, personalised with `ZcashSigHash || branch_id`
//! - v5: ZIP-244 digest tree, personalised with `ZcashTxHash_ || branch_id`

use miniscript::bitcoin::hashes::Hash;
use miniscript::bitcoin::{Script, TxOut};

use crate::error::{Result, UtxoError};
use crate::transaction::sighash::write_var_slice;
use crate::zcash::transaction::ZcashTransactionParts;

const SIGHASH_NONE: u32 = 0x02;
const SIGHASH_SINGLE: u32 = 0x03;
const SIGHASH_ANYONECANPAY: u32 = 0x80;

fn blake2b_256(personal: &[u8], data: &[u8]) -> [u8; 32] {
    let hash = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(personal)
        .hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

fn personalization(prefix: &[u8; 12], branch_id: u32) -> [u8; 16] {
    let mut p = [0u8; 16];
    p[..12].copy_from_slice(prefix);
    p[12..].copy_from_slice(&branch_id.to_le_bytes());
    p
}

fn write_script(buf: &mut Vec<u8>, script: &Script) {
    write_var_slice(buf, script.as_bytes());
}

fn serialize_outpoints(parts: &ZcashTransactionParts) -> Vec<u8> {
    let mut buf = Vec::with_capacity(36 * parts.transaction.input.len());
    for input in &parts.transaction.input {
        buf.extend_from_slice(input.previous_output.txid.as_byte_array());
        buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
    }
    buf
}

fn serialize_sequences(parts: &ZcashTransactionParts) -> Vec<u8> {
    parts
        .transaction
        .input
        .iter()
        .flat_map(|i| i.sequence.0.to_le_bytes())
        .collect()
}

fn serialize_outputs<'a>(outputs: impl IntoIterator<Item = &'a TxOut>) -> Vec<u8> {
    let mut buf = Vec::new();
    for output in outputs {
        buf.extend_from_slice(&output.value.to_sat().to_le_bytes());
        write_script(&mut buf, &output.script_pubkey);
    }
    buf
}

fn check_input_index(parts: &ZcashTransactionParts, input_index: usize) -> Result<()> {
    if input_index >= parts.transaction.input.len() {
        return Err(UtxoError::signing(input_index, "Input index is out of range"));
    }
    Ok(())
}

/// ZIP-143 signature hash of an Overwinter (v3) input.
///
/// `SIGHASH_SINGLE` without a matching output commits to a zero outputs hash.
pub fn signature_hash_v3(
    parts: &ZcashTransactionParts,
    input_index: usize,
    script_code: &Script,
    value: u64,
    hash_type: u32,
) -> Result<[u8; 32]> {
    check_input_index(parts, input_index)?;
    if parts.transaction.version.0 != 3 {
        return Err(UtxoError::unsupported(format!(
            "ZIP-143 signature hash of zcash version {}",
            parts.transaction.version.0
        )));
    }
    let tx = &parts.transaction;
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
    let zero = [0u8; 32];

    let hash_prevouts = if !anyone_can_pay {
        blake2b_256(b"ZcashPrevoutHash", &serialize_outpoints(parts))
    } else {
        zero
    };
    let hash_sequence =
        if !anyone_can_pay && base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
            blake2b_256(b"ZcashSequencHash", &serialize_sequences(parts))
        } else {
            zero
        };
    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        blake2b_256(b"ZcashOutputsHash", &serialize_outputs(&tx.output))
    } else if base_type == SIGHASH_SINGLE && input_index < tx.output.len() {
        blake2b_256(
            b"ZcashOutputsHash",
            &serialize_outputs(std::iter::once(&tx.output[input_index])),
        )
    } else {
        zero
    };

    let mut buf = Vec::new();
    buf.extend_from_slice(&parts.header()?.to_le_bytes());
    buf.extend_from_slice(&parts.version_group_id.unwrap_or(0).to_le_bytes());
    buf.extend_from_slice(&hash_prevouts);
    buf.extend_from_slice(&hash_sequence);
    buf.extend_from_slice(&hash_outputs);
    // hashJoinSplits
    buf.extend_from_slice(&zero);
    buf.extend_from_slice(&tx.lock_time.to_consensus_u32().to_le_bytes());
    buf.extend_from_slice(&parts.expiry_height.unwrap_or(0).to_le_bytes());
    buf.extend_from_slice(&hash_type.to_le_bytes());

    let input = &tx.input[input_index];
    buf.extend_from_slice(input.previous_output.txid.as_byte_array());
    buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
    write_script(&mut buf, script_code);
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&input.sequence.0.to_le_bytes());

    Ok(blake2b_256(
        &personalization(b"ZcashSigHash", parts.consensus_branch_id),
        &buf,
    ))
}

fn header_digest(parts: &ZcashTransactionParts) -> Result<[u8; 32]> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&parts.header()?.to_le_bytes());
    buf.extend_from_slice(&parts.version_group_id.unwrap_or(0).to_le_bytes());
    buf.extend_from_slice(&parts.consensus_branch_id.to_le_bytes());
    buf.extend_from_slice(&parts.transaction.lock_time.to_consensus_u32().to_le_bytes());
    buf.extend_from_slice(&parts.expiry_height.unwrap_or(0).to_le_bytes());
    Ok(blake2b_256(b"ZTxIdHeadersHash", &buf))
}

fn empty_bundle_digests() -> ([u8; 32], [u8; 32]) {
    (
        blake2b_256(b"ZTxIdSaplingHash", &[]),
        blake2b_256(b"ZTxIdOrchardHash", &[]),
    )
}

fn v5_digest(
    parts: &ZcashTransactionParts,
    header: [u8; 32],
    transparent: [u8; 32],
) -> [u8; 32] {
    let (sapling, orchard) = empty_bundle_digests();
    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&transparent);
    buf.extend_from_slice(&sapling);
    buf.extend_from_slice(&orchard);
    blake2b_256(
        &personalization(b"ZcashTxHash_", parts.consensus_branch_id),
        &buf,
    )
}

/// ZIP-244 transaction id digest of a v5 transaction.
pub fn txid_digest_v5(parts: &ZcashTransactionParts) -> Result<[u8; 32]> {
    let tx = &parts.transaction;
    let transparent = if tx.input.is_empty() && tx.output.is_empty() {
        blake2b_256(b"ZTxIdTranspaHash", &[])
    } else {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&blake2b_256(b"ZTxIdPrevoutHash", &serialize_outpoints(parts)));
        buf.extend_from_slice(&blake2b_256(b"ZTxIdSequencHash", &serialize_sequences(parts)));
        buf.extend_from_slice(&blake2b_256(
            b"ZTxIdOutputsHash",
            &serialize_outputs(&tx.output),
        ));
        blake2b_256(b"ZTxIdTranspaHash", &buf)
    };
    Ok(v5_digest(parts, header_digest(parts)?, transparent))
}

/// ZIP-244 signature hash for the transparent input `input_index`.
///
/// Commits to the amount and scriptPubKey of every spent output.
pub fn signature_hash_v5(
    parts: &ZcashTransactionParts,
    input_index: usize,
    prevouts: &[TxOut],
    hash_type: u32,
) -> Result<[u8; 32]> {
    check_input_index(parts, input_index)?;
    let tx = &parts.transaction;
    if prevouts.len() != tx.input.len() {
        return Err(UtxoError::consistency(format!(
            "expected {} prevouts, got {}",
            tx.input.len(),
            prevouts.len()
        )));
    }
    if !matches!(hash_type, 0x01 | 0x02 | 0x03 | 0x81 | 0x82 | 0x83) {
        return Err(UtxoError::signing(
            input_index,
            format!("invalid sighash type {:#x}", hash_type),
        ));
    }
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;

    let (prevouts_digest, amounts_digest, scripts_digest, sequence_digest) = if anyone_can_pay {
        (
            blake2b_256(b"ZTxIdPrevoutHash", &[]),
            blake2b_256(b"ZTxTrAmountsHash", &[]),
            blake2b_256(b"ZTxTrScriptsHash", &[]),
            blake2b_256(b"ZTxIdSequencHash", &[]),
        )
    } else {
        let amounts: Vec<u8> = prevouts
            .iter()
            .flat_map(|p| p.value.to_sat().to_le_bytes())
            .collect();
        let mut scripts = Vec::new();
        for p in prevouts {
            write_script(&mut scripts, &p.script_pubkey);
        }
        (
            blake2b_256(b"ZTxIdPrevoutHash", &serialize_outpoints(parts)),
            blake2b_256(b"ZTxTrAmountsHash", &amounts),
            blake2b_256(b"ZTxTrScriptsHash", &scripts),
            blake2b_256(b"ZTxIdSequencHash", &serialize_sequences(parts)),
        )
    };

    let outputs_digest = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        blake2b_256(b"ZTxIdOutputsHash", &serialize_outputs(&tx.output))
    } else if base_type == SIGHASH_SINGLE && input_index < tx.output.len() {
        blake2b_256(
            b"ZTxIdOutputsHash",
            &serialize_outputs(std::iter::once(&tx.output[input_index])),
        )
    } else {
        blake2b_256(b"ZTxIdOutputsHash", &[])
    };

    let input = &tx.input[input_index];
    let prevout = &prevouts[input_index];
    let mut txin = Vec::new();
    txin.extend_from_slice(input.previous_output.txid.as_byte_array());
    txin.extend_from_slice(&input.previous_output.vout.to_le_bytes());
    txin.extend_from_slice(&prevout.value.to_sat().to_le_bytes());
    write_script(&mut txin, &prevout.script_pubkey);
    txin.extend_from_slice(&input.sequence.0.to_le_bytes());
    let txin_digest = blake2b_256(b"Zcash___TxInHash", &txin);

    let mut buf = Vec::with_capacity(1 + 32 * 6);
    buf.push(hash_type as u8);
    buf.extend_from_slice(&prevouts_digest);
    buf.extend_from_slice(&amounts_digest);
    buf.extend_from_slice(&scripts_digest);
    buf.extend_from_slice(&sequence_digest);
    buf.extend_from_slice(&outputs_digest);
    buf.extend_from_slice(&txin_digest);
    let transparent = blake2b_256(b"ZTxIdTranspaHash", &buf);

    Ok(v5_digest(parts, header_digest(parts)?, transparent))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bitcoin::{Amount, ScriptBuf};
    use crate::zcash::transaction::decode_zcash_transaction_parts;
    use crate::zcash::transaction::tests::{v3_hex, v4_hex, v5_hex};

    const REDEEM_SCRIPT: &str = "52210263c23e18172e1367e9a8fbcd414d7ee38f9c1d4557febd7b59560eea34fe9afa2103fb0952a682cdf71936fd62ba42ea493f3d53e0c0064c7c8697df02adf78d9d2221039fd154eab712d38200f30a28ab39a876b82ebc6f575d72498c21991c7bce039253ae";

    pub(crate) fn redeem_script() -> ScriptBuf {
        ScriptBuf::from_hex(REDEEM_SCRIPT).unwrap()
    }

    pub(crate) fn prevout() -> TxOut {
        TxOut {
            value: Amount::from_sat(100_000_000),
            script_pubkey: redeem_script().to_p2sh(),
        }
    }

    #[test]
    fn empty_bundle_digest_constants() {
        let (sapling, _) = empty_bundle_digests();
        assert_eq!(
            hex::encode(sapling),
            "6f2fc8f98feafd94e74a0df4bed74391ee0b5a69945e4ced8ca8a095206f00ae"
        );
    }

    #[test]
    fn v3_sighash_depends_on_branch_id() {
        let mut parts = decode_zcash_transaction_parts(&hex::decode(v3_hex()).unwrap()).unwrap();
        let overwinter = signature_hash_v3(&parts, 0, &redeem_script(), 100_000_000, 1).unwrap();
        parts.consensus_branch_id = 0x76b809bb;
        let sapling = signature_hash_v3(&parts, 0, &redeem_script(), 100_000_000, 1).unwrap();
        assert_ne!(overwinter, sapling);
        assert_ne!(
            signature_hash_v3(&parts, 0, &redeem_script(), 100_000_000, 0x81).unwrap(),
            sapling
        );
        assert!(signature_hash_v3(&parts, 1, &redeem_script(), 100_000_000, 1).is_err());

        let v4 = decode_zcash_transaction_parts(&hex::decode(v4_hex()).unwrap()).unwrap();
        assert!(matches!(
            signature_hash_v3(&v4, 0, &redeem_script(), 100_000_000, 1),
            Err(UtxoError::UnsupportedTransaction(_))
        ));
    }

    #[test]
    fn v5_rejects_bad_hash_type_and_missing_prevouts() {
        let parts = decode_zcash_transaction_parts(&hex::decode(v5_hex()).unwrap()).unwrap();
        assert!(signature_hash_v5(&parts, 0, &[prevout()], 0x41).is_err());
        assert!(signature_hash_v5(&parts, 0, &[], 0x01).is_err());
        assert!(signature_hash_v5(&parts, 1, &[prevout()], 0x01).is_err());
    }

    /// Hashes computed by zebra-chain, which wraps librustzcash.
    #[cfg(not(target_arch = "wasm32"))]
    pub(crate) mod parity_with_zebra_chain {
        use super::*;
        use std::sync::Arc;
        use zebra_chain::amount::{Amount as ZebraAmount, NonNegative};
        use zebra_chain::parameters::NetworkUpgrade as ZebraNetworkUpgrade;
        use zebra_chain::serialization::ZcashDeserializeInto;
        use zebra_chain::transaction::{HashType, Transaction as ZebraTransaction};
        use zebra_chain::transparent;

        pub(crate) fn zebra_sighash(
            tx_hex: &str,
            upgrade: ZebraNetworkUpgrade,
            hash_type: HashType,
        ) -> [u8; 32] {
            let bytes = hex::decode(tx_hex).unwrap();
            let tx: ZebraTransaction = bytes.as_slice().zcash_deserialize_into().unwrap();
            let spent = prevout();
            let outputs = Arc::new(vec![transparent::Output {
                value: ZebraAmount::<NonNegative>::try_from(spent.value.to_sat()).unwrap(),
                lock_script: transparent::Script::new(spent.script_pubkey.as_bytes()),
            }]);
            tx.sighash(
                upgrade,
                hash_type,
                outputs,
                Some((0, redeem_script().to_bytes())),
            )
            .unwrap()
            .0
        }

        #[test]
        fn v5_sighash_matches_zebra() {
            let parts = decode_zcash_transaction_parts(&hex::decode(v5_hex()).unwrap()).unwrap();
            assert_eq!(
                signature_hash_v5(&parts, 0, &[prevout()], 0x01).unwrap(),
                zebra_sighash(&v5_hex(), ZebraNetworkUpgrade::Nu5, HashType::ALL)
            );
            assert_eq!(
                signature_hash_v5(&parts, 0, &[prevout()], 0x81).unwrap(),
                zebra_sighash(
                    &v5_hex(),
                    ZebraNetworkUpgrade::Nu5,
                    HashType::ALL | HashType::ANYONECANPAY
                )
            );
            assert_eq!(
                signature_hash_v5(&parts, 0, &[prevout()], 0x03).unwrap(),
                zebra_sighash(&v5_hex(), ZebraNetworkUpgrade::Nu5, HashType::SINGLE)
            );
        }

        #[test]
        fn v5_txid_matches_zebra() {
            let bytes = hex::decode(v5_hex()).unwrap();
            let parts = decode_zcash_transaction_parts(&bytes).unwrap();
            let tx: ZebraTransaction = bytes.as_slice().zcash_deserialize_into().unwrap();
            assert_eq!(txid_digest_v5(&parts).unwrap(), tx.hash().0);
        }
    }
}

//! ECDSA signature hash transcripts shared by the bitcoin-like networks.
//!
//! Both functions take the raw wire version so that networks which pack extra
//! data into the version field (Dash) hash what they serialize.

use crate::bitcoin::hashes::{sha256d, Hash};
use crate::bitcoin::{Script, TxIn, TxOut};

pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// The digest returned for `SIGHASH_SINGLE` without a matching output, and
/// for an out of range input index.
pub const SIGHASH_ONE: [u8; 32] = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

pub(crate) fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

pub(crate) fn write_var_slice(buf: &mut Vec<u8>, data: &[u8]) {
    write_compact_size(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

fn write_outpoint(buf: &mut Vec<u8>, input: &TxIn) {
    buf.extend_from_slice(input.previous_output.txid.as_byte_array());
    buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
}

fn write_output(buf: &mut Vec<u8>, output: &TxOut) {
    buf.extend_from_slice(&output.value.to_sat().to_le_bytes());
    write_var_slice(buf, output.script_pubkey.as_bytes());
}

/// Fields of a transaction that the transcripts commit to.
#[derive(Debug, Clone, Copy)]
pub struct SighashFields<'a> {
    pub version: u32,
    pub input: &'a [TxIn],
    pub output: &'a [TxOut],
    pub lock_time: u32,
    /// Serialized after the lock time in the legacy transcript.
    pub trailer: &'a [u8],
}

/// Pre-segwit signature hash.
///
/// Reproduces the `SIGHASH_SINGLE` bug: signing an input without a matching
/// output returns [`SIGHASH_ONE`] instead of failing.
pub fn legacy_signature_hash(
    fields: &SighashFields,
    input_index: usize,
    script_code: &Script,
    sighash_type: u32,
) -> [u8; 32] {
    let base_type = sighash_type & 0x1f;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;

    if input_index >= fields.input.len() {
        return SIGHASH_ONE;
    }
    if base_type == SIGHASH_SINGLE && input_index >= fields.output.len() {
        return SIGHASH_ONE;
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(&fields.version.to_le_bytes());

    let write_input = |buf: &mut Vec<u8>, i: usize, input: &TxIn| {
        write_outpoint(buf, input);
        if i == input_index {
            write_var_slice(buf, script_code.as_bytes());
        } else {
            write_compact_size(buf, 0);
        }
        let sequence = if i != input_index
            && (base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE)
        {
            0
        } else {
            input.sequence.0
        };
        buf.extend_from_slice(&sequence.to_le_bytes());
    };
    if anyone_can_pay {
        write_compact_size(&mut buf, 1);
        write_input(&mut buf, input_index, &fields.input[input_index]);
    } else {
        write_compact_size(&mut buf, fields.input.len() as u64);
        for (i, input) in fields.input.iter().enumerate() {
            write_input(&mut buf, i, input);
        }
    }

    match base_type {
        SIGHASH_NONE => write_compact_size(&mut buf, 0),
        SIGHASH_SINGLE => {
            write_compact_size(&mut buf, input_index as u64 + 1);
            for _ in 0..input_index {
                buf.extend_from_slice(&u64::MAX.to_le_bytes());
                write_compact_size(&mut buf, 0);
            }
            write_output(&mut buf, &fields.output[input_index]);
        }
        _ => {
            write_compact_size(&mut buf, fields.output.len() as u64);
            for output in fields.output {
                write_output(&mut buf, output);
            }
        }
    }

    buf.extend_from_slice(&fields.lock_time.to_le_bytes());
    buf.extend_from_slice(fields.trailer);
    buf.extend_from_slice(&sighash_type.to_le_bytes());
    sha256d::Hash::hash(&buf).to_byte_array()
}

/// BIP143 signature hash.
///
/// Used for segwit v0 inputs. With the fork id packed into the upper bits of
/// `sighash_type` it is the transcript fork-id networks sign.
pub fn bip143_signature_hash(
    fields: &SighashFields,
    input_index: usize,
    script_code: &Script,
    value: u64,
    sighash_type: u32,
) -> [u8; 32] {
    let base_type = sighash_type & 0x1f;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;
    let zero = [0u8; 32];

    let hash_prevouts = if !anyone_can_pay {
        let mut buf = Vec::with_capacity(36 * fields.input.len());
        for input in fields.input {
            write_outpoint(&mut buf, input);
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    } else {
        zero
    };
    let hash_sequence =
        if !anyone_can_pay && base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
            let buf: Vec<u8> = fields
                .input
                .iter()
                .flat_map(|i| i.sequence.0.to_le_bytes())
                .collect();
            sha256d::Hash::hash(&buf).to_byte_array()
        } else {
            zero
        };
    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        let mut buf = Vec::new();
        for output in fields.output {
            write_output(&mut buf, output);
        }
        sha256d::Hash::hash(&buf).to_byte_array()
    } else if base_type == SIGHASH_SINGLE && input_index < fields.output.len() {
        let mut buf = Vec::new();
        write_output(&mut buf, &fields.output[input_index]);
        sha256d::Hash::hash(&buf).to_byte_array()
    } else {
        zero
    };

    let input = &fields.input[input_index];
    let mut buf = Vec::new();
    buf.extend_from_slice(&fields.version.to_le_bytes());
    buf.extend_from_slice(&hash_prevouts);
    buf.extend_from_slice(&hash_sequence);
    write_outpoint(&mut buf, input);
    write_var_slice(&mut buf, script_code.as_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&input.sequence.0.to_le_bytes());
    buf.extend_from_slice(&hash_outputs);
    buf.extend_from_slice(&fields.lock_time.to_le_bytes());
    buf.extend_from_slice(&sighash_type.to_le_bytes());
    sha256d::Hash::hash(&buf).to_byte_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::consensus::deserialize;
    use crate::bitcoin::sighash::{EcdsaSighashType, SighashCache};
    use crate::bitcoin::{Amount, ScriptBuf, Transaction};
    use rstest::rstest;

    const UNSIGNED: &str = "01000000013aa073dc10f75be76acbf18ffb76f902ebaa5aef77d4575d984774955a0c50f30000000000ffffffff0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac00000000";
    const REDEEM_SCRIPT: &str = "52210263c23e18172e1367e9a8fbcd414d7ee38f9c1d4557febd7b59560eea34fe9afa2103fb0952a682cdf71936fd62ba42ea493f3d53e0c0064c7c8697df02adf78d9d2221039fd154eab712d38200f30a28ab39a876b82ebc6f575d72498c21991c7bce039253ae";

    fn two_in_one_out() -> Transaction {
        let mut tx: Transaction = deserialize(&hex::decode(UNSIGNED).unwrap()).unwrap();
        let mut second = tx.input[0].clone();
        second.previous_output.vout = 1;
        second.sequence = crate::bitcoin::Sequence(0xfffffffe);
        tx.input.push(second);
        tx
    }

    fn fields(tx: &Transaction) -> SighashFields<'_> {
        SighashFields {
            version: tx.version.0 as u32,
            input: &tx.input,
            output: &tx.output,
            lock_time: tx.lock_time.to_consensus_u32(),
            trailer: &[],
        }
    }

    #[test]
    fn legacy_matches_golden() {
        let tx: Transaction = deserialize(&hex::decode(UNSIGNED).unwrap()).unwrap();
        let script = ScriptBuf::from_hex(REDEEM_SCRIPT).unwrap();
        let hash = legacy_signature_hash(&fields(&tx), 0, &script, 1);
        assert_eq!(
            hex::encode(hash),
            "8b43f619b48a571964cbeee65a1ba817c68a969dfa95cecf04c9a62a985e27e9"
        );
    }

    #[rstest]
    #[case(0, 0x01)]
    #[case(1, 0x01)]
    #[case(1, 0x02)]
    #[case(0, 0x03)]
    #[case(1, 0x03)]
    #[case(1, 0x81)]
    #[case(0, 0x83)]
    fn legacy_matches_rust_bitcoin(#[case] input_index: usize, #[case] sighash_type: u32) {
        let tx = two_in_one_out();
        let script = ScriptBuf::from_hex(REDEEM_SCRIPT).unwrap();
        let expected = SighashCache::new(&tx)
            .legacy_signature_hash(input_index, &script, sighash_type)
            .unwrap();
        assert_eq!(
            legacy_signature_hash(&fields(&tx), input_index, &script, sighash_type),
            expected.to_byte_array()
        );
    }

    #[test]
    fn single_without_output_is_one() {
        let tx = two_in_one_out();
        let script = ScriptBuf::from_hex(REDEEM_SCRIPT).unwrap();
        assert_eq!(
            legacy_signature_hash(&fields(&tx), 1, &script, SIGHASH_SINGLE),
            SIGHASH_ONE
        );
    }

    #[rstest]
    #[case(0, EcdsaSighashType::All)]
    #[case(1, EcdsaSighashType::All)]
    #[case(1, EcdsaSighashType::None)]
    #[case(0, EcdsaSighashType::Single)]
    #[case(1, EcdsaSighashType::Single)]
    #[case(1, EcdsaSighashType::AllPlusAnyoneCanPay)]
    fn bip143_matches_rust_bitcoin(#[case] input_index: usize, #[case] sighash_type: EcdsaSighashType) {
        let tx = two_in_one_out();
        let script = ScriptBuf::from_hex(REDEEM_SCRIPT).unwrap();
        let value = Amount::from_sat(100_000_000);
        let expected = SighashCache::new(&tx)
            .p2wsh_signature_hash(input_index, &script, value, sighash_type)
            .unwrap();
        assert_eq!(
            bip143_signature_hash(
                &fields(&tx),
                input_index,
                &script,
                value.to_sat(),
                sighash_type.to_u32()
            ),
            expected.to_byte_array()
        );
    }
}

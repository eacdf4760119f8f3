//! Legacy transaction format extraction for half-signed transactions.
//!
//! Older clients exchange half-signed spends as transactions whose
//! scriptSig/witness hold the single signature with `OP_0` placeholders for
//! the missing ones.

use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::bitgo_psbt::BitGoPsbt;
use crate::fixed_script_wallet::transaction_builder::{encode_input, InputSigningState};
use crate::transaction::{SerializableTransaction, UtxoTransaction};

/// Build a half-signed transaction in legacy format from a PSBT.
///
/// Only multisig inputs (p2sh, p2shP2wsh, p2wsh) with exactly one
/// signature are supported.
pub fn extract_half_signed_legacy_tx(psbt: &BitGoPsbt) -> Result<UtxoTransaction> {
    let mut tx = psbt.unsigned_transaction();
    if tx.transaction().input.is_empty() || tx.transaction().output.is_empty() {
        return Err(UtxoError::consistency("empty inputs or outputs"));
    }

    let mut spends = vec![];
    for input_index in 0..psbt.input_count() {
        let state = psbt.input_signing_state(input_index)?;
        match &state {
            InputSigningState::P2ms { .. } => {}
            InputSigningState::TaprootScriptPath { .. }
            | InputSigningState::TaprootKeyPath { .. } => {
                return Err(UtxoError::unsupported(format!(
                    "input {}: taproot inputs have no legacy half-signed format",
                    input_index
                )))
            }
            _ => {
                return Err(UtxoError::unsupported(format!(
                    "input {}: only multisig inputs have a legacy half-signed format",
                    input_index
                )))
            }
        }
        let count = state.signature_count();
        if count != 1 {
            return Err(UtxoError::signing(
                input_index,
                format!("expected exactly 1 signature, got {}", count),
            ));
        }
        spends.push(encode_input(&state, false)?);
    }

    for (input, (script_sig, witness)) in tx.transaction_mut().input.iter_mut().zip(spends) {
        input.script_sig = script_sig;
        input.witness = witness;
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::test_utils::*;

    #[test]
    fn full_signed_input_is_rejected() {
        let tx = tx_from_hex(GOLDEN_FULL_SIGNED);
        let psbt = BitGoPsbt::from_signed_transaction(&tx, golden_prevouts()).unwrap();
        assert!(matches!(
            extract_half_signed_legacy_tx(&psbt),
            Err(UtxoError::Signing { input_index: 0, .. })
        ));
    }

    #[test]
    fn unsigned_input_is_rejected() {
        let tx = tx_from_hex(GOLDEN_UNSIGNED);
        let psbt = BitGoPsbt::from_signed_transaction(&tx, golden_prevouts()).unwrap();
        assert!(matches!(
            extract_half_signed_legacy_tx(&psbt),
            Err(UtxoError::UnsupportedTransaction(_))
        ));
    }
}

//! Signature verification for wallet inputs.
//!
//! Every check recomputes the signature hash from the transaction and the
//! spent outputs; nothing on the wire is trusted.

use crate::bitcoin::secp256k1::{ecdsa, schnorr, Message, Secp256k1, Verification};
use crate::bitcoin::taproot::{LeafVersion, TapLeafHash};
use crate::bitcoin::{CompressedPublicKey, PublicKey, Script, TxOut, XOnlyPublicKey};
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::parse_input::{parse_signature_script, ParsedSignatureScript};
use crate::fixed_script_wallet::replay_protection::ReplayProtection;
use crate::fixed_script_wallet::wallet_keys::PubTriple;
use crate::networks::SIGHASH_DEFAULT;
use crate::transaction::{SerializableTransaction, SighashKind, UtxoTransaction};

/// The key a signature was verified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedKey {
    Ecdsa(PublicKey),
    /// Leaf key of a script path spend or output key of a key path spend.
    Schnorr(XOnlyPublicKey),
}

impl VerifiedKey {
    /// Whether this is `key`, comparing x-only for Schnorr keys.
    pub fn matches(&self, key: &PublicKey) -> bool {
        match self {
            VerifiedKey::Ecdsa(k) => k == key,
            VerifiedKey::Schnorr(k) => *k == XOnlyPublicKey::from(key.inner),
        }
    }
}

/// Result of checking one signature slot of an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVerification {
    /// Key the signature verifies against, if any.
    pub signed_by: Option<VerifiedKey>,
    /// Signature bytes including the sighash byte; `None` for placeholders.
    pub signature: Option<Vec<u8>>,
}

/// Restrict which slots and keys are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationSettings {
    /// Only check the slot at this position (wire order).
    pub signature_index: Option<usize>,
    /// Only accept this key.
    pub public_key: Option<PublicKey>,
}

/// Sighash type committed to by a serialized signature.
pub(crate) fn signature_sighash_type(signature: &[u8], schnorr: bool) -> u32 {
    if schnorr {
        if signature.len() == 65 {
            u32::from(signature[64])
        } else {
            SIGHASH_DEFAULT
        }
    } else {
        signature.last().map(|b| u32::from(*b)).unwrap_or_default()
    }
}

fn verify_ecdsa<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &UtxoTransaction,
    input_index: usize,
    prevouts: &[TxOut],
    script_code: &Script,
    segwit: bool,
    signature: &[u8],
    candidates: &[PublicKey],
) -> Result<Option<usize>> {
    let Some((_, der)) = signature.split_last() else {
        return Ok(None);
    };
    let Ok(sig) = ecdsa::Signature::from_der(der) else {
        return Ok(None);
    };
    let hash = tx.signature_hash(
        input_index,
        prevouts,
        SighashKind::Ecdsa {
            script_code,
            segwit,
        },
        signature_sighash_type(signature, false),
    )?;
    let msg = Message::from_digest(hash);
    Ok(candidates
        .iter()
        .position(|key| secp.verify_ecdsa(&msg, &sig, &key.inner).is_ok()))
}

fn verify_schnorr<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &UtxoTransaction,
    input_index: usize,
    prevouts: &[TxOut],
    kind: SighashKind,
    signature: &[u8],
    candidates: &[XOnlyPublicKey],
) -> Result<Option<usize>> {
    match signature.len() {
        64 => {}
        // an explicit sighash byte of 0x00 is not allowed
        65 if signature[64] != 0 => {}
        _ => return Ok(None),
    }
    let Ok(sig) = schnorr::Signature::from_slice(&signature[..64]) else {
        return Ok(None);
    };
    let hash = tx.signature_hash(
        input_index,
        prevouts,
        kind,
        signature_sighash_type(signature, true),
    )?;
    let msg = Message::from_digest(hash);
    Ok(candidates
        .iter()
        .position(|key| secp.verify_schnorr(&sig, &msg, key).is_ok()))
}

/// Index of the candidate whose key verifies `signature`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_ecdsa_signer(
    tx: &UtxoTransaction,
    input_index: usize,
    prevouts: &[TxOut],
    script_code: &Script,
    segwit: bool,
    signature: &[u8],
    candidates: &[PublicKey],
) -> Result<Option<usize>> {
    let secp = Secp256k1::verification_only();
    verify_ecdsa(
        &secp,
        tx,
        input_index,
        prevouts,
        script_code,
        segwit,
        signature,
        candidates,
    )
}

fn output_key(prevout: &TxOut, input_index: usize) -> Result<XOnlyPublicKey> {
    if !prevout.script_pubkey.is_p2tr() {
        return Err(UtxoError::verification(
            input_index,
            "key path spend of a non-taproot output",
        ));
    }
    XOnlyPublicKey::from_slice(&prevout.script_pubkey.as_bytes()[2..34])
        .map_err(|e| UtxoError::verification(input_index, e.to_string()))
}

/// Check every signature slot of `input_index`, in wire order.
///
/// `amount` must equal the value of the spent output. Placeholder slots are
/// reported with neither key nor signature.
pub fn get_signature_verifications(
    tx: &UtxoTransaction,
    input_index: usize,
    amount: u64,
    settings: &VerificationSettings,
    prevouts: &[TxOut],
) -> Result<Vec<SignatureVerification>> {
    let input = tx
        .transaction()
        .input
        .get(input_index)
        .ok_or_else(|| UtxoError::verification(input_index, "input index out of range"))?;
    let prevout = prevouts.get(input_index).ok_or_else(|| {
        UtxoError::consistency(format!("missing previous output for input {}", input_index))
    })?;
    if prevout.value.to_sat() != amount {
        return Err(UtxoError::consistency(format!(
            "input {}: amount {} does not match previous output value {}",
            input_index,
            amount,
            prevout.value.to_sat()
        )));
    }

    let Some(parsed) = parse_signature_script(input)? else {
        return Ok(vec![]);
    };
    let secp = Secp256k1::verification_only();
    let accept = |key: &VerifiedKey| {
        settings
            .public_key
            .as_ref()
            .map_or(true, |expected| key.matches(expected))
    };

    let slots: Vec<Option<Vec<u8>>> = match &parsed {
        ParsedSignatureScript::P2shP2pk { signature, .. } => vec![signature.clone()],
        ParsedSignatureScript::P2ms { signatures, .. }
        | ParsedSignatureScript::TaprootScriptPath { signatures, .. } => signatures.clone(),
        ParsedSignatureScript::TaprootKeyPath { signature } => vec![Some(signature.clone())],
    };

    let mut verifications = vec![];
    for (slot_index, slot) in slots.into_iter().enumerate() {
        if settings
            .signature_index
            .is_some_and(|wanted| wanted != slot_index)
        {
            continue;
        }
        let Some(signature) = slot else {
            verifications.push(SignatureVerification {
                signed_by: None,
                signature: None,
            });
            continue;
        };

        let signed_by = match &parsed {
            ParsedSignatureScript::P2ms {
                public_keys,
                redeem_script,
                witness_script,
                ..
            } => {
                let (script_code, segwit) = match (witness_script, redeem_script) {
                    (Some(s), _) => (s, true),
                    (None, Some(s)) => (s, false),
                    (None, None) => {
                        return Err(UtxoError::unsupported("multisig input without script"))
                    }
                };
                let candidates = public_keys.map(PublicKey::from);
                verify_ecdsa(
                    &secp,
                    tx,
                    input_index,
                    prevouts,
                    script_code,
                    segwit,
                    &signature,
                    &candidates,
                )?
                .map(|i| VerifiedKey::Ecdsa(candidates[i]))
            }
            ParsedSignatureScript::P2shP2pk {
                public_key,
                redeem_script,
                ..
            } => verify_ecdsa(
                &secp,
                tx,
                input_index,
                prevouts,
                redeem_script,
                false,
                &signature,
                &[*public_key],
            )?
            .map(|_| VerifiedKey::Ecdsa(*public_key)),
            ParsedSignatureScript::TaprootScriptPath {
                public_keys,
                leaf_script,
                ..
            } => {
                let leaf_hash = TapLeafHash::from_script(leaf_script, LeafVersion::TapScript);
                verify_schnorr(
                    &secp,
                    tx,
                    input_index,
                    prevouts,
                    SighashKind::TaprootScriptPath { leaf_hash },
                    &signature,
                    public_keys,
                )?
                .map(|i| VerifiedKey::Schnorr(public_keys[i]))
            }
            ParsedSignatureScript::TaprootKeyPath { .. } => {
                let key = output_key(prevout, input_index)?;
                verify_schnorr(
                    &secp,
                    tx,
                    input_index,
                    prevouts,
                    SighashKind::TaprootKeyPath,
                    &signature,
                    &[key],
                )?
                .map(|_| VerifiedKey::Schnorr(key))
            }
        };

        verifications.push(SignatureVerification {
            signed_by: signed_by.filter(|key| accept(key)),
            signature: Some(signature),
        });
    }
    Ok(verifications)
}

/// True if at least one checked slot verifies.
pub fn verify_signature(
    tx: &UtxoTransaction,
    input_index: usize,
    amount: u64,
    settings: &VerificationSettings,
    prevouts: &[TxOut],
) -> Result<bool> {
    Ok(
        get_signature_verifications(tx, input_index, amount, settings, prevouts)?
            .iter()
            .any(|v| v.signed_by.is_some()),
    )
}

/// One flag per key in `public_keys`: whether it signed `input_index`.
pub fn verify_signature_with_public_keys(
    tx: &UtxoTransaction,
    input_index: usize,
    prevouts: &[TxOut],
    public_keys: &[CompressedPublicKey],
) -> Result<Vec<bool>> {
    let amount = prevouts
        .get(input_index)
        .map(|p| p.value.to_sat())
        .ok_or_else(|| {
            UtxoError::consistency(format!("missing previous output for input {}", input_index))
        })?;
    let verifications = get_signature_verifications(
        tx,
        input_index,
        amount,
        &VerificationSettings::default(),
        prevouts,
    )?;
    Ok(public_keys
        .iter()
        .map(|key| {
            let key = PublicKey::from(*key);
            verifications
                .iter()
                .any(|v| v.signed_by.is_some_and(|signer| signer.matches(&key)))
        })
        .collect())
}

/// [`verify_signature_with_public_keys`] over a wallet key triple.
pub fn get_signature_validation_array(
    tx: &UtxoTransaction,
    input_index: usize,
    prevouts: &[TxOut],
    public_keys: &PubTriple,
) -> Result<[bool; 3]> {
    let flags = verify_signature_with_public_keys(tx, input_index, prevouts, public_keys)?;
    Ok([flags[0], flags[1], flags[2]])
}

fn has_repeated_signer(present: &[&SignatureVerification]) -> bool {
    let signers: Vec<&VerifiedKey> = present.iter().filter_map(|v| v.signed_by.as_ref()).collect();
    signers
        .iter()
        .enumerate()
        .any(|(i, key)| signers[..i].contains(key))
}

/// Verify every input except replay protection inputs.
///
/// An input fails if it carries no signature, if any of its signatures does
/// not verify, or if two of its signatures come from the same key. All
/// failing inputs are reported together.
pub fn verify_transaction(
    tx: &UtxoTransaction,
    prevouts: &[TxOut],
    replay_protection: &ReplayProtection,
) -> Result<()> {
    let input_count = tx.transaction().input.len();
    if prevouts.len() != input_count {
        return Err(UtxoError::consistency(format!(
            "{} previous outputs for {} inputs",
            prevouts.len(),
            input_count
        )));
    }

    let mut errors = vec![];
    for (input_index, prevout) in prevouts.iter().enumerate() {
        if replay_protection.is_replay_protection_input(&prevout.script_pubkey) {
            log::debug!("input {}: skipping replay protection input", input_index);
            continue;
        }
        let verifications = match get_signature_verifications(
            tx,
            input_index,
            prevout.value.to_sat(),
            &VerificationSettings::default(),
            prevouts,
        ) {
            Ok(v) => v,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        let present: Vec<&SignatureVerification> =
            verifications.iter().filter(|v| v.signature.is_some()).collect();
        if present.is_empty() {
            errors.push(UtxoError::verification(input_index, "input is not signed"));
        } else if present.iter().any(|v| v.signed_by.is_none()) {
            errors.push(UtxoError::verification(
                input_index,
                "signature does not verify against any wallet key",
            ));
        } else if has_repeated_signer(&present) {
            errors.push(UtxoError::verification(
                input_index,
                "two signatures from the same wallet key",
            ));
        }
    }
    UtxoError::aggregate(errors)
}

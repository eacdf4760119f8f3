//! Classify the scriptSig and witness of a signed or half-signed input.
//!
//! Signature slots are reported in wire order. Placeholders (`OP_0` in a
//! scriptSig, empty witness items) are kept as `None` so a half-signed input
//! reports the same number of slots as its fully signed form.

use crate::bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_CHECKSIGVERIFY};
use crate::bitcoin::script::Instruction;
use crate::bitcoin::taproot::{ControlBlock, TAPROOT_ANNEX_PREFIX};
use crate::bitcoin::{PublicKey, Script, ScriptBuf, TxIn, XOnlyPublicKey};
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::wallet_keys::PubTriple;
use crate::fixed_script_wallet::wallet_scripts::parse_multisig_script_2_of_3;

pub type SignatureSlot = Option<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParsedScriptType {
    P2sh,
    P2shP2wsh,
    P2wsh,
    P2shP2pk,
    TaprootKeyPathSpend,
    TaprootScriptPathSpend,
}

impl ParsedScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParsedScriptType::P2sh => "p2sh",
            ParsedScriptType::P2shP2wsh => "p2shP2wsh",
            ParsedScriptType::P2wsh => "p2wsh",
            ParsedScriptType::P2shP2pk => "p2shP2pk",
            ParsedScriptType::TaprootKeyPathSpend => "taprootKeyPathSpend",
            ParsedScriptType::TaprootScriptPathSpend => "taprootScriptPathSpend",
        }
    }

    pub fn is_segwit(&self) -> bool {
        !matches!(self, ParsedScriptType::P2sh | ParsedScriptType::P2shP2pk)
    }
}

impl std::fmt::Display for ParsedScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedSignatureScript {
    /// Single-key p2sh used by replay protection inputs.
    P2shP2pk {
        public_key: PublicKey,
        signature: SignatureSlot,
        redeem_script: ScriptBuf,
    },
    /// 2-of-3 `OP_CHECKMULTISIG` in p2sh, p2shP2wsh or p2wsh.
    P2ms {
        script_type: ParsedScriptType,
        public_keys: PubTriple,
        signatures: Vec<SignatureSlot>,
        redeem_script: Option<ScriptBuf>,
        witness_script: Option<ScriptBuf>,
    },
    TaprootKeyPath {
        signature: Vec<u8>,
    },
    /// `signatures[0]` belongs to `public_keys[1]` and `signatures[1]` to
    /// `public_keys[0]`: the first key in the leaf is checked last.
    TaprootScriptPath {
        public_keys: [XOnlyPublicKey; 2],
        signatures: Vec<SignatureSlot>,
        leaf_script: ScriptBuf,
        control_block: ControlBlock,
        script_path_level: usize,
    },
}

impl ParsedSignatureScript {
    pub fn script_type(&self) -> ParsedScriptType {
        match self {
            ParsedSignatureScript::P2shP2pk { .. } => ParsedScriptType::P2shP2pk,
            ParsedSignatureScript::P2ms { script_type, .. } => *script_type,
            ParsedSignatureScript::TaprootKeyPath { .. } => ParsedScriptType::TaprootKeyPathSpend,
            ParsedSignatureScript::TaprootScriptPath { .. } => {
                ParsedScriptType::TaprootScriptPathSpend
            }
        }
    }

    /// Number of non-placeholder signatures.
    pub fn signature_count(&self) -> usize {
        match self {
            ParsedSignatureScript::P2shP2pk { signature, .. } => usize::from(signature.is_some()),
            ParsedSignatureScript::P2ms { signatures, .. }
            | ParsedSignatureScript::TaprootScriptPath { signatures, .. } => {
                signatures.iter().filter(|s| s.is_some()).count()
            }
            ParsedSignatureScript::TaprootKeyPath { .. } => 1,
        }
    }
}

fn push_items(script: &Script) -> Result<Vec<Vec<u8>>> {
    script
        .instructions()
        .map(|instruction| match instruction {
            Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
            Ok(Instruction::Op(op)) => Err(UtxoError::unsupported(format!(
                "scriptSig is not push-only: found {}",
                op
            ))),
            Err(e) => Err(UtxoError::format(format!("invalid scriptSig: {}", e))),
        })
        .collect()
}

fn to_slot(item: &[u8]) -> SignatureSlot {
    if item.is_empty() {
        None
    } else {
        Some(item.to_vec())
    }
}

/// Signature slots of a multisig stack `OP_0 <sig|OP_0>... <script>`.
fn multisig_slots(items: &[Vec<u8>]) -> Result<Vec<SignatureSlot>> {
    if items.len() != 4 && items.len() != 5 {
        return Err(UtxoError::unsupported(format!(
            "expected 4 or 5 multisig stack items, got {}",
            items.len()
        )));
    }
    if !items[0].is_empty() {
        return Err(UtxoError::unsupported("multisig stack must start with OP_0"));
    }
    Ok(items[1..items.len() - 1]
        .iter()
        .map(|item| to_slot(item))
        .collect())
}

pub(crate) fn parse_p2pk_script(script: &Script) -> Option<PublicKey> {
    let mut instructions = script.instructions();
    let key = match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => PublicKey::from_slice(bytes.as_bytes()).ok()?,
        _ => return None,
    };
    match (instructions.next(), instructions.next()) {
        (Some(Ok(Instruction::Op(op))), None) if op == OP_CHECKSIG => Some(key),
        _ => None,
    }
}

/// Recover the two keys of a `<k0> OP_CHECKSIGVERIFY <k1> OP_CHECKSIG` leaf.
pub fn parse_p2tr_ns_script_2(script: &Script) -> Option<[XOnlyPublicKey; 2]> {
    let instructions: Vec<Instruction> = script
        .instructions()
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match instructions.as_slice() {
        [Instruction::PushBytes(k0), Instruction::Op(verify), Instruction::PushBytes(k1), Instruction::Op(checksig)]
            if *verify == OP_CHECKSIGVERIFY && *checksig == OP_CHECKSIG =>
        {
            Some([
                XOnlyPublicKey::from_slice(k0.as_bytes()).ok()?,
                XOnlyPublicKey::from_slice(k1.as_bytes()).ok()?,
            ])
        }
        _ => None,
    }
}

fn parse_legacy(items: Vec<Vec<u8>>) -> Result<Option<ParsedSignatureScript>> {
    let Some(last) = items.last() else {
        return Ok(None);
    };
    let redeem_script = ScriptBuf::from_bytes(last.clone());

    if let Ok(public_keys) = parse_multisig_script_2_of_3(&redeem_script) {
        return Ok(Some(ParsedSignatureScript::P2ms {
            script_type: ParsedScriptType::P2sh,
            public_keys,
            signatures: multisig_slots(&items)?,
            redeem_script: Some(redeem_script),
            witness_script: None,
        }));
    }

    if let Some(public_key) = parse_p2pk_script(&redeem_script) {
        if items.len() != 2 {
            return Err(UtxoError::unsupported(format!(
                "expected 2 p2shP2pk stack items, got {}",
                items.len()
            )));
        }
        return Ok(Some(ParsedSignatureScript::P2shP2pk {
            public_key,
            signature: to_slot(&items[0]),
            redeem_script,
        }));
    }

    Err(UtxoError::unsupported(format!(
        "unrecognized redeem script {}",
        redeem_script.to_hex_string()
    )))
}

fn parse_witness(
    script_sig_items: Vec<Vec<u8>>,
    witness: Vec<Vec<u8>>,
) -> Result<ParsedSignatureScript> {
    if witness.len() >= 2 && witness.last().and_then(|w| w.first()) == Some(&TAPROOT_ANNEX_PREFIX) {
        return Err(UtxoError::unsupported("taproot annex is not supported"));
    }

    let nested_redeem_script = match script_sig_items.len() {
        0 => None,
        1 => Some(ScriptBuf::from_bytes(script_sig_items[0].clone())),
        n => {
            return Err(UtxoError::unsupported(format!(
                "unexpected {} scriptSig items on a segwit input",
                n
            )))
        }
    };

    if witness.len() == 1 && nested_redeem_script.is_none() {
        if witness[0].is_empty() {
            return Err(UtxoError::unsupported("empty taproot key path signature"));
        }
        if witness[0].len() != 64 && witness[0].len() != 65 {
            return Err(UtxoError::unsupported(format!(
                "invalid taproot key path signature length {}",
                witness[0].len()
            )));
        }
        return Ok(ParsedSignatureScript::TaprootKeyPath {
            signature: witness[0].clone(),
        });
    }

    let Some(last) = witness.last() else {
        return Err(UtxoError::unsupported("empty witness"));
    };
    let witness_script = ScriptBuf::from_bytes(last.clone());

    if let Ok(public_keys) = parse_multisig_script_2_of_3(&witness_script) {
        let script_type = match &nested_redeem_script {
            Some(redeem_script) => {
                if *redeem_script != witness_script.to_p2wsh() {
                    return Err(UtxoError::unsupported(
                        "redeem script does not commit to the witness script",
                    ));
                }
                ParsedScriptType::P2shP2wsh
            }
            None => ParsedScriptType::P2wsh,
        };
        return Ok(ParsedSignatureScript::P2ms {
            script_type,
            public_keys,
            signatures: multisig_slots(&witness)?,
            redeem_script: nested_redeem_script,
            witness_script: Some(witness_script),
        });
    }

    if nested_redeem_script.is_none() && witness.len() == 4 {
        let leaf_script = ScriptBuf::from_bytes(witness[2].clone());
        if let Some(public_keys) = parse_p2tr_ns_script_2(&leaf_script) {
            let control_block = ControlBlock::decode(&witness[3]).map_err(|e| {
                UtxoError::unsupported(format!("invalid taproot control block: {}", e))
            })?;
            let script_path_level = control_block.merkle_branch.len();
            if script_path_level != 1 && script_path_level != 2 {
                return Err(UtxoError::unsupported(format!(
                    "unexpected taproot script path level {}",
                    script_path_level
                )));
            }
            return Ok(ParsedSignatureScript::TaprootScriptPath {
                public_keys,
                signatures: vec![to_slot(&witness[0]), to_slot(&witness[1])],
                leaf_script,
                control_block,
                script_path_level,
            });
        }
    }

    Err(UtxoError::unsupported(format!(
        "unrecognized witness with {} items",
        witness.len()
    )))
}

/// Parse the spending data of `input`. Unsigned inputs (no scriptSig and no
/// witness) yield `None`.
pub fn parse_signature_script(input: &TxIn) -> Result<Option<ParsedSignatureScript>> {
    let script_sig_items = push_items(&input.script_sig)?;
    if input.witness.is_empty() {
        return parse_legacy(script_sig_items);
    }
    parse_witness(script_sig_items, input.witness.to_vec()).map(Some)
}

/// Number of signatures present on `input`, checked against the 2-of-3 rules.
///
/// Returns 0 for unsigned inputs, 1 for half-signed and p2shP2pk inputs and 2
/// for fully signed inputs including taproot key path spends.
pub fn get_strict_signature_count(input: &TxIn) -> Result<usize> {
    let Some(parsed) = parse_signature_script(input)? else {
        return Ok(0);
    };
    let count = match &parsed {
        ParsedSignatureScript::TaprootKeyPath { .. } => 2,
        _ => parsed.signature_count(),
    };
    let max = match parsed.script_type() {
        ParsedScriptType::P2shP2pk => 1,
        _ => 2,
    };
    if count > max {
        return Err(UtxoError::unsupported(format!(
            "{} input carries {} signatures",
            parsed.script_type(),
            count
        )));
    }
    Ok(count)
}

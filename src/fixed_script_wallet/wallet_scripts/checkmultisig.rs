use crate::bitcoin::blockdata::opcodes::all::OP_CHECKMULTISIG;
use crate::bitcoin::blockdata::script::{Builder, Instruction};
use crate::bitcoin::{CompressedPublicKey, Script, ScriptBuf};
use crate::fixed_script_wallet::wallet_keys::PubTriple;

/// `OP_2 <pk1> <pk2> <pk3> OP_3 OP_CHECKMULTISIG`
pub fn build_multisig_script_2_of_3(keys: &PubTriple) -> ScriptBuf {
    let mut builder = Builder::new().push_int(2);
    for key in keys {
        builder = builder.push_slice(key.to_bytes());
    }
    builder
        .push_int(3)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// Recover the three public keys from a 2-of-3 multisig script.
pub fn parse_multisig_script_2_of_3(script: &Script) -> Result<PubTriple, String> {
    let instructions = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid script: {}", e))?;
    if instructions.len() != 6 {
        return Err(format!(
            "expected 6 script elements, got {}",
            instructions.len()
        ));
    }

    let is_small_int = |ins: &Instruction, n: i64| -> bool {
        match ins {
            Instruction::Op(op) => {
                op.to_u8() == crate::bitcoin::opcodes::all::OP_PUSHNUM_1.to_u8() + (n as u8 - 1)
            }
            _ => false,
        }
    };
    if !is_small_int(&instructions[0], 2) || !is_small_int(&instructions[4], 3) {
        return Err("not a 2-of-3 multisig script".to_string());
    }
    if instructions[5] != Instruction::Op(OP_CHECKMULTISIG) {
        return Err("missing OP_CHECKMULTISIG".to_string());
    }

    let keys = instructions[1..4]
        .iter()
        .map(|ins| match ins {
            Instruction::PushBytes(bytes) => CompressedPublicKey::from_slice(bytes.as_bytes())
                .map_err(|e| format!("invalid public key: {}", e)),
            _ => Err("expected public key push".to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok([keys[0], keys[1], keys[2]])
}

/// Legacy Pay-To-Script-Hash spending the multisig script directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptP2sh {
    pub redeem_script: ScriptBuf,
}

/// Pay-To-Script-Hash wrapping a Pay-To-Witness-Script-Hash program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptP2shP2wsh {
    pub redeem_script: ScriptBuf,
    pub witness_script: ScriptBuf,
}

/// Native Pay-To-Witness-Script-Hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptP2wsh {
    pub witness_script: ScriptBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::wallet_keys::tests::get_test_wallet_keys;

    #[test]
    fn parse_round_trip() {
        let keys = get_test_wallet_keys("lol")
            .derive_for_chain_and_index(0, 0)
            .unwrap()
            .pub_triple();
        let script = build_multisig_script_2_of_3(&keys);
        assert_eq!(script.len(), 105);
        assert_eq!(parse_multisig_script_2_of_3(&script).unwrap(), keys);
    }

    #[test]
    fn parse_rejects_other_scripts() {
        let keys = get_test_wallet_keys("lol")
            .derive_for_chain_and_index(0, 0)
            .unwrap()
            .pub_triple();
        let p2sh = build_multisig_script_2_of_3(&keys).to_p2sh();
        assert!(parse_multisig_script_2_of_3(&p2sh).is_err());
        let one_of_three = Builder::new()
            .push_int(1)
            .push_slice(keys[0].to_bytes())
            .push_slice(keys[1].to_bytes())
            .push_slice(keys[2].to_bytes())
            .push_int(3)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();
        assert!(parse_multisig_script_2_of_3(&one_of_three).is_err());
    }
}

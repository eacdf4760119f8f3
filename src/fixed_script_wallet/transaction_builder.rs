//! Stateful transaction assembly with signatures kept per input.
//!
//! Inputs carry no scriptSig or witness while being signed. `build` and
//! `build_incomplete` encode the collected signatures into the final spending
//! data.

use crate::address::to_output_script_with_network;
use crate::bitcoin::absolute::LockTime;
use crate::bitcoin::script::PushBytesBuf;
use crate::bitcoin::taproot::ControlBlock;
use crate::bitcoin::{
    Amount, OutPoint, PublicKey, ScriptBuf, Sequence, TxIn, TxOut, Witness, XOnlyPublicKey,
};
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::parse_input::{
    parse_p2tr_ns_script_2, parse_signature_script, ParsedScriptType, ParsedSignatureScript,
};
use crate::fixed_script_wallet::signer::SignatureTarget;
use crate::fixed_script_wallet::unspent::Unspent;
use crate::fixed_script_wallet::verify::find_ecdsa_signer;
use crate::fixed_script_wallet::wallet_keys::PubTriple;
use crate::fixed_script_wallet::wallet_scripts::{
    OutputScript2of3, OutputScriptType, SpendScriptP2tr,
};
use crate::networks::Network;
use crate::transaction::{SerializableTransaction, SighashKind, UtxoTransaction};

/// Signatures collected for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSigningState {
    Unsigned,
    /// Signatures are indexed by key position in `public_keys`.
    P2ms {
        script_type: OutputScriptType,
        public_keys: PubTriple,
        redeem_script: Option<ScriptBuf>,
        witness_script: Option<ScriptBuf>,
        signatures: [Option<Vec<u8>>; 3],
    },
    /// Signatures are indexed by key position in the leaf.
    TaprootScriptPath {
        public_keys: [XOnlyPublicKey; 2],
        leaf_script: ScriptBuf,
        control_block: ControlBlock,
        signatures: [Option<Vec<u8>>; 2],
    },
    TaprootKeyPath {
        signature: Vec<u8>,
    },
    P2shP2pk {
        public_key: PublicKey,
        redeem_script: ScriptBuf,
        signature: Option<Vec<u8>>,
    },
}

impl InputSigningState {
    pub(crate) fn signature_count(&self) -> usize {
        match self {
            InputSigningState::Unsigned => 0,
            InputSigningState::P2ms { signatures, .. } => {
                signatures.iter().filter(|s| s.is_some()).count()
            }
            InputSigningState::TaprootScriptPath { signatures, .. } => {
                signatures.iter().filter(|s| s.is_some()).count()
            }
            InputSigningState::TaprootKeyPath { .. } => 2,
            InputSigningState::P2shP2pk { signature, .. } => usize::from(signature.is_some()),
        }
    }

    pub(crate) fn required_signatures(&self) -> usize {
        match self {
            InputSigningState::P2shP2pk { .. } => 1,
            _ => 2,
        }
    }
}

fn push_script(items: &[Vec<u8>]) -> Result<ScriptBuf> {
    let mut builder = ScriptBuf::builder();
    for item in items {
        let push = PushBytesBuf::try_from(item.clone())
            .map_err(|e| UtxoError::format(format!("script push too large: {}", e)))?;
        builder = builder.push_slice(push);
    }
    Ok(builder.into_script())
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    tx: UtxoTransaction,
    prevouts: Vec<TxOut>,
    inputs: Vec<InputSigningState>,
}

impl TransactionBuilder {
    pub fn new(network: Network) -> Result<Self> {
        Ok(Self {
            tx: UtxoTransaction::new(network)?,
            prevouts: vec![],
            inputs: vec![],
        })
    }

    /// Rehydrate a builder from a (partially) signed transaction.
    ///
    /// `prevouts` holds the output spent by each input. Existing multisig
    /// signatures are matched to their keys by verifying them against the
    /// recomputed signature hash.
    pub fn from_transaction(mut tx: UtxoTransaction, prevouts: Vec<TxOut>) -> Result<Self> {
        let input_count = tx.transaction().input.len();
        if prevouts.len() != input_count {
            return Err(UtxoError::consistency(format!(
                "{} previous outputs for {} inputs",
                prevouts.len(),
                input_count
            )));
        }

        let parsed = tx
            .transaction()
            .input
            .iter()
            .map(parse_signature_script)
            .collect::<Result<Vec<_>>>()?;

        for input in tx.transaction_mut().input.iter_mut() {
            input.script_sig = ScriptBuf::new();
            input.witness = Witness::new();
        }

        let mut builder = Self {
            tx,
            prevouts,
            inputs: vec![],
        };
        for (input_index, parsed) in parsed.into_iter().enumerate() {
            let state = builder.signing_state(input_index, parsed)?;
            builder.inputs.push(state);
        }
        Ok(builder)
    }

    fn signing_state(
        &self,
        input_index: usize,
        parsed: Option<ParsedSignatureScript>,
    ) -> Result<InputSigningState> {
        let Some(parsed) = parsed else {
            return Ok(InputSigningState::Unsigned);
        };
        Ok(match parsed {
            ParsedSignatureScript::P2ms {
                script_type,
                public_keys,
                signatures,
                redeem_script,
                witness_script,
            } => {
                let (script_code, segwit) = match (&witness_script, &redeem_script) {
                    (Some(s), _) => (s.clone(), true),
                    (None, Some(s)) => (s.clone(), false),
                    (None, None) => {
                        return Err(UtxoError::unsupported("multisig input without script"))
                    }
                };
                let candidates = public_keys.map(PublicKey::from);
                let mut slots: [Option<Vec<u8>>; 3] = Default::default();
                for signature in signatures.into_iter().flatten() {
                    let key_index = find_ecdsa_signer(
                        &self.tx,
                        input_index,
                        &self.prevouts,
                        &script_code,
                        segwit,
                        &signature,
                        &candidates,
                    )?
                    .ok_or_else(|| {
                        UtxoError::verification(input_index, "signature matches no wallet key")
                    })?;
                    slots[key_index] = Some(signature);
                }
                InputSigningState::P2ms {
                    script_type: match script_type {
                        ParsedScriptType::P2shP2wsh => OutputScriptType::P2shP2wsh,
                        ParsedScriptType::P2wsh => OutputScriptType::P2wsh,
                        _ => OutputScriptType::P2sh,
                    },
                    public_keys,
                    redeem_script,
                    witness_script,
                    signatures: slots,
                }
            }
            ParsedSignatureScript::TaprootScriptPath {
                public_keys,
                signatures,
                leaf_script,
                control_block,
                ..
            } => {
                let mut slots: [Option<Vec<u8>>; 2] = Default::default();
                // wire order is reversed relative to the leaf keys
                for (wire_index, signature) in signatures.into_iter().enumerate() {
                    slots[1 - wire_index] = signature;
                }
                InputSigningState::TaprootScriptPath {
                    public_keys,
                    leaf_script,
                    control_block,
                    signatures: slots,
                }
            }
            ParsedSignatureScript::TaprootKeyPath { signature } => {
                InputSigningState::TaprootKeyPath { signature }
            }
            ParsedSignatureScript::P2shP2pk {
                public_key,
                signature,
                redeem_script,
            } => InputSigningState::P2shP2pk {
                public_key,
                redeem_script,
                signature,
            },
        })
    }

    pub fn network(&self) -> Network {
        self.tx.network
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn prevouts(&self) -> &[TxOut] {
        &self.prevouts
    }

    pub fn input_state(&self, input_index: usize) -> Option<&InputSigningState> {
        self.inputs.get(input_index)
    }

    /// Append an input spending `outpoint`. The sequence defaults to final.
    pub fn add_input(
        &mut self,
        outpoint: OutPoint,
        sequence: Option<Sequence>,
        prevout: TxOut,
    ) -> usize {
        self.tx.transaction_mut().input.push(TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: sequence.unwrap_or(Sequence::MAX),
            witness: Witness::new(),
        });
        self.prevouts.push(prevout);
        self.inputs.push(InputSigningState::Unsigned);
        self.inputs.len() - 1
    }

    pub fn add_unspent(&mut self, unspent: &Unspent) -> Result<usize> {
        let outpoint = unspent.output_id()?.outpoint();
        let prevout = unspent.to_output(self.network())?;
        Ok(self.add_input(outpoint, None, prevout))
    }

    pub fn add_output(&mut self, script_pubkey: ScriptBuf, value: u64) -> usize {
        let outputs = &mut self.tx.transaction_mut().output;
        outputs.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        });
        outputs.len() - 1
    }

    pub fn add_output_address(&mut self, address: &str, value: u64) -> Result<usize> {
        let script = to_output_script_with_network(address, self.network())?;
        Ok(self.add_output(script, value))
    }

    pub fn set_version(&mut self, version: i32) -> Result<()> {
        self.tx.set_version(version)
    }

    pub fn set_lock_time(&mut self, lock_time: u32) {
        self.tx.transaction_mut().lock_time = LockTime::from_consensus(lock_time);
    }

    pub fn set_consensus_branch_id(&mut self, branch_id: u32) -> Result<()> {
        self.tx.set_consensus_branch_id(branch_id)
    }

    /// The finished transaction. Every input needs its full set of signatures.
    pub fn build(&self) -> Result<UtxoTransaction> {
        let errors: Vec<UtxoError> = self
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(input_index, state)| {
                let count = state.signature_count();
                let required = state.required_signatures();
                (count < required).then(|| {
                    UtxoError::signing(
                        input_index,
                        format!("has {} of {} required signatures", count, required),
                    )
                })
            })
            .collect();
        UtxoError::aggregate(errors)?;
        self.encode(true)
    }

    /// The transaction with whatever signatures are present, using
    /// placeholders for missing ones.
    pub fn build_incomplete(&self) -> Result<UtxoTransaction> {
        self.encode(false)
    }

    fn encode(&self, complete: bool) -> Result<UtxoTransaction> {
        let mut tx = self.tx.clone();
        for (input, state) in tx.transaction_mut().input.iter_mut().zip(&self.inputs) {
            let (script_sig, witness) = encode_input(state, complete)?;
            input.script_sig = script_sig;
            input.witness = witness;
        }
        Ok(tx)
    }

    pub(crate) fn into_parts(self) -> (UtxoTransaction, Vec<TxOut>, Vec<InputSigningState>) {
        (self.tx, self.prevouts, self.inputs)
    }

    fn state_mut(&mut self, input_index: usize) -> Result<&mut InputSigningState> {
        self.inputs
            .get_mut(input_index)
            .ok_or_else(|| UtxoError::signing(input_index, "input index out of range"))
    }
}

/// scriptSig and witness of one input. Incomplete encodings keep empty
/// placeholders for missing signatures.
pub(crate) fn encode_input(
    state: &InputSigningState,
    complete: bool,
) -> Result<(ScriptBuf, Witness)> {
    Ok(match state {
        InputSigningState::Unsigned => (ScriptBuf::new(), Witness::new()),
        InputSigningState::P2ms {
            script_type,
            redeem_script,
            witness_script,
            signatures,
            ..
        } => {
            let mut items = vec![vec![]];
            if complete {
                items.extend(signatures.iter().flatten().take(2).cloned());
            } else {
                items.extend(signatures.iter().map(|s| s.clone().unwrap_or_default()));
            }
            let missing_script = || UtxoError::consistency("multisig input without script");
            match script_type {
                OutputScriptType::P2sh => {
                    items.push(redeem_script.as_ref().ok_or_else(missing_script)?.to_bytes());
                    (push_script(&items)?, Witness::new())
                }
                OutputScriptType::P2shP2wsh => {
                    items.push(witness_script.as_ref().ok_or_else(missing_script)?.to_bytes());
                    let redeem = redeem_script.as_ref().ok_or_else(missing_script)?;
                    (push_script(&[redeem.to_bytes()])?, Witness::from_slice(&items))
                }
                _ => {
                    items.push(witness_script.as_ref().ok_or_else(missing_script)?.to_bytes());
                    (ScriptBuf::new(), Witness::from_slice(&items))
                }
            }
        }
        InputSigningState::TaprootScriptPath {
            leaf_script,
            control_block,
            signatures,
            ..
        } => {
            let items = vec![
                signatures[1].clone().unwrap_or_default(),
                signatures[0].clone().unwrap_or_default(),
                leaf_script.to_bytes(),
                control_block.serialize(),
            ];
            (ScriptBuf::new(), Witness::from_slice(&items))
        }
        InputSigningState::TaprootKeyPath { signature } => {
            (ScriptBuf::new(), Witness::from_slice(&[signature.clone()]))
        }
        InputSigningState::P2shP2pk {
            redeem_script,
            signature,
            ..
        } => {
            let items = vec![signature.clone().unwrap_or_default(), redeem_script.to_bytes()];
            (push_script(&items)?, Witness::new())
        }
    })
}

impl SignatureTarget for TransactionBuilder {
    fn network(&self) -> Network {
        self.tx.network
    }

    fn previous_output(&self, input_index: usize) -> Result<OutPoint> {
        self.tx
            .transaction()
            .input
            .get(input_index)
            .map(|input| input.previous_output)
            .ok_or_else(|| UtxoError::signing(input_index, "input index out of range"))
    }

    fn prevout(&self, input_index: usize) -> Result<TxOut> {
        self.prevouts
            .get(input_index)
            .cloned()
            .ok_or_else(|| UtxoError::signing(input_index, "input index out of range"))
    }

    fn signature_hash(
        &self,
        input_index: usize,
        kind: SighashKind,
        sighash_type: u32,
    ) -> Result<[u8; 32]> {
        self.tx
            .signature_hash(input_index, &self.prevouts, kind, sighash_type)
    }

    fn add_multisig_signature(
        &mut self,
        input_index: usize,
        script_type: OutputScriptType,
        public_keys: &PubTriple,
        scripts: &OutputScript2of3,
        signer_index: usize,
        signature: Vec<u8>,
    ) -> Result<()> {
        let state = self.state_mut(input_index)?;
        if let InputSigningState::Unsigned = state {
            *state = InputSigningState::P2ms {
                script_type,
                public_keys: *public_keys,
                redeem_script: scripts.redeem_script.clone(),
                witness_script: scripts.witness_script.clone(),
                signatures: Default::default(),
            };
        }
        match state {
            InputSigningState::P2ms {
                public_keys: existing,
                signatures,
                ..
            } if existing == public_keys => {
                signatures[signer_index] = Some(signature);
                Ok(())
            }
            _ => Err(UtxoError::consistency(format!(
                "input {} is already signed with different scripts",
                input_index
            ))),
        }
    }

    fn add_taproot_script_signature(
        &mut self,
        input_index: usize,
        spend: &SpendScriptP2tr,
        signer: XOnlyPublicKey,
        signature: Vec<u8>,
    ) -> Result<()> {
        let state = self.state_mut(input_index)?;
        if let InputSigningState::Unsigned = state {
            let public_keys = parse_p2tr_ns_script_2(&spend.witness_script)
                .ok_or_else(|| UtxoError::consistency("leaf script is not a 2-of-2 script"))?;
            *state = InputSigningState::TaprootScriptPath {
                public_keys,
                leaf_script: spend.witness_script.clone(),
                control_block: spend.control_block.clone(),
                signatures: Default::default(),
            };
        }
        match state {
            InputSigningState::TaprootScriptPath {
                public_keys,
                leaf_script,
                signatures,
                ..
            } if *leaf_script == spend.witness_script => {
                let position = public_keys
                    .iter()
                    .position(|k| *k == signer)
                    .ok_or_else(|| UtxoError::consistency("signer is not a key of the leaf"))?;
                signatures[position] = Some(signature);
                Ok(())
            }
            _ => Err(UtxoError::consistency(format!(
                "input {} is already signed with a different leaf",
                input_index
            ))),
        }
    }
}

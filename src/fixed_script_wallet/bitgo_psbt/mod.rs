//! BitGo-specific PSBT handling that works across network formats.
//!
//! A [`BitGoPsbt`] keeps a rust-bitcoin [`Psbt`] in bitcoin layout plus a
//! network transaction template. Serialization converts the global unsigned
//! transaction to the wire layout of the network.

pub mod legacy_txformat;
mod network_psbt;
pub mod propkv;

use std::collections::BTreeMap;

use crate::address::to_output_script_with_network;
use crate::bitcoin::absolute::LockTime;
use crate::bitcoin::bip32::KeySource;
use crate::bitcoin::psbt::{Input, Output, Psbt, PsbtSighashType};
use crate::bitcoin::sighash::EcdsaSighashType;
use crate::bitcoin::taproot::{self, LeafVersion, TapLeafHash};
use crate::bitcoin::{
    ecdsa, secp256k1, Amount, CompressedPublicKey, OutPoint, PublicKey, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness, XOnlyPublicKey,
};
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::parse_input::{parse_p2pk_script, parse_p2tr_ns_script_2};
use crate::fixed_script_wallet::signer::SignatureTarget;
use crate::fixed_script_wallet::transaction_builder::{
    encode_input, InputSigningState, TransactionBuilder,
};
use crate::fixed_script_wallet::unspent::{to_prev_outputs, Unspent, UnspentKind};
use crate::fixed_script_wallet::wallet_keys::{
    DerivedWalletKeys, KeyRole, PubTriple, RootWalletKeys,
};
use crate::fixed_script_wallet::wallet_scripts::{
    build_tap_tree_for_output, create_key_path_p2tr_musig2, create_output_script_2of3,
    create_spend_script_p2tr, create_tap_bip32_derivation, internal_key_p2tr,
    parse_multisig_script_2_of_3, to_xonly_pubkey, Chain, OutputScript2of3, OutputScriptType,
    ScriptP2shP2pk, SpendScriptP2tr, TapKeyOrigins, WalletScripts,
};
use crate::networks::{CoinFamily, Network, SIGHASH_FORKID};
use crate::transaction::{SerializableTransaction, SighashKind, UtxoTransaction};

pub use legacy_txformat::extract_half_signed_legacy_tx;
pub use propkv::{BitGoKeyValue, Musig2Participants, ProprietaryKeySubtype, BITGO};

/// Identifies a script by its chain and index in the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptId {
    pub chain: u32,
    pub index: u32,
}

/// Specifies the signer and cosigner for Taproot inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignPath {
    pub signer: KeyRole,
    pub cosigner: KeyRole,
}

impl SignPath {
    fn is_user_bitgo(&self) -> bool {
        matches!(
            (self.signer, self.cosigner),
            (KeyRole::User, KeyRole::Bitgo) | (KeyRole::Bitgo, KeyRole::User)
        )
    }
}

/// Optional parameters for wallet inputs
#[derive(Debug, Clone, Default)]
pub struct WalletInputOptions<'a> {
    /// Signer and cosigner; required for p2trLegacy. A p2trMusig2 input without
    /// one, or with the user+bitgo pair, is prepared for the key path.
    pub sign_path: Option<SignPath>,
    /// Sequence number (default: 0xFFFFFFFE)
    pub sequence: Option<u32>,
    /// Previous transaction bytes; if provided, also sets non_witness_utxo
    pub prev_tx: Option<&'a [u8]>,
}

const DEFAULT_SEQUENCE: u32 = 0xFFFF_FFFE;

/// ECDSA signature as held in the PSBT: fork-id networks store the sighash
/// type without `SIGHASH_FORKID`.
fn decode_ecdsa_signature(network: Network, bytes: &[u8]) -> Result<ecdsa::Signature> {
    let (sighash_byte, der) = bytes
        .split_last()
        .ok_or_else(|| UtxoError::format("empty signature"))?;
    let mut sighash_type = u32::from(*sighash_byte);
    if network.fork_id().is_some() {
        if sighash_type & SIGHASH_FORKID == 0 {
            return Err(UtxoError::format(format!(
                "{} signature without SIGHASH_FORKID",
                network
            )));
        }
        sighash_type &= !SIGHASH_FORKID;
    }
    Ok(ecdsa::Signature {
        signature: secp256k1::ecdsa::Signature::from_der(der)
            .map_err(|e| UtxoError::format(format!("invalid DER signature: {}", e)))?,
        sighash_type: EcdsaSighashType::from_standard(sighash_type)
            .map_err(|e| UtxoError::format(e.to_string()))?,
    })
}

fn encode_ecdsa_signature(network: Network, signature: &ecdsa::Signature) -> Vec<u8> {
    let mut sighash_type = signature.sighash_type.to_u32();
    if network.fork_id().is_some() {
        sighash_type |= SIGHASH_FORKID;
    }
    let mut bytes = signature.signature.serialize_der().to_vec();
    bytes.push(sighash_type as u8);
    bytes
}

fn decode_taproot_signature(bytes: &[u8]) -> Result<taproot::Signature> {
    taproot::Signature::from_slice(bytes)
        .map_err(|e| UtxoError::format(format!("invalid schnorr signature: {}", e)))
}

fn bip32_derivation(
    wallet_keys: &RootWalletKeys,
    derived: &DerivedWalletKeys,
) -> BTreeMap<secp256k1::PublicKey, KeySource> {
    KeyRole::ALL
        .into_iter()
        .map(|role| {
            (
                derived.key(role).0,
                (
                    wallet_keys.key(role).fingerprint(),
                    derived.paths[role.index()].clone(),
                ),
            )
        })
        .collect()
}

/// Tap key origins restricted to `keys`, each listing only `leaf_hash`.
fn tap_key_origins_for(
    origins: TapKeyOrigins,
    keys: &[XOnlyPublicKey],
    leaf_hash: Option<TapLeafHash>,
) -> TapKeyOrigins {
    origins
        .into_iter()
        .filter(|(key, _)| keys.contains(key))
        .map(|(key, (_, source))| (key, (leaf_hash.into_iter().collect(), source)))
        .collect()
}

/// Add the update records of a wallet input and return its output script.
fn update_wallet_input(
    input: &mut Input,
    network: Network,
    wallet_keys: &RootWalletKeys,
    script_id: ScriptId,
    sign_path: Option<SignPath>,
) -> Result<ScriptBuf> {
    let chain = Chain::try_from(script_id.chain)?;
    let derived = wallet_keys.derive_for_chain_and_index(script_id.chain, script_id.index)?;
    let public_keys = derived.pub_triple();
    let scripts = WalletScripts::new(
        &public_keys,
        chain.script_type,
        &network.output_script_support(),
    )?;

    match chain.script_type {
        OutputScriptType::P2sh | OutputScriptType::P2shP2wsh | OutputScriptType::P2wsh => {
            let output = create_output_script_2of3(&public_keys, chain.script_type)?;
            input.redeem_script = output.redeem_script;
            input.witness_script = output.witness_script;
            input.bip32_derivation = bip32_derivation(wallet_keys, &derived);
        }
        OutputScriptType::P2trLegacy | OutputScriptType::P2trMusig2 => {
            let is_musig2 = chain.script_type == OutputScriptType::P2trMusig2;
            let origins = create_tap_bip32_derivation(
                wallet_keys,
                script_id.chain,
                script_id.index,
                &public_keys,
                is_musig2,
            );
            let key_path = is_musig2 && sign_path.map_or(true, |p| p.is_user_bitgo());
            if key_path {
                let key_path = create_key_path_p2tr_musig2(&public_keys)?;
                let participants = [derived.key(KeyRole::User), derived.key(KeyRole::Bitgo)];
                let xonly: Vec<XOnlyPublicKey> =
                    participants.iter().map(|k| to_xonly_pubkey(*k)).collect();
                input.tap_internal_key = Some(key_path.internal_pubkey);
                input.tap_merkle_root = key_path.taptree_root;
                input.tap_key_origins = tap_key_origins_for(origins, &xonly, None);
                let (key, value) = Musig2Participants {
                    output_key: key_path.output_pubkey,
                    internal_key: key_path.internal_pubkey,
                    participants,
                }
                .to_key_value()
                .to_key_value();
                input.proprietary.insert(key, value);
            } else {
                let sign_path = sign_path.ok_or_else(|| {
                    UtxoError::configuration(format!(
                        "{} input needs a signer and cosigner",
                        chain.script_type
                    ))
                })?;
                let spend = create_spend_script_p2tr(
                    &public_keys,
                    sign_path.signer,
                    sign_path.cosigner,
                    is_musig2,
                )?;
                let leaf_keys = [
                    to_xonly_pubkey(derived.key(sign_path.signer)),
                    to_xonly_pubkey(derived.key(sign_path.cosigner)),
                ];
                input.tap_scripts.insert(
                    spend.control_block.clone(),
                    (spend.witness_script.clone(), spend.leaf_version),
                );
                input.tap_key_origins =
                    tap_key_origins_for(origins, &leaf_keys, Some(spend.leaf_hash));
            }
        }
    }
    Ok(scripts.output_script())
}

/// A PSBT for one of the supported networks.
#[derive(Debug, Clone)]
pub struct BitGoPsbt {
    psbt: Psbt,
    template: UtxoTransaction,
}

impl PartialEq for BitGoPsbt {
    fn eq(&self, other: &Self) -> bool {
        self.psbt == other.psbt && self.unsigned_transaction() == other.unsigned_transaction()
    }
}

impl BitGoPsbt {
    /// An empty PSBT with the network's default transaction version.
    pub fn new(network: Network) -> Result<Self> {
        let template = UtxoTransaction::new(network)?;
        let psbt = Psbt::from_unsigned_tx(template.transaction().clone())
            .map_err(|e| UtxoError::format(e.to_string()))?;
        let mut bitgo_psbt = Self { psbt, template };
        if let Some(branch_id) = bitgo_psbt.template.consensus_branch_id() {
            propkv::set_zec_consensus_branch_id(&mut bitgo_psbt.psbt, branch_id);
        }
        Ok(bitgo_psbt)
    }

    /// An empty Zcash PSBT whose consensus branch id is the one in force at
    /// `block_height`.
    pub fn new_zcash_at_height(network: Network, block_height: u32) -> Result<Self> {
        let branch_id = crate::zcash::branch_id_at_height(network, block_height)?;
        let mut bitgo_psbt = Self::new(network)?;
        bitgo_psbt.set_consensus_branch_id(branch_id)?;
        Ok(bitgo_psbt)
    }

    /// Deserialize a PSBT whose global transaction uses the layout of `network`.
    pub fn deserialize(bytes: &[u8], network: Network) -> Result<Self> {
        let (psbt, mut template) = network_psbt::deserialize(bytes, network)?;
        if network.family() == CoinFamily::Zcash {
            let branch_id = propkv::get_zec_consensus_branch_id(&psbt).ok_or_else(|| {
                UtxoError::format("Zcash PSBT without consensus branch id")
            })?;
            template.set_consensus_branch_id(branch_id)?;
        }
        log::debug!(
            "decoded {} PSBT with {} inputs",
            network,
            psbt.inputs.len()
        );
        Ok(Self { psbt, template })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        network_psbt::serialize_psbt(&self.psbt, &self.template)
    }

    pub fn network(&self) -> Network {
        self.template.network
    }

    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    pub fn into_psbt(self) -> Psbt {
        self.psbt
    }

    pub fn input_count(&self) -> usize {
        self.psbt.inputs.len()
    }

    pub fn set_version(&mut self, version: i32) -> Result<()> {
        self.template.set_version(version)?;
        self.psbt.unsigned_tx.version = self.template.transaction().version;
        Ok(())
    }

    pub fn set_lock_time(&mut self, lock_time: u32) {
        self.psbt.unsigned_tx.lock_time = LockTime::from_consensus(lock_time);
    }

    pub fn set_consensus_branch_id(&mut self, branch_id: u32) -> Result<()> {
        self.template.set_consensus_branch_id(branch_id)?;
        propkv::set_zec_consensus_branch_id(&mut self.psbt, branch_id);
        Ok(())
    }

    pub fn consensus_branch_id(&self) -> Option<u32> {
        self.template.consensus_branch_id()
    }

    /// The unsigned transaction in the network's layout.
    pub fn unsigned_transaction(&self) -> UtxoTransaction {
        let mut tx = self.template.clone();
        *tx.transaction_mut() = self.psbt.unsigned_tx.clone();
        tx
    }

    pub fn unsigned_txid(&self) -> Result<Txid> {
        self.unsigned_transaction().txid()
    }

    fn input(&self, input_index: usize) -> Result<&Input> {
        self.psbt
            .inputs
            .get(input_index)
            .ok_or_else(|| UtxoError::signing(input_index, "input index out of range"))
    }

    fn input_mut(&mut self, input_index: usize) -> Result<&mut Input> {
        self.psbt
            .inputs
            .get_mut(input_index)
            .ok_or_else(|| UtxoError::signing(input_index, "input index out of range"))
    }

    /// Outputs spent by every input, from `witness_utxo` or `non_witness_utxo`.
    pub fn prevouts(&self) -> Result<Vec<TxOut>> {
        (0..self.input_count())
            .map(|input_index| self.prevout(input_index))
            .collect()
    }

    /// Append an input spending `outpoint`.
    pub fn add_input(
        &mut self,
        outpoint: OutPoint,
        sequence: Option<u32>,
        prevout: TxOut,
    ) -> usize {
        self.psbt.unsigned_tx.input.push(TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence(sequence.unwrap_or(DEFAULT_SEQUENCE)),
            witness: Witness::new(),
        });
        self.psbt.inputs.push(Input {
            witness_utxo: Some(prevout),
            ..Default::default()
        });
        self.psbt.inputs.len() - 1
    }

    /// Append an input spending the wallet output at `script_id`.
    ///
    /// The input carries the scripts, key origins and taproot leaf needed by
    /// every later signer.
    pub fn add_wallet_input(
        &mut self,
        outpoint: OutPoint,
        value: u64,
        wallet_keys: &RootWalletKeys,
        script_id: ScriptId,
        options: WalletInputOptions,
    ) -> Result<usize> {
        let network = self.network();
        let mut input = Input::default();
        let script_pubkey =
            update_wallet_input(&mut input, network, wallet_keys, script_id, options.sign_path)?;
        let prevout = TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        };
        if let Some(prev_tx) = options.prev_tx {
            input.non_witness_utxo = Some(self.previous_transaction(prev_tx, outpoint, &prevout)?);
        }
        input.witness_utxo = Some(prevout.clone());

        let input_index = self.add_input(outpoint, options.sequence, prevout);
        self.psbt.inputs[input_index] = input;
        log::debug!(
            "added wallet input {} (chain {}, index {})",
            input_index,
            script_id.chain,
            script_id.index
        );
        Ok(input_index)
    }

    fn previous_transaction(
        &self,
        bytes: &[u8],
        outpoint: OutPoint,
        prevout: &TxOut,
    ) -> Result<Transaction> {
        let prev_tx = UtxoTransaction::from_bytes(bytes, self.network())?;
        if prev_tx.txid()? != outpoint.txid {
            return Err(UtxoError::consistency(format!(
                "previous transaction does not have txid {}",
                outpoint.txid
            )));
        }
        let tx = prev_tx.transaction().clone();
        if tx.output.get(outpoint.vout as usize) != Some(prevout) {
            return Err(UtxoError::consistency(format!(
                "previous transaction output {} does not match the wallet output",
                outpoint.vout
            )));
        }
        Ok(tx)
    }

    /// Append a single-key p2sh input that only the platform signs.
    pub fn add_replay_protection_input(
        &mut self,
        outpoint: OutPoint,
        public_key: CompressedPublicKey,
        value: u64,
        sequence: Option<u32>,
    ) -> usize {
        let script = ScriptP2shP2pk::new(public_key);
        let prevout = TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script.output_script(),
        };
        let sighash_type = PsbtSighashType::from_u32(self.network().default_sighash_type());
        let input_index = self.add_input(outpoint, sequence, prevout);
        let input = &mut self.psbt.inputs[input_index];
        input.redeem_script = Some(script.redeem_script);
        input.sighash_type = Some(sighash_type);
        input_index
    }

    pub fn add_output(&mut self, script_pubkey: ScriptBuf, value: u64) -> usize {
        self.psbt.unsigned_tx.output.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        });
        self.psbt.outputs.push(Output::default());
        self.psbt.outputs.len() - 1
    }

    pub fn add_output_address(&mut self, address: &str, value: u64) -> Result<usize> {
        let script = to_output_script_with_network(address, self.network())?;
        Ok(self.add_output(script, value))
    }

    /// Append a wallet (change) output with the records that identify it.
    pub fn add_wallet_output(
        &mut self,
        wallet_keys: &RootWalletKeys,
        script_id: ScriptId,
        value: u64,
    ) -> Result<usize> {
        let chain = Chain::try_from(script_id.chain)?;
        let derived = wallet_keys.derive_for_chain_and_index(script_id.chain, script_id.index)?;
        let public_keys = derived.pub_triple();
        let scripts = WalletScripts::new(
            &public_keys,
            chain.script_type,
            &self.network().output_script_support(),
        )?;

        let mut output = Output::default();
        if chain.script_type.is_taproot() {
            let is_musig2 = chain.script_type == OutputScriptType::P2trMusig2;
            output.tap_internal_key = Some(internal_key_p2tr(&public_keys, is_musig2)?);
            output.tap_tree = Some(build_tap_tree_for_output(&public_keys, is_musig2)?);
            output.tap_key_origins = create_tap_bip32_derivation(
                wallet_keys,
                script_id.chain,
                script_id.index,
                &public_keys,
                is_musig2,
            );
        } else {
            let OutputScript2of3 {
                redeem_script,
                witness_script,
                ..
            } = create_output_script_2of3(&public_keys, chain.script_type)?;
            output.redeem_script = redeem_script;
            output.witness_script = witness_script;
            output.bip32_derivation = bip32_derivation(wallet_keys, &derived);
        }

        let output_index = self.add_output(scripts.output_script(), value);
        self.psbt.outputs[output_index] = output;
        Ok(output_index)
    }

    /// Signatures of `input_index` in the order the spending data needs them.
    fn input_signing_state(&self, input_index: usize) -> Result<InputSigningState> {
        let network = self.network();
        let input = self.input(input_index)?;
        if let Some(signature) = &input.tap_key_sig {
            return Ok(InputSigningState::TaprootKeyPath {
                signature: signature.to_vec(),
            });
        }

        for (control_block, (leaf_script, leaf_version)) in &input.tap_scripts {
            let leaf_hash = TapLeafHash::from_script(leaf_script, *leaf_version);
            let public_keys = parse_p2tr_ns_script_2(leaf_script)
                .ok_or_else(|| UtxoError::unsupported("taproot leaf is not a 2-of-2 script"))?;
            let signatures = public_keys.map(|key| {
                input
                    .tap_script_sigs
                    .get(&(key, leaf_hash))
                    .map(|sig| sig.to_vec())
            });
            if signatures.iter().any(Option::is_some) {
                return Ok(InputSigningState::TaprootScriptPath {
                    public_keys,
                    leaf_script: leaf_script.clone(),
                    control_block: control_block.clone(),
                    signatures,
                });
            }
        }

        let multisig_script = input.witness_script.as_ref().or(input.redeem_script.as_ref());
        if let Some(script) = multisig_script {
            if let Ok(public_keys) = parse_multisig_script_2_of_3(script) {
                let script_type = match (&input.redeem_script, &input.witness_script) {
                    (Some(_), Some(_)) => OutputScriptType::P2shP2wsh,
                    (None, Some(_)) => OutputScriptType::P2wsh,
                    _ => OutputScriptType::P2sh,
                };
                let signatures = public_keys.map(|key| {
                    input
                        .partial_sigs
                        .get(&PublicKey::from(key))
                        .map(|sig| encode_ecdsa_signature(network, sig))
                });
                return Ok(InputSigningState::P2ms {
                    script_type,
                    public_keys,
                    redeem_script: input.redeem_script.clone(),
                    witness_script: input.witness_script.clone(),
                    signatures,
                });
            }
            if let Some(public_key) = parse_p2pk_script(script) {
                return Ok(InputSigningState::P2shP2pk {
                    public_key,
                    redeem_script: script.clone(),
                    signature: input
                        .partial_sigs
                        .get(&public_key)
                        .map(|sig| encode_ecdsa_signature(network, sig)),
                });
            }
            return Err(UtxoError::unsupported(format!(
                "input {}: unrecognized redeem or witness script",
                input_index
            )));
        }
        Ok(InputSigningState::Unsigned)
    }

    /// Write the final scriptSig and witness of `input_index` and drop the
    /// signing records.
    pub fn finalize_input(&mut self, input_index: usize) -> Result<()> {
        let state = self.input_signing_state(input_index)?;
        let count = state.signature_count();
        let required = state.required_signatures();
        if count < required {
            return Err(UtxoError::signing(
                input_index,
                format!("has {} of {} required signatures", count, required),
            ));
        }
        let (script_sig, witness) = encode_input(&state, true)?;

        let input = self.input_mut(input_index)?;
        let previous = std::mem::take(input);
        *input = Input {
            non_witness_utxo: previous.non_witness_utxo,
            witness_utxo: previous.witness_utxo,
            final_script_sig: (!script_sig.is_empty()).then_some(script_sig),
            final_script_witness: (!witness.is_empty()).then_some(witness),
            proprietary: previous.proprietary,
            unknown: previous.unknown,
            ..Default::default()
        };
        Ok(())
    }

    /// Finalize every input, reporting all inputs that fail.
    pub fn finalize_mut(&mut self) -> Result<()> {
        let errors: Vec<UtxoError> = (0..self.input_count())
            .filter_map(|input_index| self.finalize_input(input_index).err())
            .collect();
        UtxoError::aggregate(errors)
    }

    /// The network transaction with the final spending data of every input.
    pub fn extract_transaction(&self) -> Result<UtxoTransaction> {
        let errors: Vec<UtxoError> = self
            .psbt
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| {
                input.final_script_sig.is_none() && input.final_script_witness.is_none()
            })
            .map(|(input_index, _)| UtxoError::signing(input_index, "input is not finalized"))
            .collect();
        UtxoError::aggregate(errors)?;

        let mut tx = self.unsigned_transaction();
        for (tx_input, input) in tx.transaction_mut().input.iter_mut().zip(&self.psbt.inputs) {
            tx_input.script_sig = input.final_script_sig.clone().unwrap_or_default();
            tx_input.witness = input.final_script_witness.clone().unwrap_or_default();
        }
        Ok(tx)
    }

    /// Turn a (partially) signed transaction back into a PSBT.
    ///
    /// Scripts and signatures are recovered from each input; multisig
    /// signatures are assigned to their keys by verification.
    pub fn from_signed_transaction(tx: &UtxoTransaction, prevouts: Vec<TxOut>) -> Result<Self> {
        let network = tx.network;
        let (unsigned, prevouts, states) =
            TransactionBuilder::from_transaction(tx.clone(), prevouts)?.into_parts();
        let psbt = Psbt::from_unsigned_tx(unsigned.transaction().clone())
            .map_err(|e| UtxoError::format(e.to_string()))?;
        let mut bitgo_psbt = Self {
            psbt,
            template: unsigned,
        };
        if let Some(branch_id) = bitgo_psbt.template.consensus_branch_id() {
            propkv::set_zec_consensus_branch_id(&mut bitgo_psbt.psbt, branch_id);
        }

        for (input_index, (prevout, state)) in prevouts.into_iter().zip(states).enumerate() {
            let input = &mut bitgo_psbt.psbt.inputs[input_index];
            input.witness_utxo = Some(prevout);
            match state {
                InputSigningState::Unsigned => {}
                InputSigningState::P2ms {
                    public_keys,
                    redeem_script,
                    witness_script,
                    signatures,
                    ..
                } => {
                    input.redeem_script = redeem_script;
                    input.witness_script = witness_script;
                    for (key, signature) in public_keys.iter().zip(signatures) {
                        if let Some(signature) = signature {
                            input.partial_sigs.insert(
                                PublicKey::from(*key),
                                decode_ecdsa_signature(network, &signature)?,
                            );
                        }
                    }
                }
                InputSigningState::TaprootScriptPath {
                    public_keys,
                    leaf_script,
                    control_block,
                    signatures,
                } => {
                    let leaf_hash = TapLeafHash::from_script(&leaf_script, LeafVersion::TapScript);
                    for (key, signature) in public_keys.iter().zip(signatures) {
                        if let Some(signature) = signature {
                            input
                                .tap_script_sigs
                                .insert((*key, leaf_hash), decode_taproot_signature(&signature)?);
                        }
                    }
                    input
                        .tap_scripts
                        .insert(control_block, (leaf_script, LeafVersion::TapScript));
                }
                InputSigningState::TaprootKeyPath { signature } => {
                    input.tap_key_sig = Some(decode_taproot_signature(&signature)?);
                }
                InputSigningState::P2shP2pk {
                    public_key,
                    redeem_script,
                    signature,
                } => {
                    input.redeem_script = Some(redeem_script);
                    if let Some(signature) = signature {
                        input
                            .partial_sigs
                            .insert(public_key, decode_ecdsa_signature(network, &signature)?);
                    }
                }
            }
        }
        Ok(bitgo_psbt)
    }

    /// [`BitGoPsbt::from_signed_transaction`] for a wallet spend, restoring
    /// the key origins of every wallet input.
    pub fn to_wallet_psbt(
        tx: &UtxoTransaction,
        unspents: &[Unspent],
        wallet_keys: &RootWalletKeys,
    ) -> Result<Self> {
        let network = tx.network;
        let prevouts = to_prev_outputs(unspents, network)?;
        let mut bitgo_psbt = Self::from_signed_transaction(tx, prevouts)?;

        for (input_index, unspent) in unspents.iter().enumerate() {
            let UnspentKind::Wallet { chain, index } = unspent.kind(network)? else {
                continue;
            };
            let derived = wallet_keys.derive_for_chain_and_index(chain, index)?;
            let input = &mut bitgo_psbt.psbt.inputs[input_index];
            let sign_path = if input.tap_key_sig.is_some() {
                Some(SignPath {
                    signer: KeyRole::User,
                    cosigner: KeyRole::Bitgo,
                })
            } else {
                input
                    .tap_scripts
                    .values()
                    .next()
                    .and_then(|(leaf_script, _)| parse_p2tr_ns_script_2(leaf_script))
                    .map(|leaf_keys| leaf_sign_path(&derived, &leaf_keys))
                    .transpose()?
            };
            let script_pubkey = update_wallet_input(
                input,
                network,
                wallet_keys,
                ScriptId { chain, index },
                sign_path,
            )?;
            if input.witness_utxo.as_ref().map(|o| &o.script_pubkey) != Some(&script_pubkey) {
                return Err(UtxoError::consistency(format!(
                    "input {}: unspent {} is not the wallet script at {}/{}",
                    input_index, unspent.id, chain, index
                )));
            }
        }
        Ok(bitgo_psbt)
    }
}

fn leaf_sign_path(
    derived: &DerivedWalletKeys,
    leaf_keys: &[XOnlyPublicKey; 2],
) -> Result<SignPath> {
    let role = |key: &XOnlyPublicKey| {
        KeyRole::ALL
            .into_iter()
            .find(|role| to_xonly_pubkey(derived.key(*role)) == *key)
            .ok_or_else(|| UtxoError::consistency("taproot leaf key is not a wallet key"))
    };
    Ok(SignPath {
        signer: role(&leaf_keys[0])?,
        cosigner: role(&leaf_keys[1])?,
    })
}

impl SignatureTarget for BitGoPsbt {
    fn network(&self) -> Network {
        self.template.network
    }

    fn previous_output(&self, input_index: usize) -> Result<OutPoint> {
        self.psbt
            .unsigned_tx
            .input
            .get(input_index)
            .map(|input| input.previous_output)
            .ok_or_else(|| UtxoError::signing(input_index, "input index out of range"))
    }

    fn prevout(&self, input_index: usize) -> Result<TxOut> {
        let input = self.input(input_index)?;
        if let Some(prevout) = &input.witness_utxo {
            return Ok(prevout.clone());
        }
        let vout = self.previous_output(input_index)?.vout as usize;
        input
            .non_witness_utxo
            .as_ref()
            .and_then(|tx| tx.output.get(vout))
            .cloned()
            .ok_or_else(|| {
                UtxoError::consistency(format!(
                    "input {} has neither witness_utxo nor non_witness_utxo",
                    input_index
                ))
            })
    }

    fn signature_hash(
        &self,
        input_index: usize,
        kind: SighashKind,
        sighash_type: u32,
    ) -> Result<[u8; 32]> {
        self.unsigned_transaction()
            .signature_hash(input_index, &self.prevouts()?, kind, sighash_type)
    }

    fn add_multisig_signature(
        &mut self,
        input_index: usize,
        _script_type: OutputScriptType,
        public_keys: &PubTriple,
        scripts: &OutputScript2of3,
        signer_index: usize,
        signature: Vec<u8>,
    ) -> Result<()> {
        let network = self.network();
        let signature = decode_ecdsa_signature(network, &signature)?;
        let input = self.input_mut(input_index)?;
        for (existing, expected) in [
            (&mut input.redeem_script, &scripts.redeem_script),
            (&mut input.witness_script, &scripts.witness_script),
        ] {
            match existing {
                Some(script) if Some(&*script) != expected.as_ref() => {
                    return Err(UtxoError::consistency(format!(
                        "input {} carries a different multisig script",
                        input_index
                    )));
                }
                _ => *existing = expected.clone(),
            }
        }
        input
            .partial_sigs
            .insert(PublicKey::from(public_keys[signer_index]), signature);
        Ok(())
    }

    fn add_taproot_script_signature(
        &mut self,
        input_index: usize,
        spend: &SpendScriptP2tr,
        signer: XOnlyPublicKey,
        signature: Vec<u8>,
    ) -> Result<()> {
        let signature = decode_taproot_signature(&signature)?;
        let input = self.input_mut(input_index)?;
        input.tap_scripts.insert(
            spend.control_block.clone(),
            (spend.witness_script.clone(), spend.leaf_version),
        );
        input
            .tap_script_sigs
            .insert((signer, spend.leaf_hash), signature);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_script_wallet::parse_input::get_strict_signature_count;
    use crate::fixed_script_wallet::replay_protection::ReplayProtection;
    use crate::fixed_script_wallet::signer::sign_input_2of3;
    use crate::fixed_script_wallet::test_utils::*;
    use crate::fixed_script_wallet::verify::verify_transaction;
    use crate::fixed_script_wallet::wallet_keys::tests::{
        get_test_wallet_keys, get_test_wallet_xprvs,
    };
    use crate::fixed_script_wallet::wallet_scripts::Scope;
    use rstest::rstest;

    const VALUE: u64 = 100_000;

    fn outpoint(vout: u32) -> OutPoint {
        OutPoint {
            txid: GOLDEN_TXID.parse().unwrap(),
            vout,
        }
    }

    struct Party {
        secret: secp256k1::SecretKey,
        public: CompressedPublicKey,
    }

    fn party(seed: &str, role: KeyRole, chain: u32, index: u32) -> Party {
        let keys = get_test_wallet_keys(seed);
        let xprv = keys
            .derive_signer(&get_test_wallet_xprvs(seed)[role.index()], chain, index)
            .unwrap();
        Party {
            secret: xprv.private_key,
            public: keys.derive_for_chain_and_index(chain, index).unwrap().key(role),
        }
    }

    fn sign(
        psbt: BitGoPsbt,
        script_type: OutputScriptType,
        chain: u32,
        signer: &Party,
        cosigner: &Party,
    ) -> BitGoPsbt {
        let public_keys = get_test_wallet_keys("psbt")
            .derive_for_chain_and_index(chain, 0)
            .unwrap()
            .pub_triple();
        sign_input_2of3(
            psbt,
            0,
            script_type,
            &public_keys,
            &signer.secret,
            &cosigner.public,
            VALUE,
            None,
        )
        .unwrap()
    }

    #[test]
    fn unsign_and_finalize_golden() {
        let tx = tx_from_hex(GOLDEN_FULL_SIGNED);
        let mut psbt = BitGoPsbt::from_signed_transaction(&tx, golden_prevouts()).unwrap();
        assert_eq!(psbt.psbt().inputs[0].partial_sigs.len(), 2);
        assert!(psbt.psbt().unsigned_tx.input[0].script_sig.is_empty());

        psbt.finalize_mut().unwrap();
        assert_eq!(psbt.extract_transaction().unwrap().to_hex().unwrap(), GOLDEN_FULL_SIGNED);
    }

    #[test]
    fn half_signed_golden_needs_cosigner() {
        let tx = tx_from_hex(GOLDEN_HALF_SIGNED);
        let mut psbt = BitGoPsbt::from_signed_transaction(&tx, golden_prevouts()).unwrap();
        assert_eq!(
            extract_half_signed_legacy_tx(&psbt).unwrap().to_hex().unwrap(),
            GOLDEN_HALF_SIGNED
        );
        assert!(matches!(
            psbt.extract_transaction(),
            Err(UtxoError::Signing { input_index: 0, .. })
        ));
        let err = psbt.finalize_mut().unwrap_err();
        assert!(matches!(err, UtxoError::Signing { input_index: 0, .. }));
    }

    #[test]
    fn wallet_psbt_restores_derivations_and_completes() {
        let tx = tx_from_hex(GOLDEN_HALF_SIGNED);
        let psbt =
            BitGoPsbt::to_wallet_psbt(&tx, &[golden_unspent()], &golden_wallet_keys()).unwrap();
        let input = &psbt.psbt().inputs[0];
        assert_eq!(input.bip32_derivation.len(), 3);
        assert_eq!(input.partial_sigs.len(), 1);

        let bytes = psbt.serialize().unwrap();
        let psbt = BitGoPsbt::deserialize(&bytes, Network::Bitcoin).unwrap();

        let keys = golden_wallet_keys();
        let backup = keys.derive_signer(&golden_xprvs()[1], 0, 0).unwrap().private_key;
        let derived = keys.derive_for_chain_and_index(0, 0).unwrap();
        let mut psbt = sign_input_2of3(
            psbt,
            0,
            OutputScriptType::P2sh,
            &derived.pub_triple(),
            &backup,
            &derived.key(KeyRole::User),
            GOLDEN_VALUE,
            None,
        )
        .unwrap();
        psbt.finalize_mut().unwrap();
        assert_eq!(psbt.extract_transaction().unwrap().to_hex().unwrap(), GOLDEN_FULL_SIGNED);
    }

    #[test]
    fn wallet_psbt_rejects_foreign_unspent() {
        let tx = tx_from_hex(GOLDEN_HALF_SIGNED);
        let mut unspent = golden_unspent();
        unspent.index = Some(1);
        assert!(matches!(
            BitGoPsbt::to_wallet_psbt(&tx, &[unspent], &golden_wallet_keys()),
            Err(UtxoError::Consistency(_))
        ));
    }

    #[rstest]
    #[case::p2sh(OutputScriptType::P2sh, KeyRole::Bitgo)]
    #[case::p2sh_p2wsh(OutputScriptType::P2shP2wsh, KeyRole::Bitgo)]
    #[case::p2wsh(OutputScriptType::P2wsh, KeyRole::Bitgo)]
    #[case::p2tr_legacy(OutputScriptType::P2trLegacy, KeyRole::Bitgo)]
    #[case::p2tr_musig2(OutputScriptType::P2trMusig2, KeyRole::Backup)]
    fn sign_serialize_finalize(#[case] script_type: OutputScriptType, #[case] cosigner: KeyRole) {
        let keys = get_test_wallet_keys("psbt");
        let chain = Chain::new(script_type, Scope::External).value();
        let mut psbt = BitGoPsbt::new(Network::Bitcoin).unwrap();
        psbt.add_wallet_input(
            outpoint(0),
            VALUE,
            &keys,
            ScriptId { chain, index: 0 },
            WalletInputOptions {
                sign_path: Some(SignPath {
                    signer: KeyRole::User,
                    cosigner,
                }),
                ..Default::default()
            },
        )
        .unwrap();
        psbt.add_output_address(GOLDEN_RECIPIENT, VALUE - 1_000).unwrap();
        psbt.add_wallet_output(&keys, ScriptId { chain: chain + 1, index: 7 }, 500)
            .unwrap();

        let user = party("psbt", KeyRole::User, chain, 0);
        let cosigner = party("psbt", cosigner, chain, 0);
        let psbt = sign(psbt, script_type, chain, &user, &cosigner);

        let bytes = psbt.serialize().unwrap();
        let decoded = BitGoPsbt::deserialize(&bytes, Network::Bitcoin).unwrap();
        assert_eq!(decoded, psbt);

        let mut psbt = sign(decoded, script_type, chain, &cosigner, &user);
        psbt.finalize_mut().unwrap();
        let tx = psbt.extract_transaction().unwrap();
        let prevouts = psbt.prevouts().unwrap();
        verify_transaction(&tx, &prevouts, &ReplayProtection::default()).unwrap();
        assert_eq!(get_strict_signature_count(&tx.transaction().input[0]).unwrap(), 2);

        let unsigned = BitGoPsbt::from_signed_transaction(&tx, prevouts).unwrap();
        let mut refinalized = unsigned.clone();
        refinalized.finalize_mut().unwrap();
        assert_eq!(refinalized.extract_transaction().unwrap(), tx);
    }

    #[test]
    fn musig2_key_path_records() {
        let keys = get_test_wallet_keys("psbt");
        let mut psbt = BitGoPsbt::new(Network::Bitcoin).unwrap();
        psbt.add_wallet_input(
            outpoint(1),
            VALUE,
            &keys,
            ScriptId { chain: 40, index: 3 },
            WalletInputOptions::default(),
        )
        .unwrap();
        let input = &psbt.psbt().inputs[0];
        assert!(input.tap_internal_key.is_some());
        assert!(input.tap_scripts.is_empty());
        assert_eq!(input.tap_key_origins.len(), 2);
        let kv = propkv::find_kv(
            ProprietaryKeySubtype::Musig2ParticipantPubKeys,
            &input.proprietary,
        )
        .next()
        .unwrap();
        let participants = Musig2Participants::from_key_value(&kv).unwrap();
        let derived = keys.derive_for_chain_and_index(40, 3).unwrap();
        assert_eq!(
            participants.participants,
            [derived.key(KeyRole::User), derived.key(KeyRole::Bitgo)]
        );
        assert_eq!(participants.internal_key, input.tap_internal_key.unwrap());
    }

    #[test]
    fn legacy_taproot_needs_sign_path() {
        let mut psbt = BitGoPsbt::new(Network::Bitcoin).unwrap();
        let result = psbt.add_wallet_input(
            outpoint(0),
            VALUE,
            &get_test_wallet_keys("psbt"),
            ScriptId { chain: 30, index: 0 },
            WalletInputOptions::default(),
        );
        assert!(matches!(result, Err(UtxoError::Configuration(_))));
        assert_eq!(psbt.input_count(), 0);
    }

    #[test]
    fn fork_id_signatures() {
        let keys = get_test_wallet_keys("psbt");
        let mut psbt = BitGoPsbt::new(Network::BitcoinCash).unwrap();
        psbt.add_wallet_input(
            outpoint(0),
            VALUE,
            &keys,
            ScriptId { chain: 0, index: 0 },
            WalletInputOptions::default(),
        )
        .unwrap();
        let script = psbt.prevouts().unwrap()[0].script_pubkey.clone();
        psbt.add_output(script, VALUE - 1_000);

        let user = party("psbt", KeyRole::User, 0, 0);
        let bitgo = party("psbt", KeyRole::Bitgo, 0, 0);
        let psbt = sign(psbt, OutputScriptType::P2sh, 0, &user, &bitgo);
        let (_, sig) = psbt.psbt().inputs[0].partial_sigs.iter().next().unwrap();
        assert_eq!(sig.sighash_type, EcdsaSighashType::All);

        let bytes = psbt.serialize().unwrap();
        let decoded = BitGoPsbt::deserialize(&bytes, Network::BitcoinCash).unwrap();
        assert_eq!(decoded, psbt);
        assert_eq!(decoded.serialize().unwrap(), bytes);
        assert!(matches!(
            BitGoPsbt::deserialize(&bytes, Network::Bitcoin),
            Err(UtxoError::Format(_))
        ));

        let mut psbt = sign(decoded, OutputScriptType::P2sh, 0, &bitgo, &user);
        psbt.finalize_mut().unwrap();
        let tx = psbt.extract_transaction().unwrap();
        verify_transaction(
            &tx,
            &psbt.prevouts().unwrap(),
            &ReplayProtection::for_network(Network::BitcoinCash),
        )
        .unwrap();
    }

    #[test]
    fn fork_id_network_rejects_plain_sighash() {
        let keys = get_test_wallet_keys("psbt");
        let mut psbt = BitGoPsbt::new(Network::BitcoinCash).unwrap();
        psbt.add_wallet_input(
            outpoint(0),
            VALUE,
            &keys,
            ScriptId { chain: 0, index: 0 },
            WalletInputOptions::default(),
        )
        .unwrap();
        let user = party("psbt", KeyRole::User, 0, 0);
        let bitgo = party("psbt", KeyRole::Bitgo, 0, 0);
        let public_keys = keys.derive_for_chain_and_index(0, 0).unwrap().pub_triple();
        let result = sign_input_2of3(
            psbt,
            0,
            OutputScriptType::P2sh,
            &public_keys,
            &user.secret,
            &bitgo.public,
            VALUE,
            Some(0x01),
        );
        assert!(matches!(result, Err(UtxoError::Format(_))));
    }

    #[rstest]
    #[case(OutputScriptType::P2sh, true, false)]
    #[case(OutputScriptType::P2shP2wsh, true, true)]
    #[case(OutputScriptType::P2wsh, false, true)]
    fn wallet_input_script_records(
        #[case] script_type: OutputScriptType,
        #[case] has_redeem: bool,
        #[case] has_witness: bool,
    ) {
        let keys = get_test_wallet_keys("psbt");
        let chain = Chain::new(script_type, Scope::External).value();
        let mut psbt = BitGoPsbt::new(Network::Bitcoin).unwrap();
        psbt.add_wallet_input(
            outpoint(0),
            VALUE,
            &keys,
            ScriptId { chain, index: 0 },
            WalletInputOptions::default(),
        )
        .unwrap();
        let input = &psbt.psbt().inputs[0];
        assert_eq!(input.redeem_script.is_some(), has_redeem);
        assert_eq!(input.witness_script.is_some(), has_witness);
        if let (Some(redeem), Some(witness)) = (&input.redeem_script, &input.witness_script) {
            assert_eq!(redeem, &witness.to_p2wsh());
        }
        let script_pubkey = &psbt.prevouts().unwrap()[0].script_pubkey;
        match &input.redeem_script {
            Some(redeem) => assert_eq!(script_pubkey, &redeem.to_p2sh()),
            None => assert_eq!(
                Some(script_pubkey.clone()),
                input.witness_script.as_ref().map(|w| w.to_p2wsh())
            ),
        }
    }

    #[rstest]
    #[case(Network::Zcash, 1_687_104, 0xc2d6_d0b4)]
    #[case(Network::Zcash, 2_800_000, 0xc8e7_1055)]
    #[case(Network::ZcashTestnet, 1_030_000, 0xe9ff_75a6)]
    fn zcash_psbt_at_height_uses_active_branch_id(
        #[case] network: Network,
        #[case] height: u32,
        #[case] branch_id: u32,
    ) {
        let psbt = BitGoPsbt::new_zcash_at_height(network, height).unwrap();
        assert_eq!(psbt.consensus_branch_id(), Some(branch_id));
        assert_eq!(propkv::get_zec_consensus_branch_id(psbt.psbt()), Some(branch_id));
    }

    #[test]
    fn zcash_psbt_at_height_rejects_other_networks() {
        assert!(BitGoPsbt::new_zcash_at_height(Network::Zcash, 100).is_err());
        assert!(BitGoPsbt::new_zcash_at_height(Network::Litecoin, 3_000_000).is_err());
    }

    #[test]
    fn zcash_psbt_keeps_layout_and_branch_id() {
        let keys = get_test_wallet_keys("psbt");
        let mut psbt = BitGoPsbt::new(Network::Zcash).unwrap();
        assert_eq!(
            propkv::get_zec_consensus_branch_id(psbt.psbt()),
            psbt.consensus_branch_id()
        );
        psbt.set_consensus_branch_id(0xc8e7_1055).unwrap();
        psbt.add_wallet_input(
            outpoint(0),
            VALUE,
            &keys,
            ScriptId { chain: 0, index: 0 },
            WalletInputOptions::default(),
        )
        .unwrap();
        let script = psbt.prevouts().unwrap()[0].script_pubkey.clone();
        psbt.add_output(script, VALUE - 1_000);

        let bytes = psbt.serialize().unwrap();
        let unsigned = psbt.unsigned_transaction().to_hex().unwrap();
        assert!(hex::encode(&bytes).contains(&unsigned));

        let decoded = BitGoPsbt::deserialize(&bytes, Network::Zcash).unwrap();
        assert_eq!(decoded.consensus_branch_id(), Some(0xc8e7_1055));
        assert_eq!(decoded, psbt);

        let user = party("psbt", KeyRole::User, 0, 0);
        let bitgo = party("psbt", KeyRole::Bitgo, 0, 0);
        let psbt = sign(decoded, OutputScriptType::P2sh, 0, &user, &bitgo);
        let mut psbt = sign(psbt, OutputScriptType::P2sh, 0, &bitgo, &user);
        psbt.finalize_mut().unwrap();
        let tx = psbt.extract_transaction().unwrap();
        assert_eq!(tx.consensus_branch_id(), Some(0xc8e7_1055));
        verify_transaction(&tx, &psbt.prevouts().unwrap(), &ReplayProtection::default()).unwrap();
    }

    #[test]
    fn replay_protection_input() {
        let key = get_test_wallet_keys("replay")
            .derive_for_chain_and_index(0, 0)
            .unwrap()
            .key(KeyRole::User);
        let mut psbt = BitGoPsbt::new(Network::BitcoinCash).unwrap();
        let input_index = psbt.add_replay_protection_input(outpoint(2), key, 1_000, None);
        let input = &psbt.psbt().inputs[input_index];
        assert_eq!(
            input.sighash_type,
            Some(PsbtSighashType::from_u32(0x41))
        );
        assert_eq!(
            psbt.prevouts().unwrap()[0].script_pubkey,
            ScriptP2shP2pk::new(key).output_script()
        );
        assert!(matches!(
            psbt.finalize_mut(),
            Err(UtxoError::Signing { input_index: 0, .. })
        ));
    }

    #[test]
    fn previous_transaction_must_match() {
        let golden = tx_from_hex(GOLDEN_FULL_SIGNED);
        let prev_bytes = golden.to_bytes().unwrap();
        let outpoint = OutPoint {
            txid: golden.txid().unwrap(),
            vout: 0,
        };
        let mut psbt = BitGoPsbt::new(Network::Bitcoin).unwrap();
        let result = psbt.add_wallet_input(
            outpoint,
            GOLDEN_OUTPUT_VALUE,
            &golden_wallet_keys(),
            ScriptId { chain: 0, index: 0 },
            WalletInputOptions {
                prev_tx: Some(&prev_bytes),
                ..Default::default()
            },
        );
        // the golden spend pays a p2pkh output, not the wallet script
        assert!(matches!(result, Err(UtxoError::Consistency(_))));
    }
}

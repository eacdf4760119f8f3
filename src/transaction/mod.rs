//! Network-specific transactions behind one interface.
//!
//! [`UtxoTransaction`] pairs a [`Network`] with the codec for its family and
//! selects the signature hash transcript for each input.

pub mod sighash;

use crate::bitcoin::consensus::{deserialize, serialize};
use crate::bitcoin::hashes::{sha256d, Hash};
use crate::bitcoin::locktime::absolute::LockTime;
use crate::bitcoin::psbt::{Psbt, PsbtSighashType};
use crate::bitcoin::secp256k1::Message;
use crate::bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use crate::bitcoin::taproot::TapLeafHash;
use crate::bitcoin::transaction::Version;
use crate::bitcoin::{Script, ScriptBuf, Transaction, TxOut, Txid, Witness};
use crate::dash::{decode_dash_transaction_parts, encode_dash_transaction_parts, DashTransactionParts};
use crate::error::{Result, UtxoError};
use crate::litecoin::{decode_litecoin_transaction, encode_litecoin_transaction, LitecoinTransaction};
use crate::networks::{CoinFamily, Network, SIGHASH_FORKID};
use crate::zcash::{
    decode_zcash_transaction_parts, encode_zcash_transaction_parts, sighash as zcash_sighash,
    ZcashTransactionParts,
};

use self::sighash::{bip143_signature_hash, legacy_signature_hash, SighashFields};

/// Common view over the per-network transaction encodings.
pub trait SerializableTransaction {
    /// The bitcoin-compatible part of the transaction.
    fn transaction(&self) -> &Transaction;
    fn transaction_mut(&mut self) -> &mut Transaction;
    /// Wire encoding of the transaction.
    fn to_bytes(&self) -> Result<Vec<u8>>;
    fn byte_length(&self) -> Result<usize> {
        self.to_bytes().map(|b| b.len())
    }
    fn txid(&self) -> Result<Txid>;
}

impl SerializableTransaction for Transaction {
    fn transaction(&self) -> &Transaction {
        self
    }

    fn transaction_mut(&mut self) -> &mut Transaction {
        self
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serialize(self))
    }

    fn txid(&self) -> Result<Txid> {
        Ok(self.compute_txid())
    }
}

impl SerializableTransaction for LitecoinTransaction {
    fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_litecoin_transaction(self).map_err(UtxoError::Format)
    }

    fn txid(&self) -> Result<Txid> {
        Ok(LitecoinTransaction::txid(self))
    }
}

fn sha256d_txid(bytes: &[u8]) -> Txid {
    Txid::from_byte_array(sha256d::Hash::hash(bytes).to_byte_array())
}

impl SerializableTransaction for DashTransactionParts {
    fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_dash_transaction_parts(self).map_err(UtxoError::Format)
    }

    fn txid(&self) -> Result<Txid> {
        Ok(sha256d_txid(&self.to_bytes()?))
    }
}

impl SerializableTransaction for ZcashTransactionParts {
    fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        encode_zcash_transaction_parts(self)
    }

    fn txid(&self) -> Result<Txid> {
        if self.is_nu5() {
            Ok(Txid::from_byte_array(zcash_sighash::txid_digest_v5(self)?))
        } else {
            Ok(sha256d_txid(&self.to_bytes()?))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionVariant {
    /// Bitcoin and the networks sharing its encoding (fork-id coins, Dogecoin).
    Bitcoin(Transaction),
    Litecoin(LitecoinTransaction),
    Dash(DashTransactionParts),
    Zcash(ZcashTransactionParts),
}

impl TransactionVariant {
    fn inner(&self) -> &dyn SerializableTransaction {
        match self {
            TransactionVariant::Bitcoin(tx) => tx,
            TransactionVariant::Litecoin(tx) => tx,
            TransactionVariant::Dash(tx) => tx,
            TransactionVariant::Zcash(tx) => tx,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SerializableTransaction {
        match self {
            TransactionVariant::Bitcoin(tx) => tx,
            TransactionVariant::Litecoin(tx) => tx,
            TransactionVariant::Dash(tx) => tx,
            TransactionVariant::Zcash(tx) => tx,
        }
    }
}

/// What a signature on an input commits to, besides the transaction.
#[derive(Debug, Clone, Copy)]
pub enum SighashKind<'a> {
    /// ECDSA inputs. `script_code` is the redeem or witness script.
    Ecdsa { script_code: &'a Script, segwit: bool },
    TaprootScriptPath { leaf_hash: TapLeafHash },
    TaprootKeyPath,
}

/// A transaction together with the network whose rules it follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoTransaction {
    pub network: Network,
    pub variant: TransactionVariant,
}

impl UtxoTransaction {
    /// An empty transaction with the network's default version.
    pub fn new(network: Network) -> Result<Self> {
        let tx = Transaction {
            version: Version::non_standard(network.default_transaction_version()),
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        Self::with_transaction(network, tx)
    }

    /// Wrap a bitcoin-layout transaction in the variant of `network`.
    pub fn with_transaction(network: Network, tx: Transaction) -> Result<Self> {
        let variant = match network.family() {
            CoinFamily::Dash => TransactionVariant::Dash(DashTransactionParts::new(tx)),
            CoinFamily::Zcash => TransactionVariant::Zcash(ZcashTransactionParts::new(tx)?),
            CoinFamily::Litecoin => TransactionVariant::Litecoin(LitecoinTransaction::new(tx)),
            CoinFamily::Bitcoin
            | CoinFamily::BitcoinCash
            | CoinFamily::Ecash
            | CoinFamily::BitcoinGold
            | CoinFamily::BitcoinSV
            | CoinFamily::Dogecoin => TransactionVariant::Bitcoin(tx),
        };
        Ok(Self { network, variant })
    }

    pub fn from_bytes(bytes: &[u8], network: Network) -> Result<Self> {
        log::debug!("decoding {} transaction ({} bytes)", network, bytes.len());
        let variant = match network.family() {
            CoinFamily::Dash => TransactionVariant::Dash(
                decode_dash_transaction_parts(bytes).map_err(UtxoError::Format)?,
            ),
            CoinFamily::Zcash => TransactionVariant::Zcash(decode_zcash_transaction_parts(bytes)?),
            CoinFamily::Litecoin => TransactionVariant::Litecoin(
                decode_litecoin_transaction(bytes).map_err(UtxoError::Format)?,
            ),
            _ => TransactionVariant::Bitcoin(deserialize(bytes)?),
        };
        Ok(Self { network, variant })
    }

    pub fn from_hex(hex_str: &str, network: Network) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| UtxoError::format(format!("invalid transaction hex: {}", e)))?;
        Self::from_bytes(&bytes, network)
    }

    pub fn to_hex(&self) -> Result<String> {
        self.to_bytes().map(hex::encode)
    }

    /// Change the version; Zcash transactions pick up the defaults of the new version.
    pub fn set_version(&mut self, version: i32) -> Result<()> {
        match &mut self.variant {
            TransactionVariant::Zcash(parts) => {
                let mut tx = parts.transaction.clone();
                tx.version = Version::non_standard(version);
                let expiry_height = parts.expiry_height;
                *parts = ZcashTransactionParts::new(tx)?;
                if parts.is_overwintered {
                    parts.expiry_height = expiry_height.or(Some(0));
                }
            }
            variant => variant.inner_mut().transaction_mut().version = Version::non_standard(version),
        }
        Ok(())
    }

    pub fn set_consensus_branch_id(&mut self, branch_id: u32) -> Result<()> {
        match &mut self.variant {
            TransactionVariant::Zcash(parts) => {
                parts.consensus_branch_id = branch_id;
                Ok(())
            }
            _ => Err(UtxoError::configuration(format!(
                "{} has no consensus branch id",
                self.network
            ))),
        }
    }

    pub fn consensus_branch_id(&self) -> Option<u32> {
        match &self.variant {
            TransactionVariant::Zcash(parts) => Some(parts.consensus_branch_id),
            _ => None,
        }
    }

    /// Signature hash of `input_index`.
    ///
    /// `prevouts` holds the output spent by each input. Only taproot and
    /// Zcash v5 need every entry; the other transcripts use the entry at
    /// `input_index`.
    pub fn signature_hash(
        &self,
        input_index: usize,
        prevouts: &[TxOut],
        kind: SighashKind,
        sighash_type: u32,
    ) -> Result<[u8; 32]> {
        let tx = self.transaction();
        if input_index >= tx.input.len() {
            return Err(UtxoError::signing(input_index, "input index out of range"));
        }
        let prevout = prevouts.get(input_index).ok_or_else(|| {
            UtxoError::consistency(format!("missing previous output for input {}", input_index))
        })?;

        match kind {
            SighashKind::TaprootScriptPath { .. } | SighashKind::TaprootKeyPath => {
                self.network.output_script_support().assert_taproot()?;
                if prevouts.len() != tx.input.len() {
                    return Err(UtxoError::consistency(format!(
                        "taproot signature hash needs {} previous outputs, got {}",
                        tx.input.len(),
                        prevouts.len()
                    )));
                }
                let sighash_type = u8::try_from(sighash_type)
                    .ok()
                    .and_then(|t| TapSighashType::from_consensus_u8(t).ok())
                    .ok_or_else(|| {
                        UtxoError::signing(
                            input_index,
                            format!("invalid taproot sighash type {:#x}", sighash_type),
                        )
                    })?;
                let mut cache = SighashCache::new(tx);
                let prevouts = Prevouts::All(prevouts);
                let hash = match kind {
                    SighashKind::TaprootScriptPath { leaf_hash } => {
                        log::debug!("input {}: taproot script path sighash", input_index);
                        cache.taproot_script_spend_signature_hash(
                            input_index,
                            &prevouts,
                            leaf_hash,
                            sighash_type,
                        )
                    }
                    _ => {
                        log::debug!("input {}: taproot key path sighash", input_index);
                        cache.taproot_key_spend_signature_hash(input_index, &prevouts, sighash_type)
                    }
                }
                .map_err(|e| UtxoError::signing(input_index, e.to_string()))?;
                Ok(hash.to_byte_array())
            }
            SighashKind::Ecdsa {
                script_code,
                segwit,
            } => self.ecdsa_signature_hash(
                input_index,
                prevouts,
                prevout,
                script_code,
                segwit,
                sighash_type,
            ),
        }
    }

    fn ecdsa_signature_hash(
        &self,
        input_index: usize,
        prevouts: &[TxOut],
        prevout: &TxOut,
        script_code: &Script,
        segwit: bool,
        sighash_type: u32,
    ) -> Result<[u8; 32]> {
        let tx = self.transaction();
        if let TransactionVariant::Zcash(parts) = &self.variant {
            if parts.is_nu5() {
                log::debug!("input {}: zcash v5 sighash", input_index);
                return zcash_sighash::signature_hash_v5(parts, input_index, prevouts, sighash_type);
            }
            if parts.is_sapling_compatible() {
                log::debug!("input {}: zcash v4 sighash", input_index);
                let version_group_id = parts.version_group_id.ok_or_else(|| {
                    UtxoError::consistency("sapling transaction without version group id")
                })?;
                let psbt =
                    single_input_psbt(tx, input_index, prevout, script_code, sighash_type)?;
                let mut cache = SighashCache::new(&psbt.unsigned_tx);
                let (msg, _) = psbt
                    .sighash_zcash(
                        input_index,
                        &mut cache,
                        parts.consensus_branch_id,
                        version_group_id,
                        parts.expiry_height.unwrap_or(0),
                    )
                    .map_err(|e| UtxoError::signing(input_index, e.to_string()))?;
                return Ok(message_digest(&msg));
            }
            if parts.is_overwinter_compatible() {
                log::debug!("input {}: zcash v3 sighash", input_index);
                return zcash_sighash::signature_hash_v3(
                    parts,
                    input_index,
                    script_code,
                    prevout.value.to_sat(),
                    sighash_type,
                );
            }
        }

        if let Some(fork_id) = self.network.fork_id() {
            if sighash_type & SIGHASH_FORKID != 0 {
                log::debug!(
                    "input {}: fork id {} sighash, type {:#x}",
                    input_index,
                    fork_id,
                    sighash_type
                );
                let psbt =
                    single_input_psbt(tx, input_index, prevout, script_code, sighash_type)?;
                let mut cache = SighashCache::new(&psbt.unsigned_tx);
                let (msg, _) = psbt
                    .sighash_forkid(input_index, &mut cache, fork_id)
                    .map_err(|e| UtxoError::signing(input_index, e.to_string()))?;
                return Ok(message_digest(&msg));
            }
        }

        let (version, trailer) = match &self.variant {
            TransactionVariant::Dash(parts) => (
                parts.wire_version().map_err(UtxoError::Format)?,
                parts.payload_trailer().map_err(UtxoError::Format)?,
            ),
            _ => (tx.version.0 as u32, vec![]),
        };
        let fields = SighashFields {
            version,
            input: &tx.input,
            output: &tx.output,
            lock_time: tx.lock_time.to_consensus_u32(),
            trailer: &trailer,
        };
        if segwit {
            Ok(bip143_signature_hash(
                &fields,
                input_index,
                script_code,
                prevout.value.to_sat(),
                sighash_type,
            ))
        } else {
            Ok(legacy_signature_hash(
                &fields,
                input_index,
                script_code,
                sighash_type,
            ))
        }
    }
}

/// Unsigned PSBT over `tx` with the records `Psbt::sighash_forkid` and
/// `Psbt::sighash_zcash` read for `input_index`.
fn single_input_psbt(
    tx: &Transaction,
    input_index: usize,
    prevout: &TxOut,
    script_code: &Script,
    sighash_type: u32,
) -> Result<Psbt> {
    let mut unsigned = tx.clone();
    for input in &mut unsigned.input {
        input.script_sig = ScriptBuf::new();
        input.witness = Witness::new();
    }
    let mut psbt =
        Psbt::from_unsigned_tx(unsigned).map_err(|e| UtxoError::format(e.to_string()))?;
    let input = psbt
        .inputs
        .get_mut(input_index)
        .ok_or_else(|| UtxoError::signing(input_index, "input index out of range"))?;
    input.witness_utxo = Some(prevout.clone());
    if prevout.script_pubkey.is_p2sh() {
        input.redeem_script = Some(script_code.to_owned());
    }
    input.sighash_type = Some(PsbtSighashType::from_u32(sighash_type));
    Ok(psbt)
}

fn message_digest(msg: &Message) -> [u8; 32] {
    let digest: &[u8; 32] = msg.as_ref();
    *digest
}

impl SerializableTransaction for UtxoTransaction {
    fn transaction(&self) -> &Transaction {
        self.variant.inner().transaction()
    }

    fn transaction_mut(&mut self) -> &mut Transaction {
        self.variant.inner_mut().transaction_mut()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        self.variant.inner().to_bytes()
    }

    fn txid(&self) -> Result<Txid> {
        self.variant.inner().txid()
    }
}

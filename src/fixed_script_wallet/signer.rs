//! Producing one party's signature for one input of a 2-of-3 spend.
//!
//! Signing is generic over [`SignatureTarget`], implemented by both the
//! [`TransactionBuilder`] and [`BitGoPsbt`](crate::fixed_script_wallet::bitgo_psbt::BitGoPsbt).

use crate::bitcoin::bip32::{Xpriv, Xpub};
use crate::bitcoin::secp256k1::{Keypair, Message, Secp256k1, SecretKey};
use crate::bitcoin::{CompressedPublicKey, OutPoint, PublicKey, TxOut, XOnlyPublicKey};
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::transaction_builder::TransactionBuilder;
use crate::fixed_script_wallet::unspent::{Unspent, UnspentKind};
use crate::fixed_script_wallet::verify::{verify_signature, VerificationSettings};
use crate::fixed_script_wallet::wallet_keys::{KeyRole, PubTriple, RootWalletKeys};
use crate::fixed_script_wallet::wallet_scripts::{
    create_output_script_2of3, create_spend_script_p2tr, script_type_for_chain, to_xonly_pubkey,
    OutputScript2of3, OutputScriptType, SpendScriptP2tr, WalletScripts,
};
use crate::networks::{Network, SIGHASH_DEFAULT};
use crate::transaction::{SighashKind, UtxoTransaction};

/// An in-progress transaction that can accept wallet signatures.
pub trait SignatureTarget {
    fn network(&self) -> Network;

    /// Outpoint spent by `input_index`.
    fn previous_output(&self, input_index: usize) -> Result<OutPoint>;

    /// Output spent by `input_index`.
    fn prevout(&self, input_index: usize) -> Result<TxOut>;

    fn signature_hash(
        &self,
        input_index: usize,
        kind: SighashKind,
        sighash_type: u32,
    ) -> Result<[u8; 32]>;

    /// Record an ECDSA signature (DER plus sighash byte) of `public_keys[signer_index]`.
    fn add_multisig_signature(
        &mut self,
        input_index: usize,
        script_type: OutputScriptType,
        public_keys: &PubTriple,
        scripts: &OutputScript2of3,
        signer_index: usize,
        signature: Vec<u8>,
    ) -> Result<()>;

    /// Record a Schnorr signature of `signer` for the leaf in `spend`.
    fn add_taproot_script_signature(
        &mut self,
        input_index: usize,
        spend: &SpendScriptP2tr,
        signer: XOnlyPublicKey,
        signature: Vec<u8>,
    ) -> Result<()>;
}

fn key_role(public_keys: &PubTriple, key: &CompressedPublicKey) -> Option<KeyRole> {
    KeyRole::ALL
        .into_iter()
        .find(|role| public_keys[role.index()] == *key)
}

/// Sign `input_index` as one party of the 2-of-3 wallet.
///
/// `amount` must equal the value of the spent output and the output script
/// must be the one derived from `public_keys`. `sighash_type` defaults to
/// the network default for ECDSA and `SIGHASH_DEFAULT` for taproot.
#[allow(clippy::too_many_arguments)]
pub fn sign_input_2of3_mut<T: SignatureTarget + ?Sized>(
    target: &mut T,
    input_index: usize,
    script_type: OutputScriptType,
    public_keys: &PubTriple,
    signer: &SecretKey,
    cosigner: &CompressedPublicKey,
    amount: u64,
    sighash_type: Option<u32>,
) -> Result<()> {
    let network = target.network();
    let secp = Secp256k1::new();

    let scripts = WalletScripts::new(public_keys, script_type, &network.output_script_support())?;
    let prevout = target.prevout(input_index)?;
    if prevout.value.to_sat() != amount {
        return Err(UtxoError::consistency(format!(
            "input {}: amount {} does not match previous output value {}",
            input_index,
            amount,
            prevout.value.to_sat()
        )));
    }
    if prevout.script_pubkey != scripts.output_script() {
        return Err(UtxoError::consistency(format!(
            "input {}: previous output script does not match {} wallet script",
            input_index, script_type
        )));
    }

    let signer_pub = CompressedPublicKey(signer.public_key(&secp));
    let signer_role = key_role(public_keys, &signer_pub)
        .ok_or_else(|| UtxoError::configuration("signer key is not part of the wallet keys"))?;
    let cosigner_role = key_role(public_keys, cosigner)
        .ok_or_else(|| UtxoError::configuration("cosigner key is not part of the wallet keys"))?;
    if signer_role == cosigner_role {
        return Err(UtxoError::configuration("signer and cosigner must differ"));
    }

    match script_type {
        OutputScriptType::P2sh | OutputScriptType::P2shP2wsh | OutputScriptType::P2wsh => {
            let output = create_output_script_2of3(public_keys, script_type)?;
            let sighash_type = sighash_type.unwrap_or_else(|| network.default_sighash_type());
            let (script_code, segwit) = match (&output.witness_script, &output.redeem_script) {
                (Some(witness_script), _) => (witness_script, true),
                (None, Some(redeem_script)) => (redeem_script, false),
                (None, None) => {
                    return Err(UtxoError::configuration("multisig output without script"))
                }
            };
            let hash = target.signature_hash(
                input_index,
                SighashKind::Ecdsa {
                    script_code,
                    segwit,
                },
                sighash_type,
            )?;
            let msg = Message::from_digest(hash);
            let mut signature = secp.sign_ecdsa(&msg, signer).serialize_der().to_vec();
            signature.push((sighash_type & 0xff) as u8);
            log::debug!(
                "input {}: {:?} signed {} input",
                input_index,
                signer_role,
                script_type
            );
            target.add_multisig_signature(
                input_index,
                script_type,
                public_keys,
                &output,
                signer_role.index(),
                signature,
            )
        }
        OutputScriptType::P2trLegacy | OutputScriptType::P2trMusig2 => {
            let is_musig2 = script_type == OutputScriptType::P2trMusig2;
            let pair = [signer_role, cosigner_role];
            if is_musig2 && pair.contains(&KeyRole::User) && pair.contains(&KeyRole::Bitgo) {
                return Err(UtxoError::configuration(
                    "p2trMusig2 key path spends require MuSig2 nonce exchange and are not signed here",
                ));
            }
            let spend = create_spend_script_p2tr(public_keys, signer_role, cosigner_role, is_musig2)?;
            let sighash_type = sighash_type.unwrap_or(SIGHASH_DEFAULT);
            let hash = target.signature_hash(
                input_index,
                SighashKind::TaprootScriptPath {
                    leaf_hash: spend.leaf_hash,
                },
                sighash_type,
            )?;
            let msg = Message::from_digest(hash);
            let keypair = Keypair::from_secret_key(&secp, signer);
            let mut signature = secp
                .sign_schnorr_no_aux_rand(&msg, &keypair)
                .serialize()
                .to_vec();
            if sighash_type != SIGHASH_DEFAULT {
                signature.push((sighash_type & 0xff) as u8);
            }
            log::debug!(
                "input {}: {:?} signed {} script path",
                input_index,
                signer_role,
                script_type
            );
            target.add_taproot_script_signature(
                input_index,
                &spend,
                to_xonly_pubkey(signer_pub),
                signature,
            )
        }
    }
}

/// Owning form of [`sign_input_2of3_mut`]: the target is threaded through
/// the call and returned once the signature is recorded.
#[allow(clippy::too_many_arguments)]
pub fn sign_input_2of3<T: SignatureTarget>(
    mut target: T,
    input_index: usize,
    script_type: OutputScriptType,
    public_keys: &PubTriple,
    signer: &SecretKey,
    cosigner: &CompressedPublicKey,
    amount: u64,
    sighash_type: Option<u32>,
) -> Result<T> {
    sign_input_2of3_mut(
        &mut target,
        input_index,
        script_type,
        public_keys,
        signer,
        cosigner,
        amount,
        sighash_type,
    )?;
    Ok(target)
}

/// A signing party of a wallet together with the party it co-signs with.
#[derive(Debug, Clone)]
pub struct WalletUnspentSigner {
    pub wallet_keys: RootWalletKeys,
    pub signer: Xpriv,
    pub cosigner: Xpub,
}

/// Keys of one signing party at a single wallet address.
#[derive(Debug, Clone)]
pub struct DerivedSigner {
    pub public_keys: PubTriple,
    pub signer: SecretKey,
    pub signer_public_key: CompressedPublicKey,
    pub cosigner: CompressedPublicKey,
}

impl WalletUnspentSigner {
    pub fn new(wallet_keys: RootWalletKeys, signer: Xpriv, cosigner: Xpub) -> Result<Self> {
        let secp = Secp256k1::new();
        let signer_role = wallet_keys
            .role_of(&Xpub::from_priv(&secp, &signer))
            .ok_or_else(|| UtxoError::configuration("signer key is not part of the wallet"))?;
        let cosigner_role = wallet_keys
            .role_of(&cosigner)
            .ok_or_else(|| UtxoError::configuration("cosigner key is not part of the wallet"))?;
        if signer_role == cosigner_role {
            return Err(UtxoError::configuration("signer and cosigner must differ"));
        }
        Ok(Self {
            wallet_keys,
            signer,
            cosigner,
        })
    }

    /// Signer and cosigner of the address at `chain`/`index`.
    pub fn derive_for_chain_and_index(&self, chain: u32, index: u32) -> Result<DerivedSigner> {
        let derived = self.wallet_keys.derive_for_chain_and_index(chain, index)?;
        let cosigner_role = self
            .wallet_keys
            .role_of(&self.cosigner)
            .ok_or_else(|| UtxoError::configuration("cosigner key is not part of the wallet"))?;
        let signer = self.wallet_keys.derive_signer(&self.signer, chain, index)?;
        let secp = Secp256k1::new();
        Ok(DerivedSigner {
            public_keys: derived.pub_triple(),
            signer: signer.private_key,
            signer_public_key: CompressedPublicKey(signer.private_key.public_key(&secp)),
            cosigner: derived.key(cosigner_role),
        })
    }
}

/// Sign the input spending `unspent`.
///
/// The output script derived from the wallet keys at the unspent's chain and
/// index must equal the script of the unspent's address. Replay protection
/// unspents are never signed with wallet keys.
pub fn sign_input_with_unspent_mut<T: SignatureTarget + ?Sized>(
    target: &mut T,
    input_index: usize,
    unspent: &Unspent,
    signer: &WalletUnspentSigner,
) -> Result<()> {
    let network = target.network();
    let (chain, index) = match unspent.kind(network)? {
        UnspentKind::Wallet { chain, index } => (chain, index),
        UnspentKind::ReplayProtection => {
            return Err(UtxoError::configuration(format!(
                "unspent {} is a replay protection unspent and is signed by the platform only",
                unspent.id
            )))
        }
    };

    let outpoint = target.previous_output(input_index)?;
    if outpoint != unspent.output_id()?.outpoint() {
        return Err(UtxoError::consistency(format!(
            "input {} spends {}:{}, not unspent {}",
            input_index, outpoint.txid, outpoint.vout, unspent.id
        )));
    }

    let script_type = script_type_for_chain(chain)?;
    let derived = signer.derive_for_chain_and_index(chain, index)?;
    let expected = WalletScripts::new(
        &derived.public_keys,
        script_type,
        &network.output_script_support(),
    )?
    .output_script();
    if expected != unspent.script_pub_key(network)? {
        return Err(UtxoError::consistency(format!(
            "unspent {}: address does not match wallet script at chain {} index {}",
            unspent.id, chain, index
        )));
    }

    sign_input_2of3_mut(
        target,
        input_index,
        script_type,
        &derived.public_keys,
        &derived.signer,
        &derived.cosigner,
        unspent.value,
        None,
    )
}

pub fn sign_input_with_unspent<T: SignatureTarget>(
    mut target: T,
    input_index: usize,
    unspent: &Unspent,
    signer: &WalletUnspentSigner,
) -> Result<T> {
    sign_input_with_unspent_mut(&mut target, input_index, unspent, signer)?;
    Ok(target)
}

fn verify_signed_input(
    tx: &UtxoTransaction,
    input_index: usize,
    unspent: &Unspent,
    signer: &WalletUnspentSigner,
    prevouts: &[TxOut],
) -> Result<()> {
    let (chain, index) = match unspent.kind(tx.network)? {
        UnspentKind::Wallet { chain, index } => (chain, index),
        UnspentKind::ReplayProtection => return Ok(()),
    };
    let derived = signer.derive_for_chain_and_index(chain, index)?;
    let settings = VerificationSettings {
        signature_index: None,
        public_key: Some(PublicKey::from(derived.signer_public_key)),
    };
    if verify_signature(tx, input_index, unspent.value, &settings, prevouts)? {
        Ok(())
    } else {
        Err(UtxoError::verification(input_index, "signature does not verify"))
    }
}

/// Sign every wallet input of `builder` and verify each new signature.
///
/// `unspents[i]` is the output spent by input `i`. Replay protection inputs
/// are skipped. Failures are collected for every input and returned together.
pub fn sign_and_verify_wallet_transaction(
    mut builder: TransactionBuilder,
    unspents: &[Unspent],
    signer: &WalletUnspentSigner,
) -> Result<TransactionBuilder> {
    let network = builder.network();
    if unspents.len() != builder.input_count() {
        return Err(UtxoError::consistency(format!(
            "{} unspents for {} inputs",
            unspents.len(),
            builder.input_count()
        )));
    }

    let mut errors = vec![];
    let mut signed = vec![];
    for (input_index, unspent) in unspents.iter().enumerate() {
        match unspent.is_replay_protection_unspent(network) {
            Ok(true) => {
                log::debug!("input {}: skipping replay protection unspent", input_index);
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                errors.push(e);
                continue;
            }
        }
        match sign_input_with_unspent_mut(&mut builder, input_index, unspent, signer) {
            Ok(()) => signed.push(input_index),
            Err(e) => errors.push(e),
        }
    }

    let tx = builder.build_incomplete()?;
    let prevouts = builder.prevouts().to_vec();
    for input_index in signed {
        let unspent = &unspents[input_index];
        if let Err(e) = verify_signed_input(&tx, input_index, unspent, signer, &prevouts) {
            errors.push(e);
        }
    }

    UtxoError::aggregate(errors)?;
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::from_output_script_with_network;
    use crate::bitcoin::{Amount, ScriptBuf};
    use crate::fixed_script_wallet::replay_protection::ReplayProtection;
    use crate::fixed_script_wallet::test_utils::*;
    use crate::fixed_script_wallet::verify::verify_signature_with_public_keys;
    use crate::fixed_script_wallet::wallet_keys::tests::{get_test_wallet_keys, get_test_wallet_xprvs};
    use crate::fixed_script_wallet::wallet_scripts::{Chain, Scope};
    use crate::transaction::{SerializableTransaction, UtxoTransaction};
    use rstest::rstest;

    fn golden_builder() -> TransactionBuilder {
        let mut builder = TransactionBuilder::new(Network::Bitcoin).unwrap();
        builder.add_unspent(&golden_unspent()).unwrap();
        builder
            .add_output_address(GOLDEN_RECIPIENT, GOLDEN_OUTPUT_VALUE)
            .unwrap();
        builder
    }

    fn golden_signer(signer: KeyRole, cosigner: KeyRole) -> WalletUnspentSigner {
        let keys = golden_wallet_keys();
        WalletUnspentSigner::new(keys.clone(), golden_xprvs()[signer.index()], *keys.key(cosigner))
            .unwrap()
    }

    fn golden_pub_triple() -> PubTriple {
        golden_wallet_keys()
            .derive_for_chain_and_index(0, 0)
            .unwrap()
            .pub_triple()
    }

    fn wallet_address(keys: &RootWalletKeys, chain: Chain, index: u32, network: Network) -> String {
        let script = WalletScripts::from_wallet_keys(
            keys,
            chain,
            index,
            &network.output_script_support(),
        )
        .unwrap()
        .output_script();
        from_output_script_with_network(&script, network, Default::default()).unwrap()
    }

    fn builder_for(network: Network, unspents: &[Unspent], output_value: u64) -> TransactionBuilder {
        let mut builder = TransactionBuilder::new(network).unwrap();
        for unspent in unspents {
            builder.add_unspent(unspent).unwrap();
        }
        builder
            .add_output_address(GOLDEN_RECIPIENT, output_value)
            .unwrap();
        builder
    }

    #[test]
    fn golden_p2sh_signing() {
        let builder = golden_builder();
        assert_eq!(builder.build_incomplete().unwrap().to_hex().unwrap(), GOLDEN_UNSIGNED);

        let unspent = golden_unspent();
        let builder = sign_input_with_unspent(
            builder,
            0,
            &unspent,
            &golden_signer(KeyRole::User, KeyRole::Backup),
        )
        .unwrap();
        assert_eq!(
            builder.build_incomplete().unwrap().to_hex().unwrap(),
            GOLDEN_HALF_SIGNED
        );
        assert!(matches!(builder.build(), Err(UtxoError::Signing { .. })));

        let builder = sign_input_with_unspent(
            builder,
            0,
            &unspent,
            &golden_signer(KeyRole::Backup, KeyRole::User),
        )
        .unwrap();
        let tx = builder.build().unwrap();
        assert_eq!(tx.to_hex().unwrap(), GOLDEN_FULL_SIGNED);

        let result =
            verify_signature_with_public_keys(&tx, 0, &golden_prevouts(), &golden_pub_triple())
                .unwrap();
        assert_eq!(result, vec![true, true, false]);
    }

    #[test]
    fn signing_order_does_not_matter() {
        let unspent = golden_unspent();
        let user = golden_signer(KeyRole::User, KeyRole::Backup);
        let backup = golden_signer(KeyRole::Backup, KeyRole::User);

        let a = sign_input_with_unspent(golden_builder(), 0, &unspent, &user)
            .and_then(|b| sign_input_with_unspent(b, 0, &unspent, &backup))
            .and_then(|b| b.build())
            .unwrap();
        let b = sign_input_with_unspent(golden_builder(), 0, &unspent, &backup)
            .and_then(|b| sign_input_with_unspent(b, 0, &unspent, &user))
            .and_then(|b| b.build())
            .unwrap();
        assert_eq!(a.to_hex().unwrap(), b.to_hex().unwrap());
        assert_eq!(a.to_hex().unwrap(), GOLDEN_FULL_SIGNED);
    }

    #[rstest]
    #[case(OutputScriptType::P2sh, KeyRole::User, KeyRole::Bitgo)]
    #[case(OutputScriptType::P2shP2wsh, KeyRole::User, KeyRole::Backup)]
    #[case(OutputScriptType::P2wsh, KeyRole::Backup, KeyRole::Bitgo)]
    #[case(OutputScriptType::P2trLegacy, KeyRole::User, KeyRole::Bitgo)]
    #[case(OutputScriptType::P2trLegacy, KeyRole::Backup, KeyRole::User)]
    #[case(OutputScriptType::P2trMusig2, KeyRole::User, KeyRole::Backup)]
    #[case(OutputScriptType::P2trMusig2, KeyRole::Bitgo, KeyRole::Backup)]
    fn sign_every_script_type(
        #[case] script_type: OutputScriptType,
        #[case] first: KeyRole,
        #[case] second: KeyRole,
    ) {
        let xprvs = get_test_wallet_xprvs("signer");
        let keys = get_test_wallet_keys("signer");
        let chain = Chain::new(script_type, Scope::External);
        let address = wallet_address(&keys, chain, 5, Network::Bitcoin);
        let unspents = vec![
            Unspent::wallet(format!("{}:1", GOLDEN_TXID), address.clone(), 50_000, chain.value(), 5),
            Unspent::wallet(format!("{}:2", GOLDEN_TXID), address, 60_000, chain.value(), 5),
        ];

        let s1 = WalletUnspentSigner::new(keys.clone(), xprvs[first.index()], *keys.key(second))
            .unwrap();
        let s2 = WalletUnspentSigner::new(keys.clone(), xprvs[second.index()], *keys.key(first))
            .unwrap();
        let builder = builder_for(Network::Bitcoin, &unspents, 100_000);
        let builder = sign_and_verify_wallet_transaction(builder, &unspents, &s1).unwrap();
        let half = builder.build_incomplete().unwrap();
        let builder = sign_and_verify_wallet_transaction(builder, &unspents, &s2).unwrap();
        let tx = builder.build().unwrap();

        let prevouts = builder.prevouts().to_vec();
        let derived = keys
            .derive_for_chain_and_index(chain.value(), 5)
            .unwrap()
            .pub_triple();
        let expected: Vec<bool> = KeyRole::ALL
            .iter()
            .map(|r| *r == first || *r == second)
            .collect();
        for input_index in 0..2 {
            let result =
                verify_signature_with_public_keys(&tx, input_index, &prevouts, &derived).unwrap();
            assert_eq!(result, expected);
        }

        let reparsed = UtxoTransaction::from_hex(&tx.to_hex().unwrap(), Network::Bitcoin).unwrap();
        assert_eq!(reparsed, tx);
        let rebuilt = TransactionBuilder::from_transaction(half.clone(), prevouts).unwrap();
        assert_eq!(rebuilt.build_incomplete().unwrap(), half);
    }

    #[test]
    fn musig2_key_path_is_not_signed() {
        let keys = get_test_wallet_keys("signer");
        let xprvs = get_test_wallet_xprvs("signer");
        let derived = keys.derive_for_chain_and_index(40, 0).unwrap();
        let script = WalletScripts::new(
            &derived.pub_triple(),
            OutputScriptType::P2trMusig2,
            &Network::Bitcoin.output_script_support(),
        )
        .unwrap()
        .output_script();
        let mut builder = TransactionBuilder::new(Network::Bitcoin).unwrap();
        builder.add_input(
            golden_unspent().output_id().unwrap().outpoint(),
            None,
            TxOut {
                value: Amount::from_sat(1000),
                script_pubkey: script,
            },
        );
        let signer = keys.derive_signer(&xprvs[0], 40, 0).unwrap();
        let err = sign_input_2of3_mut(
            &mut builder,
            0,
            OutputScriptType::P2trMusig2,
            &derived.pub_triple(),
            &signer.private_key,
            &derived.key(KeyRole::Bitgo),
            1000,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, UtxoError::Configuration(_)));
    }

    #[test]
    fn amount_and_script_must_match() {
        let mut builder = golden_builder();
        let signer = golden_wallet_keys()
            .derive_signer(&golden_xprvs()[0], 0, 0)
            .unwrap();
        let triple = golden_pub_triple();

        let err = sign_input_2of3_mut(
            &mut builder,
            0,
            OutputScriptType::P2sh,
            &triple,
            &signer.private_key,
            &triple[1],
            GOLDEN_VALUE + 1,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, UtxoError::Consistency(_)));

        let err = sign_input_2of3_mut(
            &mut builder,
            0,
            OutputScriptType::P2wsh,
            &triple,
            &signer.private_key,
            &triple[1],
            GOLDEN_VALUE,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, UtxoError::Consistency(_)));
    }

    #[test]
    fn unspent_must_match_wallet_script() {
        let mut unspent = golden_unspent();
        unspent.index = Some(1);
        let err = sign_input_with_unspent(
            golden_builder(),
            0,
            &unspent,
            &golden_signer(KeyRole::User, KeyRole::Backup),
        )
        .unwrap_err();
        assert!(matches!(err, UtxoError::Consistency(_)));
    }

    #[test]
    fn signer_must_belong_to_wallet() {
        let keys = golden_wallet_keys();
        let other = get_test_wallet_xprvs("other");
        assert!(WalletUnspentSigner::new(keys.clone(), other[0], *keys.bitgo_key()).is_err());
        let xprvs = golden_xprvs();
        assert!(WalletUnspentSigner::new(keys.clone(), xprvs[0], *keys.user_key()).is_err());
    }

    #[test]
    fn replay_protection_is_skipped() {
        let network = Network::BitcoinCash;
        let keys = golden_wallet_keys();
        let address = wallet_address(&keys, Chain::new(OutputScriptType::P2sh, Scope::External), 0, network);
        let unspents = vec![
            Unspent::wallet(format!("{}:0", GOLDEN_TXID), address, 10_000, 0, 0),
            Unspent::replay_protection(
                format!("{}:1", GOLDEN_TXID),
                "33p1q7mTGyeM5UnZERGiMcVUkY12SCsatA",
                1_000,
            ),
        ];
        let builder = builder_for(network, &unspents, 9_000);
        let signer = golden_signer(KeyRole::User, KeyRole::Bitgo);
        let builder = sign_and_verify_wallet_transaction(builder, &unspents, &signer).unwrap();

        let tx = builder.build_incomplete().unwrap();
        assert!(!tx.transaction().input[0].script_sig.is_empty());
        assert_eq!(tx.transaction().input[1].script_sig, ScriptBuf::new());
        let rp = ReplayProtection::for_network(network);
        assert!(rp.is_replay_protection_input(&builder.prevouts()[1].script_pubkey));

        let err = sign_input_with_unspent(builder, 1, &unspents[1], &signer).unwrap_err();
        assert!(matches!(err, UtxoError::Configuration(_)));
    }

    #[test]
    fn failures_are_collected_per_input() {
        let keys = golden_wallet_keys();
        let address = wallet_address(&keys, Chain::new(OutputScriptType::P2sh, Scope::External), 0, Network::Bitcoin);
        let mut unspents: Vec<Unspent> = (0..3)
            .map(|vout| Unspent::wallet(format!("{}:{}", GOLDEN_TXID, vout), address.clone(), 10_000, 0, 0))
            .collect();
        let builder = builder_for(Network::Bitcoin, &unspents, 20_000);
        unspents[0].value = 1;
        unspents[2].index = Some(9);
        let err = sign_and_verify_wallet_transaction(
            builder,
            &unspents,
            &golden_signer(KeyRole::User, KeyRole::Backup),
        )
        .unwrap_err();
        assert!(matches!(err, UtxoError::Aggregate(ref errors) if errors.len() == 2));
    }

    #[test]
    fn unreadable_unspents_are_collected_per_input() {
        let keys = golden_wallet_keys();
        let address = wallet_address(&keys, Chain::new(OutputScriptType::P2sh, Scope::External), 0, Network::Bitcoin);
        let mut unspents: Vec<Unspent> = (0..3)
            .map(|vout| Unspent::wallet(format!("{}:{}", GOLDEN_TXID, vout), address.clone(), 10_000, 0, 0))
            .collect();
        let builder = builder_for(Network::Bitcoin, &unspents, 20_000);
        for i in [0, 2] {
            unspents[i].address = "not-an-address".to_string();
            unspents[i].chain = None;
            unspents[i].index = None;
        }
        let err = sign_and_verify_wallet_transaction(
            builder,
            &unspents,
            &golden_signer(KeyRole::User, KeyRole::Backup),
        )
        .unwrap_err();
        match err {
            UtxoError::Aggregate(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().all(|e| matches!(e, UtxoError::Format(_))));
            }
            other => panic!("expected aggregate error, got {:?}", other),
        }
    }
}

use std::collections::BTreeMap;

use crate::bitcoin::bip32::{DerivationPath, Fingerprint};
use crate::bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_CHECKSIGVERIFY};
use crate::bitcoin::blockdata::script::Builder;
use crate::bitcoin::secp256k1::Secp256k1;
use crate::bitcoin::taproot::{
    ControlBlock, LeafVersion, TapLeafHash, TapNodeHash, TapTree, TaprootBuilder, TaprootSpendInfo,
};
use crate::bitcoin::{CompressedPublicKey, ScriptBuf, XOnlyPublicKey};
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::wallet_keys::{derivation_path, KeyRole, PubTriple, RootWalletKeys};

use super::bitgo_musig::{key_agg_bitgo_p2tr_legacy, key_agg_p2tr_musig2};

pub(crate) fn to_xonly_pubkey(key: CompressedPublicKey) -> XOnlyPublicKey {
    XOnlyPublicKey::from(key.0)
}

/// Helper to build p2tr_ns script (n-of-n checksig chain)
pub fn build_p2tr_ns_script(keys: &[CompressedPublicKey]) -> ScriptBuf {
    let mut builder = Builder::default();
    for (i, key) in keys.iter().enumerate() {
        builder = builder.push_slice(to_xonly_pubkey(*key).serialize());
        if i == keys.len() - 1 {
            builder = builder.push_opcode(OP_CHECKSIG);
        } else {
            builder = builder.push_opcode(OP_CHECKSIGVERIFY);
        }
    }
    builder.into_script()
}

/// A resolved tap leaf with depth and the roles of its keys
struct TapLeaf {
    depth: u8,
    roles: [KeyRole; 2],
}

/// Leaves of a BitGo taproot tree.
///
/// For p2trMusig2: 2 leaves at depth 1
///   - user+backup
///   - backup+bitgo
///
/// For p2trLegacy: 3 leaves
///   - user+bitgo at depth 1
///   - user+backup at depth 2
///   - backup+bitgo at depth 2
fn get_tap_leaves(is_musig2: bool) -> Vec<TapLeaf> {
    use KeyRole::*;
    if is_musig2 {
        vec![
            TapLeaf {
                depth: 1,
                roles: [User, Backup],
            },
            TapLeaf {
                depth: 1,
                roles: [Backup, Bitgo],
            },
        ]
    } else {
        vec![
            TapLeaf {
                depth: 1,
                roles: [User, Bitgo],
            },
            TapLeaf {
                depth: 2,
                roles: [User, Backup],
            },
            TapLeaf {
                depth: 2,
                roles: [Backup, Bitgo],
            },
        ]
    }
}

fn leaf_keys(keys: &PubTriple, leaf: &TapLeaf) -> [CompressedPublicKey; 2] {
    [keys[leaf.roles[0].index()], keys[leaf.roles[1].index()]]
}

fn tap_error(e: impl std::fmt::Display) -> UtxoError {
    UtxoError::configuration(format!("invalid taproot tree: {}", e))
}

/// Build a TaprootBuilder with all leaves added (but not finalized)
fn build_taproot_builder(keys: &PubTriple, is_musig2: bool) -> Result<TaprootBuilder> {
    let mut builder = TaprootBuilder::new();
    for leaf in get_tap_leaves(is_musig2) {
        let script = build_p2tr_ns_script(&leaf_keys(keys, &leaf));
        builder = builder.add_leaf(leaf.depth, script).map_err(tap_error)?;
    }
    Ok(builder)
}

/// Internal key of a BitGo taproot output: the aggregate of user and bitgo.
pub fn internal_key_p2tr(keys: &PubTriple, is_musig2: bool) -> Result<XOnlyPublicKey> {
    let [user, _backup, bitgo] = *keys;
    let agg = if is_musig2 {
        key_agg_p2tr_musig2(&[user, bitgo])
    } else {
        key_agg_bitgo_p2tr_legacy(&[user, bitgo])
    }
    .map_err(|e| UtxoError::configuration(e.to_string()))?;
    XOnlyPublicKey::from_slice(&agg).map_err(|e| UtxoError::configuration(e.to_string()))
}

fn build_p2tr_spend_info(keys: &PubTriple, is_musig2: bool) -> Result<TaprootSpendInfo> {
    let secp = Secp256k1::verification_only();
    let internal_key = internal_key_p2tr(keys, is_musig2)?;
    build_taproot_builder(keys, is_musig2)?
        .finalize(&secp, internal_key)
        .map_err(|_| tap_error("incomplete tree"))
}

/// Build a TapTree for PSBT output from wallet keys
pub fn build_tap_tree_for_output(pub_triple: &PubTriple, is_musig2: bool) -> Result<TapTree> {
    TapTree::try_from(build_taproot_builder(pub_triple, is_musig2)?).map_err(tap_error)
}

pub type TapKeyOrigins =
    BTreeMap<XOnlyPublicKey, (Vec<TapLeafHash>, (Fingerprint, DerivationPath))>;

/// Tap key origins for a wallet output or input.
///
/// Each key maps to the leaf hashes of every leaf it participates in.
pub fn create_tap_bip32_derivation(
    wallet_keys: &RootWalletKeys,
    chain: u32,
    index: u32,
    pub_triple: &PubTriple,
    is_musig2: bool,
) -> TapKeyOrigins {
    let leaf_data: Vec<([KeyRole; 2], TapLeafHash)> = get_tap_leaves(is_musig2)
        .into_iter()
        .map(|leaf| {
            let script = build_p2tr_ns_script(&leaf_keys(pub_triple, &leaf));
            (
                leaf.roles,
                TapLeafHash::from_script(&script, LeafVersion::TapScript),
            )
        })
        .collect();

    let mut map = BTreeMap::new();
    for role in KeyRole::ALL {
        let xpub = wallet_keys.key(role);
        let path = derivation_path(&wallet_keys.derivation_prefixes[role.index()], chain, index);
        let hashes: Vec<TapLeafHash> = leaf_data
            .iter()
            .filter(|(roles, _)| roles.contains(&role))
            .map(|(_, hash)| *hash)
            .collect();
        map.insert(
            to_xonly_pubkey(pub_triple[role.index()]),
            (hashes, (xpub.fingerprint(), path)),
        );
    }
    map
}

#[derive(Debug)]
pub struct ScriptP2tr {
    pub spend_info: TaprootSpendInfo,
}

impl ScriptP2tr {
    pub fn new(keys: &PubTriple, p2tr_musig2: bool) -> Result<ScriptP2tr> {
        let spend_info = build_p2tr_spend_info(keys, p2tr_musig2)?;
        Ok(ScriptP2tr { spend_info })
    }

    pub fn output_script(&self) -> ScriptBuf {
        let output_key = self.spend_info.output_key().to_x_only_public_key();

        Builder::new()
            .push_int(1)
            .push_slice(output_key.serialize())
            .into_script()
    }
}

/// Everything needed to spend one leaf of a BitGo taproot output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendScriptP2tr {
    pub witness_script: ScriptBuf,
    pub control_block: ControlBlock,
    pub leaf_version: LeafVersion,
    pub leaf_hash: TapLeafHash,
}

/// Script-path spend data for the leaf covering `signer` and `cosigner`.
///
/// For p2trMusig2 outputs the user+bitgo pair has no leaf: it spends through
/// the key path.
pub fn create_spend_script_p2tr(
    keys: &PubTriple,
    signer: KeyRole,
    cosigner: KeyRole,
    is_musig2: bool,
) -> Result<SpendScriptP2tr> {
    if signer == cosigner {
        return Err(UtxoError::configuration("signer and cosigner must differ"));
    }
    let leaf = get_tap_leaves(is_musig2)
        .into_iter()
        .find(|leaf| leaf.roles.contains(&signer) && leaf.roles.contains(&cosigner))
        .ok_or_else(|| {
            UtxoError::configuration(format!(
                "no script path for {:?}+{:?}",
                signer, cosigner
            ))
        })?;
    let witness_script = build_p2tr_ns_script(&leaf_keys(keys, &leaf));
    let spend_info = build_p2tr_spend_info(keys, is_musig2)?;
    let control_block = spend_info
        .control_block(&(witness_script.clone(), LeafVersion::TapScript))
        .ok_or_else(|| tap_error("leaf not in tree"))?;
    Ok(SpendScriptP2tr {
        leaf_hash: TapLeafHash::from_script(&witness_script, LeafVersion::TapScript),
        witness_script,
        control_block,
        leaf_version: LeafVersion::TapScript,
    })
}

/// Key-path data of a p2trMusig2 output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPathP2trMusig2 {
    pub internal_pubkey: XOnlyPublicKey,
    pub output_pubkey: XOnlyPublicKey,
    pub taptree_root: Option<TapNodeHash>,
}

pub fn create_key_path_p2tr_musig2(keys: &PubTriple) -> Result<KeyPathP2trMusig2> {
    let spend_info = build_p2tr_spend_info(keys, true)?;
    Ok(KeyPathP2trMusig2 {
        internal_pubkey: spend_info.internal_key(),
        output_pubkey: spend_info.output_key().to_x_only_public_key(),
        taptree_root: spend_info.merkle_root(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::taproot::TapLeafHash;
    use crate::fixed_script_wallet::wallet_keys::tests::get_test_wallet_keys;

    fn pub_triple(seed: &str) -> PubTriple {
        get_test_wallet_keys(seed)
            .derive_for_chain_and_index(30, 0)
            .unwrap()
            .pub_triple()
    }

    #[test]
    fn every_pair_has_a_valid_leaf() {
        use KeyRole::*;
        let keys = pub_triple("lol");
        let output = ScriptP2tr::new(&keys, false).unwrap();
        let output_key = output.spend_info.output_key().to_x_only_public_key();
        let secp = Secp256k1::verification_only();
        for (signer, cosigner) in [(User, Bitgo), (Bitgo, User), (User, Backup), (Backup, Bitgo)] {
            let spend = create_spend_script_p2tr(&keys, signer, cosigner, false).unwrap();
            assert!(spend
                .control_block
                .verify_taproot_commitment(&secp, output_key, &spend.witness_script));
            assert_eq!(
                spend.leaf_hash,
                TapLeafHash::from_script(&spend.witness_script, LeafVersion::TapScript)
            );
        }
    }

    #[test]
    fn musig2_tree_excludes_user_bitgo_leaf() {
        let keys = pub_triple("lol");
        assert!(create_spend_script_p2tr(&keys, KeyRole::User, KeyRole::Bitgo, true).is_err());
        assert!(create_spend_script_p2tr(&keys, KeyRole::Backup, KeyRole::Bitgo, true).is_ok());
        assert!(create_spend_script_p2tr(&keys, KeyRole::User, KeyRole::User, false).is_err());
    }

    #[test]
    fn musig2_key_path_matches_output_script() {
        let keys = pub_triple("lol");
        let key_path = create_key_path_p2tr_musig2(&keys).unwrap();
        let output = ScriptP2tr::new(&keys, true).unwrap();
        assert_eq!(
            &output.output_script().as_bytes()[2..],
            &key_path.output_pubkey.serialize()[..]
        );
        assert!(key_path.taptree_root.is_some());
        assert_eq!(key_path.internal_pubkey, internal_key_p2tr(&keys, true).unwrap());
    }

    #[test]
    fn tap_key_origins_cover_leaves() {
        let wallet = get_test_wallet_keys("lol");
        let keys = wallet.derive_for_chain_and_index(30, 0).unwrap().pub_triple();
        let origins = create_tap_bip32_derivation(&wallet, 30, 0, &keys, false);
        assert_eq!(origins.len(), 3);
        for (key, (hashes, _)) in &origins {
            assert_eq!(hashes.len(), 2, "key {} should be in two leaves", key);
        }
        let musig2 = create_tap_bip32_derivation(&wallet, 30, 0, &keys, true);
        let user = to_xonly_pubkey(keys[0]);
        let backup = to_xonly_pubkey(keys[1]);
        assert_eq!(musig2[&user].0.len(), 1);
        assert_eq!(musig2[&backup].0.len(), 2);
    }
}

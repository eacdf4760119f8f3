use std::convert::TryInto;
use std::str::FromStr;

use crate::bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use crate::bitcoin::{bip32::Xpub, secp256k1::Secp256k1, CompressedPublicKey};
use crate::error::{Result, UtxoError};

pub type XpubTriple = [Xpub; 3];

pub type PubTriple = [CompressedPublicKey; 3];

pub fn to_pub_triple(xpubs: &XpubTriple) -> PubTriple {
    [xpubs[0].to_pub(), xpubs[1].to_pub(), xpubs[2].to_pub()]
}

pub fn derivation_path(prefix: &DerivationPath, chain: u32, index: u32) -> DerivationPath {
    prefix
        .child(ChildNumber::Normal { index: chain })
        .child(ChildNumber::Normal { index })
}

/// Render a path as `a/b/c`, without the `m/` root marker.
pub fn format_path(path: &DerivationPath) -> String {
    let parts: &[ChildNumber] = path.as_ref();
    parts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_prefix(prefix: &str) -> Result<DerivationPath> {
    if prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(UtxoError::configuration(format!(
            "derivation prefix '{}' must not start or end with '/'",
            prefix
        )));
    }
    let full = if prefix.is_empty() {
        "m".to_string()
    } else {
        format!("m/{}", prefix)
    };
    DerivationPath::from_str(&full).map_err(|e| {
        UtxoError::configuration(format!("invalid derivation prefix '{}': {}", prefix, e))
    })
}

/// Position of a key within the wallet triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    User,
    Backup,
    Bitgo,
}

impl KeyRole {
    pub const ALL: [KeyRole; 3] = [KeyRole::User, KeyRole::Backup, KeyRole::Bitgo];

    pub fn index(&self) -> usize {
        match self {
            KeyRole::User => 0,
            KeyRole::Backup => 1,
            KeyRole::Bitgo => 2,
        }
    }
}

impl FromStr for KeyRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(KeyRole::User),
            "backup" => Ok(KeyRole::Backup),
            "bitgo" => Ok(KeyRole::Bitgo),
            _ => Err(format!("invalid key role '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootWalletKeys {
    pub xpubs: XpubTriple,
    pub derivation_prefixes: [DerivationPath; 3],
}

/// Keys of a single wallet address, derived from [`RootWalletKeys`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedWalletKeys {
    pub xpubs: XpubTriple,
    pub paths: [DerivationPath; 3],
}

impl DerivedWalletKeys {
    pub fn pub_triple(&self) -> PubTriple {
        to_pub_triple(&self.xpubs)
    }

    pub fn key(&self, role: KeyRole) -> CompressedPublicKey {
        self.xpubs[role.index()].to_pub()
    }
}

impl RootWalletKeys {
    /// Create wallet keys with explicit prefixes.
    ///
    /// Fails if any two of the three public keys are equal.
    pub fn new_with_derivation_prefixes(
        xpubs: XpubTriple,
        derivation_prefixes: [DerivationPath; 3],
    ) -> Result<Self> {
        for i in 0..3 {
            for j in (i + 1)..3 {
                if xpubs[i].public_key == xpubs[j].public_key {
                    return Err(UtxoError::configuration(format!(
                        "wallet keys {} and {} are identical",
                        i, j
                    )));
                }
            }
        }
        Ok(Self {
            xpubs,
            derivation_prefixes,
        })
    }

    /// Create wallet keys from prefix strings such as `0/0`.
    pub fn new_with_prefix_strings(xpubs: XpubTriple, prefixes: [&str; 3]) -> Result<Self> {
        let prefixes = [
            parse_prefix(prefixes[0])?,
            parse_prefix(prefixes[1])?,
            parse_prefix(prefixes[2])?,
        ];
        Self::new_with_derivation_prefixes(xpubs, prefixes)
    }

    /// Create wallet keys with the default `m/0/0` prefix for every key.
    pub fn new(xpubs: XpubTriple) -> Result<Self> {
        Self::new_with_prefix_strings(xpubs, ["0/0", "0/0", "0/0"])
    }

    pub fn user_key(&self) -> &Xpub {
        &self.xpubs[0]
    }

    pub fn backup_key(&self) -> &Xpub {
        &self.xpubs[1]
    }

    pub fn bitgo_key(&self) -> &Xpub {
        &self.xpubs[2]
    }

    pub fn key(&self, role: KeyRole) -> &Xpub {
        &self.xpubs[role.index()]
    }

    pub fn derive_for_chain_and_index(&self, chain: u32, index: u32) -> Result<DerivedWalletKeys> {
        let paths: [DerivationPath; 3] = [
            derivation_path(&self.derivation_prefixes[0], chain, index),
            derivation_path(&self.derivation_prefixes[1], chain, index),
            derivation_path(&self.derivation_prefixes[2], chain, index),
        ];

        let ctx = Secp256k1::verification_only();

        let xpubs: XpubTriple = self
            .xpubs
            .iter()
            .zip(paths.iter())
            .map(|(x, p)| {
                x.derive_pub(&ctx, p)
                    .map_err(|e| UtxoError::configuration(format!("Error deriving xpub: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?
            .try_into()
            .map_err(|_| UtxoError::configuration("Expected exactly 3 derived xpubs"))?;

        Ok(DerivedWalletKeys { xpubs, paths })
    }

    /// Role of `key` within this wallet, matched by public key.
    pub fn role_of(&self, key: &Xpub) -> Option<KeyRole> {
        KeyRole::ALL
            .into_iter()
            .find(|role| self.xpubs[role.index()].public_key == key.public_key)
    }

    /// Derivation path of `key` for `chain`/`index`, without the `m/` marker.
    pub fn get_derivation_path(&self, key: &Xpub, chain: u32, index: u32) -> Result<String> {
        let role = self
            .role_of(key)
            .ok_or_else(|| UtxoError::configuration("key not in wallet"))?;
        Ok(format_path(&derivation_path(
            &self.derivation_prefixes[role.index()],
            chain,
            index,
        )))
    }

    /// Derive the private key of `signer` for `chain`/`index`.
    pub fn derive_signer(&self, signer: &Xpriv, chain: u32, index: u32) -> Result<Xpriv> {
        let secp = Secp256k1::new();
        let xpub = Xpub::from_priv(&secp, signer);
        let role = self
            .role_of(&xpub)
            .ok_or_else(|| UtxoError::configuration("key not in wallet"))?;
        let path = derivation_path(&self.derivation_prefixes[role.index()], chain, index);
        signer
            .derive_priv(&secp, &path)
            .map_err(|e| UtxoError::configuration(format!("Error deriving xpriv: {}", e)))
    }
}

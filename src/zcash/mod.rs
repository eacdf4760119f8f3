//! Zcash consensus parameters: version group ids, network upgrades and the
//! branch id in force at a block height.
//!
//! Branch ids and activation heights follow ZIP-200 and the per-upgrade ZIPs.

pub mod sighash;
pub mod transaction;

pub use transaction::{
    decode_zcash_transaction_parts, encode_zcash_transaction_parts, ZcashTransactionParts,
};

use crate::error::{Result, UtxoError};
use crate::networks::{CoinFamily, Network};

/// Version group id of Overwinter (v3) transactions
pub const OVERWINTER_VERSION_GROUP_ID: u32 = 0x03C48270;
/// Version group id of Sapling (v4) transactions
pub const SAPLING_VERSION_GROUP_ID: u32 = 0x892F2085;
/// Version group id of NU5 (v5) transactions
pub const NU5_VERSION_GROUP_ID: u32 = 0x26A7270A;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetworkUpgrade {
    Overwinter,
    Sapling,
    Blossom,
    Heartwood,
    Canopy,
    Nu5,
    Nu6,
    Nu6_1,
}

/// (upgrade, branch id, mainnet height, testnet height), oldest first.
const UPGRADES: [(NetworkUpgrade, u32, u32, u32); 8] = [
    (NetworkUpgrade::Overwinter, 0x5ba81b19, 347_500, 207_500),
    (NetworkUpgrade::Sapling, 0x76b809bb, 419_200, 280_000),
    (NetworkUpgrade::Blossom, 0x2bb40e60, 653_600, 584_000),
    (NetworkUpgrade::Heartwood, 0xf5b9230b, 903_000, 903_800),
    (NetworkUpgrade::Canopy, 0xe9ff75a6, 1_046_400, 1_028_500),
    (NetworkUpgrade::Nu5, 0xc2d6d0b4, 1_687_104, 1_842_420),
    (NetworkUpgrade::Nu6, 0xc8e71055, 2_726_400, 2_976_000),
    (NetworkUpgrade::Nu6_1, 0x4dec4df0, 3_146_400, 3_536_500),
];

impl NetworkUpgrade {
    pub fn latest() -> NetworkUpgrade {
        UPGRADES[UPGRADES.len() - 1].0
    }

    pub fn branch_id(self) -> u32 {
        self.entry().1
    }

    pub fn activation_height(self, network: Network) -> u32 {
        let (_, _, mainnet, testnet) = self.entry();
        if network.is_mainnet() {
            mainnet
        } else {
            testnet
        }
    }

    fn entry(self) -> (NetworkUpgrade, u32, u32, u32) {
        // the table has one row per variant, in declaration order
        UPGRADES[self as usize]
    }

    /// The upgrade in force at `height`, if Overwinter has activated.
    pub fn at_height(network: Network, height: u32) -> Option<NetworkUpgrade> {
        UPGRADES
            .iter()
            .rev()
            .map(|row| row.0)
            .find(|upgrade| height >= upgrade.activation_height(network))
    }
}

/// Consensus branch id for a transaction mined at `height` on a Zcash network.
pub fn branch_id_at_height(network: Network, height: u32) -> Result<u32> {
    if network.family() != CoinFamily::Zcash {
        return Err(UtxoError::configuration(format!(
            "{} has no consensus branch id",
            network
        )));
    }
    NetworkUpgrade::at_height(network, height)
        .map(NetworkUpgrade::branch_id)
        .ok_or_else(|| {
            UtxoError::configuration(format!(
                "height {} is before Overwinter activation on {}",
                height, network
            ))
        })
}

/// Version group id written for a new overwintered transaction of `version`.
pub fn default_version_group_id(version: u32) -> Option<u32> {
    match version {
        3 => Some(OVERWINTER_VERSION_GROUP_ID),
        4 => Some(SAPLING_VERSION_GROUP_ID),
        5 => Some(NU5_VERSION_GROUP_ID),
        _ => None,
    }
}

/// Consensus branch id assumed for a transaction of `version` when the
/// caller does not supply one.
///
/// v4 transactions default to Canopy. v5 transactions carry their branch id
/// on the wire; new ones default to the latest known upgrade.
pub fn default_branch_id_for_version(version: u32) -> Option<u32> {
    match version {
        1 | 2 => Some(0),
        3 => Some(NetworkUpgrade::Overwinter.branch_id()),
        4 => Some(NetworkUpgrade::Canopy.branch_id()),
        5 => Some(NetworkUpgrade::latest().branch_id()),
        _ => None,
    }
}

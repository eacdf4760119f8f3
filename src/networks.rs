//! Static per-network parameters.
//!
//! Every supported coin is a variant of [`Network`]; the constants below are
//! looked up by matching on it and are never mutated.

use std::fmt;
use std::str::FromStr;

use crate::address::networks::OutputScriptSupport;
use crate::bitcoin::hashes::Hash;
use crate::bitcoin::{ScriptBuf, ScriptHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Network {
    Bitcoin,
    BitcoinTestnet3,
    BitcoinTestnet4,
    BitcoinPublicSignet,
    BitcoinBitGoSignet,

    BitcoinCash,
    BitcoinCashTestnet,

    Ecash,
    EcashTestnet,

    BitcoinGold,
    BitcoinGoldTestnet,

    BitcoinSV,
    BitcoinSVTestnet,

    Dash,
    DashTestnet,

    Dogecoin,
    DogecoinTestnet,

    Litecoin,
    LitecoinTestnet,

    Zcash,
    ZcashTestnet,
}

/// Base58Check version prefixes. Zcash uses two-byte versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Base58Versions {
    pub pub_key_hash: &'static [u8],
    pub script_hash: &'static [u8],
}

/// Coin family, used to pick the transaction codec and signature hash rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoinFamily {
    Bitcoin,
    BitcoinCash,
    Ecash,
    BitcoinGold,
    BitcoinSV,
    Dash,
    Dogecoin,
    Litecoin,
    Zcash,
}

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_DEFAULT: u32 = 0x00;

// hash160 payloads of the platform-held replay protection addresses
// 33p1q7mTGyeM5UnZERGiMcVUkY12SCsatA and 2MuMnPoSDgWEpNWH28X2nLtYMXQJCyT61eY
const REPLAY_PROTECTION_HASH_MAINNET: [u8; 20] = [
    0x17, 0x43, 0x15, 0xcf, 0xde, 0x84, 0xf4, 0xc4, 0x53, 0x95, 0xac, 0x6f, 0x15, 0xdf, 0x8f, 0xfc,
    0x47, 0x0e, 0x02, 0xcc,
];
const REPLAY_PROTECTION_HASH_TESTNET: [u8; 20] = [
    0x17, 0x2d, 0xcc, 0x4e, 0x02, 0x53, 0x61, 0xd9, 0x51, 0xa9, 0x51, 0x1c, 0x67, 0x09, 0x73, 0xa4,
    0xe3, 0x72, 0x0c, 0x98,
];

impl Network {
    pub const ALL: &'static [Network] = &[
        Network::Bitcoin,
        Network::BitcoinTestnet3,
        Network::BitcoinTestnet4,
        Network::BitcoinPublicSignet,
        Network::BitcoinBitGoSignet,
        Network::BitcoinCash,
        Network::BitcoinCashTestnet,
        Network::Ecash,
        Network::EcashTestnet,
        Network::BitcoinGold,
        Network::BitcoinGoldTestnet,
        Network::BitcoinSV,
        Network::BitcoinSVTestnet,
        Network::Dash,
        Network::DashTestnet,
        Network::Dogecoin,
        Network::DogecoinTestnet,
        Network::Litecoin,
        Network::LitecoinTestnet,
        Network::Zcash,
        Network::ZcashTestnet,
    ];

    pub fn family(&self) -> CoinFamily {
        match self {
            Network::Bitcoin
            | Network::BitcoinTestnet3
            | Network::BitcoinTestnet4
            | Network::BitcoinPublicSignet
            | Network::BitcoinBitGoSignet => CoinFamily::Bitcoin,
            Network::BitcoinCash | Network::BitcoinCashTestnet => CoinFamily::BitcoinCash,
            Network::Ecash | Network::EcashTestnet => CoinFamily::Ecash,
            Network::BitcoinGold | Network::BitcoinGoldTestnet => CoinFamily::BitcoinGold,
            Network::BitcoinSV | Network::BitcoinSVTestnet => CoinFamily::BitcoinSV,
            Network::Dash | Network::DashTestnet => CoinFamily::Dash,
            Network::Dogecoin | Network::DogecoinTestnet => CoinFamily::Dogecoin,
            Network::Litecoin | Network::LitecoinTestnet => CoinFamily::Litecoin,
            Network::Zcash | Network::ZcashTestnet => CoinFamily::Zcash,
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(
            self,
            Network::Bitcoin
                | Network::BitcoinCash
                | Network::Ecash
                | Network::BitcoinGold
                | Network::BitcoinSV
                | Network::Dash
                | Network::Dogecoin
                | Network::Litecoin
                | Network::Zcash
        )
    }

    pub fn is_testnet(&self) -> bool {
        !self.is_mainnet()
    }

    /// The mainnet this network belongs to.
    pub fn mainnet(&self) -> Network {
        match self.family() {
            CoinFamily::Bitcoin => Network::Bitcoin,
            CoinFamily::BitcoinCash => Network::BitcoinCash,
            CoinFamily::Ecash => Network::Ecash,
            CoinFamily::BitcoinGold => Network::BitcoinGold,
            CoinFamily::BitcoinSV => Network::BitcoinSV,
            CoinFamily::Dash => Network::Dash,
            CoinFamily::Dogecoin => Network::Dogecoin,
            CoinFamily::Litecoin => Network::Litecoin,
            CoinFamily::Zcash => Network::Zcash,
        }
    }

    pub fn from_coin_name(name: &str) -> Option<Network> {
        match name {
            "btc" => Some(Network::Bitcoin),
            "tbtc" => Some(Network::BitcoinTestnet3),
            "tbtc4" => Some(Network::BitcoinTestnet4),
            "tbtcsig" => Some(Network::BitcoinPublicSignet),
            "tbtcbgsig" => Some(Network::BitcoinBitGoSignet),
            "bch" => Some(Network::BitcoinCash),
            "tbch" => Some(Network::BitcoinCashTestnet),
            "bcha" | "xec" => Some(Network::Ecash),
            "tbcha" | "txec" => Some(Network::EcashTestnet),
            "btg" => Some(Network::BitcoinGold),
            "tbtg" => Some(Network::BitcoinGoldTestnet),
            "bsv" => Some(Network::BitcoinSV),
            "tbsv" => Some(Network::BitcoinSVTestnet),
            "dash" => Some(Network::Dash),
            "tdash" => Some(Network::DashTestnet),
            "doge" => Some(Network::Dogecoin),
            "tdoge" => Some(Network::DogecoinTestnet),
            "ltc" => Some(Network::Litecoin),
            "tltc" => Some(Network::LitecoinTestnet),
            "zec" => Some(Network::Zcash),
            "tzec" => Some(Network::ZcashTestnet),
            _ => None,
        }
    }

    pub fn from_utxolib_name(name: &str) -> Option<Network> {
        Network::ALL
            .iter()
            .find(|n| n.to_utxolib_name() == name)
            .copied()
    }

    pub fn to_utxolib_name(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::BitcoinTestnet3 => "testnet",
            Network::BitcoinTestnet4 => "bitcoinTestnet4",
            Network::BitcoinPublicSignet => "bitcoinPublicSignet",
            Network::BitcoinBitGoSignet => "bitcoinBitGoSignet",
            Network::BitcoinCash => "bitcoincash",
            Network::BitcoinCashTestnet => "bitcoincashTestnet",
            Network::Ecash => "ecash",
            Network::EcashTestnet => "ecashTest",
            Network::BitcoinGold => "bitcoingold",
            Network::BitcoinGoldTestnet => "bitcoingoldTestnet",
            Network::BitcoinSV => "bitcoinsv",
            Network::BitcoinSVTestnet => "bitcoinsvTestnet",
            Network::Dash => "dash",
            Network::DashTestnet => "dashTest",
            Network::Dogecoin => "dogecoin",
            Network::DogecoinTestnet => "dogecoinTest",
            Network::Litecoin => "litecoin",
            Network::LitecoinTestnet => "litecoinTest",
            Network::Zcash => "zcash",
            Network::ZcashTestnet => "zcashTest",
        }
    }

    pub fn output_script_support(&self) -> OutputScriptSupport {
        let segwit = matches!(
            self.family(),
            CoinFamily::Bitcoin | CoinFamily::Litecoin | CoinFamily::BitcoinGold
        );
        let taproot = self.family() == CoinFamily::Bitcoin;
        OutputScriptSupport { segwit, taproot }
    }

    /// Fork id mixed into the sighash type on networks with replay protection.
    pub fn fork_id(&self) -> Option<u32> {
        match self.family() {
            CoinFamily::BitcoinCash | CoinFamily::BitcoinSV | CoinFamily::Ecash => Some(0),
            CoinFamily::BitcoinGold => Some(79),
            _ => None,
        }
    }

    pub fn default_sighash_type(&self) -> u32 {
        if self.fork_id().is_some() {
            SIGHASH_ALL | SIGHASH_FORKID
        } else {
            SIGHASH_ALL
        }
    }

    pub fn default_transaction_version(&self) -> i32 {
        match self.family() {
            CoinFamily::BitcoinCash
            | CoinFamily::BitcoinSV
            | CoinFamily::BitcoinGold
            | CoinFamily::Ecash => 2,
            CoinFamily::Zcash => 4,
            _ => 1,
        }
    }

    pub fn base58_versions(&self) -> Base58Versions {
        let (pub_key_hash, script_hash): (&'static [u8], &'static [u8]) = match self {
            Network::Bitcoin
            | Network::BitcoinCash
            | Network::Ecash
            | Network::BitcoinSV => (&[0x00], &[0x05]),
            Network::BitcoinTestnet3
            | Network::BitcoinTestnet4
            | Network::BitcoinPublicSignet
            | Network::BitcoinBitGoSignet
            | Network::BitcoinCashTestnet
            | Network::EcashTestnet
            | Network::BitcoinSVTestnet
            | Network::BitcoinGoldTestnet => (&[0x6f], &[0xc4]),
            Network::BitcoinGold => (&[0x26], &[0x17]),
            Network::Dash => (&[0x4c], &[0x10]),
            Network::DashTestnet => (&[0x8c], &[0x13]),
            Network::Dogecoin => (&[0x1e], &[0x16]),
            Network::DogecoinTestnet => (&[0x71], &[0xc4]),
            Network::Litecoin => (&[0x30], &[0x32]),
            Network::LitecoinTestnet => (&[0x6f], &[0x3a]),
            Network::Zcash => (&[0x1c, 0xb8], &[0x1c, 0xbd]),
            Network::ZcashTestnet => (&[0x1d, 0x25], &[0x1c, 0xba]),
        };
        Base58Versions {
            pub_key_hash,
            script_hash,
        }
    }

    pub fn bech32_hrp(&self) -> Option<&'static str> {
        match self {
            Network::Bitcoin => Some("bc"),
            Network::BitcoinTestnet3
            | Network::BitcoinTestnet4
            | Network::BitcoinPublicSignet
            | Network::BitcoinBitGoSignet => Some("tb"),
            Network::BitcoinGold => Some("btg"),
            Network::BitcoinGoldTestnet => Some("tbtg"),
            Network::Litecoin => Some("ltc"),
            Network::LitecoinTestnet => Some("tltc"),
            _ => None,
        }
    }

    pub fn cashaddr_prefix(&self) -> Option<&'static str> {
        match self {
            Network::BitcoinCash => Some("bitcoincash"),
            Network::BitcoinCashTestnet => Some("bchtest"),
            Network::Ecash => Some("ecash"),
            Network::EcashTestnet => Some("ectest"),
            _ => None,
        }
    }

    /// Output scripts of the platform's replay protection unspents.
    pub fn replay_protection_scripts(&self) -> Vec<ScriptBuf> {
        if self.fork_id().is_none() {
            return vec![];
        }
        let hash = if self.is_mainnet() {
            REPLAY_PROTECTION_HASH_MAINNET
        } else {
            REPLAY_PROTECTION_HASH_TESTNET
        };
        vec![ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash))]
    }

    pub fn to_bitcoin_network(&self) -> crate::bitcoin::Network {
        match self {
            Network::Bitcoin => crate::bitcoin::Network::Bitcoin,
            Network::BitcoinPublicSignet | Network::BitcoinBitGoSignet => {
                crate::bitcoin::Network::Signet
            }
            n if n.is_mainnet() => crate::bitcoin::Network::Bitcoin,
            _ => crate::bitcoin::Network::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_utxolib_name())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::from_utxolib_name(s)
            .or_else(|| Network::from_coin_name(s))
            .ok_or_else(|| format!("unknown network '{}'", s))
    }
}

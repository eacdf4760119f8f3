//! Shared fixtures for wallet tests.
//!
//! The golden wallet is derived from the seed `golden`: one p2sh unspent at
//! chain 0 index 0 worth 1 BTC, spent to a single p2pkh output.

use crate::bitcoin::bip32::Xpriv;
use crate::bitcoin::TxOut;
use crate::fixed_script_wallet::unspent::Unspent;
use crate::fixed_script_wallet::wallet_keys::tests::{get_test_wallet_keys, get_test_wallet_xprvs};
use crate::fixed_script_wallet::wallet_keys::RootWalletKeys;
use crate::networks::Network;
use crate::transaction::UtxoTransaction;

pub const GOLDEN_SEED: &str = "golden";

pub const GOLDEN_TXID: &str = "f3500c5a957447985d57d477ef5aaaeb02f976fb8ff1cb6ae75bf710dc73a03a";

pub const GOLDEN_ADDRESS: &str = "3MELRAync5ahvAckP8L7PAxNyaEXPW4DxU";

pub const GOLDEN_RECIPIENT: &str = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";

pub const GOLDEN_VALUE: u64 = 100_000_000;

pub const GOLDEN_OUTPUT_VALUE: u64 = 99_999_000;

pub const GOLDEN_UNSIGNED: &str = "01000000013aa073dc10f75be76acbf18ffb76f902ebaa5aef77d4575d984774955a0c50f30000000000ffffffff0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac00000000";

/// Signed by user, with `OP_0` placeholders for backup and bitgo.
pub const GOLDEN_HALF_SIGNED: &str = "01000000013aa073dc10f75be76acbf18ffb76f902ebaa5aef77d4575d984774955a0c50f300000000b700483045022100f095b5486f11b03431f19804b67dd5fd7fbee74daf917d1ce8a1d55873003b6a02207f25750af44603047dbedd2f12c0ba9c38fa699bf20b307916646a0eb6a331040100004c6952210263c23e18172e1367e9a8fbcd414d7ee38f9c1d4557febd7b59560eea34fe9afa2103fb0952a682cdf71936fd62ba42ea493f3d53e0c0064c7c8697df02adf78d9d2221039fd154eab712d38200f30a28ab39a876b82ebc6f575d72498c21991c7bce039253aeffffffff0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac00000000";

/// Signed by user and backup.
pub const GOLDEN_FULL_SIGNED: &str = "01000000013aa073dc10f75be76acbf18ffb76f902ebaa5aef77d4575d984774955a0c50f300000000fdfe0000483045022100f095b5486f11b03431f19804b67dd5fd7fbee74daf917d1ce8a1d55873003b6a02207f25750af44603047dbedd2f12c0ba9c38fa699bf20b307916646a0eb6a3310401483045022100d1c3aa74eaebdc1877a17d3b586814b0d591a7afb309a2a13f98a8442b0407be02206a18d4dfb6678b5eda0f55a6fd8e2d5f710dcefc5c5d07dbb79d73595f666e03014c6952210263c23e18172e1367e9a8fbcd414d7ee38f9c1d4557febd7b59560eea34fe9afa2103fb0952a682cdf71936fd62ba42ea493f3d53e0c0064c7c8697df02adf78d9d2221039fd154eab712d38200f30a28ab39a876b82ebc6f575d72498c21991c7bce039253aeffffffff0118ddf505000000001976a91477bff20c60e522dfaa3350c39b030a5d004e839a88ac00000000";

pub const GOLDEN_PUBKEYS: [&str; 3] = [
    "0263c23e18172e1367e9a8fbcd414d7ee38f9c1d4557febd7b59560eea34fe9afa",
    "03fb0952a682cdf71936fd62ba42ea493f3d53e0c0064c7c8697df02adf78d9d22",
    "039fd154eab712d38200f30a28ab39a876b82ebc6f575d72498c21991c7bce0392",
];

pub fn golden_wallet_keys() -> RootWalletKeys {
    get_test_wallet_keys(GOLDEN_SEED)
}

pub fn golden_xprvs() -> [Xpriv; 3] {
    get_test_wallet_xprvs(GOLDEN_SEED)
}

pub fn golden_unspent() -> Unspent {
    Unspent::wallet(
        format!("{}:0", GOLDEN_TXID),
        GOLDEN_ADDRESS,
        GOLDEN_VALUE,
        0,
        0,
    )
}

pub fn golden_prevouts() -> Vec<TxOut> {
    vec![golden_unspent().to_output(Network::Bitcoin).unwrap()]
}

pub fn tx_from_hex(hex_str: &str) -> UtxoTransaction {
    UtxoTransaction::from_hex(hex_str, Network::Bitcoin).unwrap()
}

pub mod address;
pub mod dash;
mod error;
pub mod fixed_script_wallet;
pub mod litecoin;
mod networks;
pub mod transaction;
pub mod zcash;

// re-export bitcoin from the miniscript crate
pub use ::miniscript::bitcoin;

pub use address::{
    from_output_script_with_coin, from_output_script_with_network, to_output_script_with_coin,
    to_output_script_with_network, AddressFormat,
};

pub use error::{Result, UtxoError};
pub use networks::{CoinFamily, Network};
pub use transaction::{SerializableTransaction, UtxoTransaction};

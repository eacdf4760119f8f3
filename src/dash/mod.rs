//! Dash special transactions.

pub mod transaction;

pub use transaction::{
    decode_dash_transaction_parts, encode_dash_transaction_parts, DashTransactionParts,
};

/// This module contains code for the BitGo Fixed Script Wallets.
/// These are not based on descriptors.
pub mod bitgo_psbt;
pub mod parse_input;
pub mod replay_protection;
pub mod signer;
pub mod transaction_builder;
pub mod unspent;
pub mod verify;
pub mod wallet_keys;
pub mod wallet_scripts;

#[cfg(test)]
pub mod test_utils;

pub use bitgo_psbt::BitGoPsbt;
pub use parse_input::{
    get_strict_signature_count, parse_signature_script, ParsedScriptType, ParsedSignatureScript,
};
pub use replay_protection::*;
pub use signer::{
    sign_and_verify_wallet_transaction, sign_input_2of3, sign_input_with_unspent,
    WalletUnspentSigner,
};
pub use transaction_builder::{InputSigningState, TransactionBuilder};
pub use unspent::{format_output_id, parse_output_id, to_prev_outputs, OutputId, Unspent, UnspentKind};
pub use verify::{
    get_signature_validation_array, get_signature_verifications, verify_signature,
    verify_signature_with_public_keys, verify_transaction, SignatureVerification,
    VerificationSettings, VerifiedKey,
};
pub use wallet_keys::*;
pub use wallet_scripts::*;

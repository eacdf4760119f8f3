/// Code relating to script types of BitGo's 2-of-3 multisig wallets.
pub mod bitgo_musig;
mod checkmultisig;
mod checksigverify;
mod singlesig;

pub use bitgo_musig::BitGoMusigError;
pub use checkmultisig::{
    build_multisig_script_2_of_3, parse_multisig_script_2_of_3, ScriptP2sh, ScriptP2shP2wsh,
    ScriptP2wsh,
};
pub use checksigverify::{
    build_p2tr_ns_script, build_tap_tree_for_output, create_key_path_p2tr_musig2,
    create_spend_script_p2tr, create_tap_bip32_derivation, internal_key_p2tr, KeyPathP2trMusig2,
    ScriptP2tr, SpendScriptP2tr, TapKeyOrigins,
};
pub(crate) use checksigverify::to_xonly_pubkey;
pub use singlesig::{build_p2pk_script, ScriptP2shP2pk};

use crate::address::networks::OutputScriptSupport;
use crate::bitcoin::ScriptBuf;
use crate::error::{Result, UtxoError};
use crate::fixed_script_wallet::wallet_keys::{PubTriple, RootWalletKeys};
use std::convert::TryFrom;
use std::str::FromStr;

/// Scripts that belong to fixed-script BitGo wallets.
#[derive(Debug)]
pub enum WalletScripts {
    /// Chains 0 and 1. Legacy Pay-To-Script-Hash.
    P2sh(ScriptP2sh),
    /// Chains 10 and 11. Legacy Wrapped-Segwit Pay-To-Script-Hash.
    P2shP2wsh(ScriptP2shP2wsh),
    /// Chains 20 and 21. Native Wrapped-Segwit Pay-To-Script-Hash.
    P2wsh(ScriptP2wsh),
    /// Chains 30 and 31. Legacy Taproot, only supporting script-path spend.
    P2trLegacy(ScriptP2tr),
    /// Chains 40 and 41. Taproot with Musig2 key-path spend support.
    P2trMusig2(ScriptP2tr),
}

impl std::fmt::Display for WalletScripts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.script_type())
    }
}

impl WalletScripts {
    pub fn new(
        keys: &PubTriple,
        script_type: OutputScriptType,
        script_support: &OutputScriptSupport,
    ) -> Result<WalletScripts> {
        match script_type {
            OutputScriptType::P2sh => {
                script_support.assert_legacy()?;
                let script = build_multisig_script_2_of_3(keys);
                Ok(WalletScripts::P2sh(ScriptP2sh {
                    redeem_script: script,
                }))
            }
            OutputScriptType::P2shP2wsh => {
                script_support.assert_segwit()?;
                let script = build_multisig_script_2_of_3(keys);
                Ok(WalletScripts::P2shP2wsh(ScriptP2shP2wsh {
                    redeem_script: script.to_p2wsh(),
                    witness_script: script,
                }))
            }
            OutputScriptType::P2wsh => {
                script_support.assert_segwit()?;
                let script = build_multisig_script_2_of_3(keys);
                Ok(WalletScripts::P2wsh(ScriptP2wsh {
                    witness_script: script,
                }))
            }
            OutputScriptType::P2trLegacy => {
                script_support.assert_taproot()?;
                Ok(WalletScripts::P2trLegacy(ScriptP2tr::new(keys, false)?))
            }
            OutputScriptType::P2trMusig2 => {
                script_support.assert_taproot()?;
                Ok(WalletScripts::P2trMusig2(ScriptP2tr::new(keys, true)?))
            }
        }
    }

    pub fn from_wallet_keys(
        wallet_keys: &RootWalletKeys,
        chain: Chain,
        index: u32,
        script_support: &OutputScriptSupport,
    ) -> Result<WalletScripts> {
        let derived_keys = wallet_keys.derive_for_chain_and_index(chain.value(), index)?;
        WalletScripts::new(&derived_keys.pub_triple(), chain.script_type, script_support)
    }

    pub fn script_type(&self) -> OutputScriptType {
        match self {
            WalletScripts::P2sh(_) => OutputScriptType::P2sh,
            WalletScripts::P2shP2wsh(_) => OutputScriptType::P2shP2wsh,
            WalletScripts::P2wsh(_) => OutputScriptType::P2wsh,
            WalletScripts::P2trLegacy(_) => OutputScriptType::P2trLegacy,
            WalletScripts::P2trMusig2(_) => OutputScriptType::P2trMusig2,
        }
    }

    pub fn output_script(&self) -> ScriptBuf {
        match self {
            WalletScripts::P2sh(script) => script.redeem_script.to_p2sh(),
            WalletScripts::P2shP2wsh(script) => script.redeem_script.to_p2sh(),
            WalletScripts::P2wsh(script) => script.witness_script.to_p2wsh(),
            WalletScripts::P2trLegacy(script) => script.output_script(),
            WalletScripts::P2trMusig2(script) => script.output_script(),
        }
    }
}

/// The scriptPubKey of a 2-of-3 output plus the scripts needed to spend it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputScript2of3 {
    pub script_pub_key: ScriptBuf,
    pub redeem_script: Option<ScriptBuf>,
    pub witness_script: Option<ScriptBuf>,
}

/// Build the output script of a 2-of-3 wallet address.
///
/// p2sh carries only a redeem script and p2wsh only a witness script.
/// p2shP2wsh carries both: the redeem script is the witness program.
/// Taproot types carry neither; use [`create_spend_script_p2tr`] for leaves.
pub fn create_output_script_2of3(
    keys: &PubTriple,
    script_type: OutputScriptType,
) -> Result<OutputScript2of3> {
    let all = OutputScriptSupport {
        segwit: true,
        taproot: true,
    };
    let scripts = WalletScripts::new(keys, script_type, &all)?;
    let script_pub_key = scripts.output_script();
    let (redeem_script, witness_script) = match scripts {
        WalletScripts::P2sh(s) => (Some(s.redeem_script), None),
        WalletScripts::P2shP2wsh(s) => (Some(s.redeem_script), Some(s.witness_script)),
        WalletScripts::P2wsh(s) => (None, Some(s.witness_script)),
        WalletScripts::P2trLegacy(_) | WalletScripts::P2trMusig2(_) => (None, None),
    };
    Ok(OutputScript2of3 {
        script_pub_key,
        redeem_script,
        witness_script,
    })
}

/// Whether a chain is for receiving (external) or change (internal) addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Scope {
    /// External chains are for receiving addresses (even chain values: 0, 10, 20, 30, 40).
    External,
    /// Internal chains are for change addresses (odd chain values: 1, 11, 21, 31, 41).
    Internal,
}

/// BitGo-Defined mappings between derivation path component and script type.
///
/// A Chain combines an `OutputScriptType` with a `Scope` (external/internal).
/// The chain value is used in derivation paths: `m/0/0/{chain}/{index}`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Chain {
    pub script_type: OutputScriptType,
    pub scope: Scope,
}

impl Chain {
    pub const fn new(script_type: OutputScriptType, scope: Scope) -> Self {
        Self { script_type, scope }
    }

    /// Get the u32 chain value for derivation paths.
    pub const fn value(&self) -> u32 {
        (match self.script_type {
            OutputScriptType::P2sh => 0,
            OutputScriptType::P2shP2wsh => 10,
            OutputScriptType::P2wsh => 20,
            OutputScriptType::P2trLegacy => 30,
            OutputScriptType::P2trMusig2 => 40,
        }) + match self.scope {
            Scope::External => 0,
            Scope::Internal => 1,
        }
    }
}

impl TryFrom<u32> for Chain {
    type Error = UtxoError;

    fn try_from(value: u32) -> Result<Self> {
        let (script_type, scope) = match value {
            0 => (OutputScriptType::P2sh, Scope::External),
            1 => (OutputScriptType::P2sh, Scope::Internal),
            10 => (OutputScriptType::P2shP2wsh, Scope::External),
            11 => (OutputScriptType::P2shP2wsh, Scope::Internal),
            20 => (OutputScriptType::P2wsh, Scope::External),
            21 => (OutputScriptType::P2wsh, Scope::Internal),
            30 => (OutputScriptType::P2trLegacy, Scope::External),
            31 => (OutputScriptType::P2trLegacy, Scope::Internal),
            40 => (OutputScriptType::P2trMusig2, Scope::External),
            41 => (OutputScriptType::P2trMusig2, Scope::Internal),
            _ => return Err(UtxoError::configuration(format!("no chain for {}", value))),
        };
        Ok(Chain::new(script_type, scope))
    }
}

impl FromStr for Chain {
    type Err = UtxoError;

    fn from_str(s: &str) -> Result<Self> {
        let chain: u32 = u32::from_str(s)
            .map_err(|e| UtxoError::configuration(format!("invalid chain '{}': {}", s, e)))?;
        Chain::try_from(chain)
    }
}

/// Script type of the output at `chain`.
pub fn script_type_for_chain(chain: u32) -> Result<OutputScriptType> {
    Chain::try_from(chain).map(|c| c.script_type)
}

/// Fixed-script wallet script types (2-of-3 multisig)
///
/// This enum represents the abstract script type, independent of chain (external/internal).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OutputScriptType {
    /// Legacy Pay-To-Script-Hash (chains 0, 1)
    P2sh,
    /// Wrapped-Segwit Pay-To-Script-Hash (chains 10, 11)
    P2shP2wsh,
    /// Native Segwit Pay-To-Witness-Script-Hash (chains 20, 21)
    P2wsh,
    /// Legacy Taproot, script-path only (chains 30, 31)
    P2trLegacy,
    /// Taproot with MuSig2 key-path support (chains 40, 41)
    P2trMusig2,
}

const ALL_SCRIPT_TYPES: [OutputScriptType; 5] = [
    OutputScriptType::P2sh,
    OutputScriptType::P2shP2wsh,
    OutputScriptType::P2wsh,
    OutputScriptType::P2trLegacy,
    OutputScriptType::P2trMusig2,
];

impl FromStr for OutputScriptType {
    type Err = UtxoError;

    /// Accepts output script types and the input script types that map onto them:
    /// "p2shP2pk" (→ P2sh), "p2trMusig2ScriptPath"/"p2trMusig2KeyPath" (→ P2trMusig2)
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "p2sh" | "p2shP2pk" => Ok(OutputScriptType::P2sh),
            "p2shP2wsh" => Ok(OutputScriptType::P2shP2wsh),
            "p2wsh" => Ok(OutputScriptType::P2wsh),
            "p2tr" | "p2trLegacy" => Ok(OutputScriptType::P2trLegacy),
            "p2trMusig2" | "p2trMusig2ScriptPath" | "p2trMusig2KeyPath" => {
                Ok(OutputScriptType::P2trMusig2)
            }
            _ => Err(UtxoError::configuration(format!(
                "Unknown script type '{}'. Expected: p2sh, p2shP2wsh, p2wsh, p2trLegacy, p2trMusig2",
                s
            ))),
        }
    }
}

impl OutputScriptType {
    pub fn all() -> &'static [OutputScriptType; 5] {
        &ALL_SCRIPT_TYPES
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputScriptType::P2sh => "p2sh",
            OutputScriptType::P2shP2wsh => "p2shP2wsh",
            OutputScriptType::P2wsh => "p2wsh",
            OutputScriptType::P2trLegacy => "p2trLegacy",
            OutputScriptType::P2trMusig2 => "p2trMusig2",
        }
    }

    pub fn is_segwit(&self) -> bool {
        !matches!(self, OutputScriptType::P2sh)
    }

    pub fn is_taproot(&self) -> bool {
        matches!(
            self,
            OutputScriptType::P2trLegacy | OutputScriptType::P2trMusig2
        )
    }
}

impl std::fmt::Display for OutputScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

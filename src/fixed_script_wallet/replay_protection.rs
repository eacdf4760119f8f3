use miniscript::bitcoin::{CompressedPublicKey, Script, ScriptBuf};

use crate::fixed_script_wallet::wallet_scripts::ScriptP2shP2pk;
use crate::networks::Network;

/// Output scripts of unspents that only the platform signs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayProtection {
    pub permitted_output_scripts: Vec<ScriptBuf>,
}

impl ReplayProtection {
    pub fn new(permitted_output_scripts: Vec<ScriptBuf>) -> Self {
        Self {
            permitted_output_scripts,
        }
    }

    /// The static replay protection list of `network`. Empty on networks
    /// without a fork id.
    pub fn for_network(network: Network) -> Self {
        Self::new(network.replay_protection_scripts())
    }

    /// Create from public keys by deriving P2SH-P2PK output scripts
    pub fn from_public_keys(public_keys: Vec<CompressedPublicKey>) -> Self {
        let output_scripts = public_keys
            .into_iter()
            .map(|key| ScriptP2shP2pk::new(key).output_script())
            .collect();
        Self {
            permitted_output_scripts: output_scripts,
        }
    }

    pub fn is_replay_protection_input(&self, output_script: &Script) -> bool {
        self.permitted_output_scripts
            .iter()
            .any(|s| s.as_script() == output_script)
    }
}

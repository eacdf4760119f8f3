use crate::error::UtxoError;

/// Which output script families a network can spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputScriptSupport {
    pub segwit: bool,
    pub taproot: bool,
}

impl OutputScriptSupport {
    pub fn assert_legacy(&self) -> Result<(), UtxoError> {
        Ok(())
    }

    pub fn assert_segwit(&self) -> Result<(), UtxoError> {
        if !self.segwit {
            return Err(UtxoError::configuration("Network does not support segwit"));
        }
        Ok(())
    }

    pub fn assert_taproot(&self) -> Result<(), UtxoError> {
        if !self.taproot {
            return Err(UtxoError::configuration("Network does not support taproot"));
        }
        Ok(())
    }
}

/// Textual address encoding to produce for networks with more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFormat {
    /// Base58Check or Bech32, depending on the script.
    #[default]
    Default,
    /// CashAddr, only valid on Bitcoin Cash and eCash.
    Cashaddr,
}

impl std::str::FromStr for AddressFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(AddressFormat::Default),
            "cashaddr" => Ok(AddressFormat::Cashaddr),
            _ => Err(format!("unknown address format '{}'", s)),
        }
    }
}

use thiserror::Error;

/// Errors raised by the wallet engine.
///
/// Per-input signing and verification failures are collected into
/// [`UtxoError::Aggregate`]; every other kind is raised where it is detected.
#[derive(Debug, Error)]
pub enum UtxoError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("unsupported transaction: {0}")]
    UnsupportedTransaction(String),

    #[error("signing error on input {input_index}: {message}")]
    Signing { input_index: usize, message: String },

    #[error("verification error on input {input_index}: {message}")]
    Verification { input_index: usize, message: String },

    #[error("{} input(s) failed: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<UtxoError>),
}

fn join_errors(errors: &[UtxoError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, UtxoError>;

impl UtxoError {
    pub fn configuration(message: impl Into<String>) -> Self {
        UtxoError::Configuration(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        UtxoError::Format(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        UtxoError::Consistency(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        UtxoError::UnsupportedTransaction(message.into())
    }

    pub fn signing(input_index: usize, message: impl Into<String>) -> Self {
        UtxoError::Signing {
            input_index,
            message: message.into(),
        }
    }

    pub fn verification(input_index: usize, message: impl Into<String>) -> Self {
        UtxoError::Verification {
            input_index,
            message: message.into(),
        }
    }

    /// Turn a collected list of per-input failures into a single result.
    ///
    /// An empty list is success and a single failure is returned unwrapped.
    pub fn aggregate(mut errors: Vec<UtxoError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => {
                log::warn!("{} inputs failed", errors.len());
                Err(UtxoError::Aggregate(errors))
            }
        }
    }

    /// Input indices carried by per-input errors, flattening aggregates.
    pub fn input_indices(&self) -> Vec<usize> {
        match self {
            UtxoError::Signing { input_index, .. } | UtxoError::Verification { input_index, .. } => {
                vec![*input_index]
            }
            UtxoError::Aggregate(errors) => errors.iter().flat_map(|e| e.input_indices()).collect(),
            _ => vec![],
        }
    }
}

impl From<miniscript::bitcoin::consensus::encode::Error> for UtxoError {
    fn from(e: miniscript::bitcoin::consensus::encode::Error) -> Self {
        UtxoError::Format(e.to_string())
    }
}

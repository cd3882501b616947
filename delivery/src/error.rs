use catalog::model::Difficulty;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Malformed request. Raised before any collaborator is called.
    #[error("invalid delivery request: {0}")]
    Validation(String),

    #[error("insufficient questions available for difficulty '{difficulty}'")]
    InsufficientPool { difficulty: Difficulty },

    /// A catalog, history or unseen-count read failed. Not retried here.
    #[error("upstream read '{operation}' failed: {source}")]
    Upstream {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl DeliveryError {
    pub(crate) fn upstream(operation: &'static str, err: anyhow::Error) -> Self {
        DeliveryError::Upstream {
            operation,
            source: err.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DeliveryError::Validation(_))
    }
}

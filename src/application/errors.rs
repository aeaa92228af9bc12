// Application error taxonomy. Store-specific codes are mapped into it at
// this boundary; callers only ever see these variants.

use crate::core::payment::TransitionError;
use crate::core::ports::StoreError;
use crate::core::session::decide::DecideError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no authenticated actor")]
    Auth,
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                EngineError::NotFound(format!("{collection}/{id}"))
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<DecideError> for EngineError {
    fn from(err: DecideError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::MissingDisputeReason => EngineError::Validation(err.to_string()),
            invalid => EngineError::Conflict(invalid.to_string()),
        }
    }
}

pub fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|err| EngineError::Validation(format!("encode: {err}")))
}

pub fn decode<T: serde::de::DeserializeOwned>(value: &serde_json::Value) -> Result<T, EngineError> {
    serde_json::from_value(value.clone())
        .map_err(|err| EngineError::Validation(format!("decode: {err}")))
}

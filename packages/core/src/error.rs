use crate::store::StoreError;
use crate::types::GroupId;

/// Errors returned by [`Engine`](crate::engine::Engine) operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A setting value outside its enumerated set.
    #[error("invalid value {value:?} for {key}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    /// The caller may not perform the operation.
    #[error("{0}")]
    Forbidden(String),
}

//! Error taxonomy for the multi-layer DAL, mirroring the layout of
//! `veltro_core::error::CoreError` (one flat `thiserror` enum, no nested
//! causes threaded through every variant).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DalError {
    #[error("key not found")]
    NotFound,

    #[error("dal is closed")]
    Closed,

    #[error("layer not found: {0}")]
    LayerNotFound(String),

    #[error("layer is read-only")]
    ReadOnly,

    #[error("size limit exceeded")]
    SizeLimitExceeded,

    #[error("eviction failed: {0}")]
    EvictionFailed(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("layer does not support iteration")]
    IterationNotSupported,

    #[error("layer does not support transactions")]
    TxNotSupported,

    #[error("no writable layers configured")]
    NoWritableLayers,
}

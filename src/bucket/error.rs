use crate::bucket::metrics::{Operation, PrometheusError};
use crate::config::ConfigError;
use crate::context::CancelReason;
use crate::s3::S3Error;
use thiserror::Error;

/// Errors returned by bucket operations
#[derive(Error, Debug)]
pub enum BucketError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("initialize s3 client: {0}")]
    ClientInit(#[source] S3Error),

    #[error("register bucket metrics: {0}")]
    Metrics(#[from] PrometheusError),

    #[error("{op} {key}: {source}")]
    Remote {
        op: Operation,
        key: String,
        #[source]
        source: S3Error,
    },

    #[error("invalid range: offset {offset}, length {length}")]
    InvalidRange { offset: i64, length: i64 },

    #[error("{op}: {reason}")]
    Cancelled { op: Operation, reason: CancelReason },

    /// Error returned by an iteration callback, passed through unchanged
    #[error(transparent)]
    Callback(Box<dyn std::error::Error + Send + Sync>),
}

impl BucketError {
    pub(crate) fn remote(op: Operation, key: &str, source: S3Error) -> Self {
        BucketError::Remote {
            op,
            key: key.to_string(),
            source,
        }
    }

    /// Wrap an arbitrary error raised inside an iteration callback.
    pub fn callback<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        BucketError::Callback(err.into())
    }

    /// True when the store reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BucketError::Remote { source, .. } if source.is_no_such_key())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BucketError::Cancelled { .. })
    }
}

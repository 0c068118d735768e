//! Per-operation counters
//!
//! One `IntCounterVec` per bucket, labelled with the operation kind and a
//! constant `bucket` label.

use prometheus::core::Collector;
use prometheus::{IntCounterVec, Opts, Registry};
use std::fmt;

pub use prometheus::Error as PrometheusError;

pub const OPERATIONS_TOTAL: &str = "objstore_s3_bucket_operations_total";

/// Kind of remote operation, used as the `operation` label value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Put,
    Stat,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Get,
        Operation::Put,
        Operation::Stat,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Stat => "stat",
            Operation::Delete => "delete",
        }
    }

    /// S3 API call backing this operation
    pub fn remote_verb(&self) -> &'static str {
        match self {
            Operation::List => "ListObjectsV2",
            Operation::Get => "GetObject",
            Operation::Put => "PutObject",
            Operation::Stat => "HeadObject",
            Operation::Delete => "DeleteObject",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional prometheus registry. Cloning keeps pointing at the same registry.
#[derive(Clone, Debug)]
pub struct MetricsRegistry(Option<Registry>);

impl MetricsRegistry {
    pub fn new(registry: Registry) -> Self {
        Self(Some(registry))
    }

    /// A registry that records nothing. Counters still work locally.
    pub fn dummy() -> Self {
        Self(None)
    }

    pub fn register<T: Clone + Collector + 'static>(&self, metric: T) -> Result<T, PrometheusError> {
        if let Some(reg) = &self.0 {
            reg.register(Box::new(metric.clone()))?;
        }
        Ok(metric)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.0.as_ref()
    }
}

impl From<Registry> for MetricsRegistry {
    fn from(registry: Registry) -> Self {
        Self::new(registry)
    }
}

#[derive(Clone, Debug)]
pub struct OpsMetrics {
    ops_total: IntCounterVec,
}

impl OpsMetrics {
    pub fn register(registry: &MetricsRegistry, bucket: &str) -> Result<Self, PrometheusError> {
        let opts = Opts::new(
            OPERATIONS_TOTAL,
            "Total number of operations that were executed against an s3 bucket.",
        )
        .const_label("bucket", bucket);
        let ops_total = registry.register(IntCounterVec::new(opts, &["operation"])?)?;
        // Export every kind at zero from the start
        for op in Operation::ALL {
            ops_total.with_label_values(&[op.as_str()]);
        }

        Ok(Self { ops_total })
    }

    pub fn inc(&self, op: Operation) {
        self.ops_total.with_label_values(&[op.as_str()]).inc();
    }

    pub fn count(&self, op: Operation) -> u64 {
        self.ops_total.with_label_values(&[op.as_str()]).get()
    }
}

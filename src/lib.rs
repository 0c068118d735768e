//! objstore - directory-style access to S3-compatible object storage

pub mod bucket;
pub mod config;
pub mod context;
pub mod s3;

pub use bucket::{Bucket, BucketError, MetricsRegistry, ObjectBucket, DIR_DELIM};
pub use config::Config;
pub use context::Context;

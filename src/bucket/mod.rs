//! Directory-style access to an S3 bucket
//!
//! [`Bucket`] maps path semantics onto the flat key namespace of an
//! S3-compatible store. Every operation counts itself in [`OpsMetrics`]
//! before touching the network, takes a [`Context`] and issues one remote
//! operation.

pub mod error;
pub mod metrics;

pub use error::BucketError;
pub use metrics::{MetricsRegistry, Operation, OpsMetrics};

use crate::config::Config;
use crate::context::{CancelReason, Context};
use crate::s3::{MultipartConfig, ObjectReader, S3Client, ServerSideEncryption, TransportConfig};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::future::Future;
use tokio::io::AsyncRead;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, BucketError>;

/// Delimiter used to emulate directories
pub const DIR_DELIM: &str = "/";

/// Listing prefix for a directory: non-empty names end in exactly one
/// delimiter.
pub fn normalize_dir(dir: &str) -> String {
    if dir.is_empty() {
        return String::new();
    }
    let mut prefix = dir.trim_end_matches(DIR_DELIM).to_string();
    prefix.push_str(DIR_DELIM);
    prefix
}

/// Inclusive byte range `(first, last)` for `[offset, offset + length)`.
/// `None` when the range is empty.
fn byte_range(offset: i64, length: i64) -> Result<Option<(u64, u64)>> {
    let invalid = || BucketError::InvalidRange { offset, length };

    if offset < 0 || length < 0 {
        return Err(invalid());
    }
    if length == 0 {
        return Ok(None);
    }
    let last = offset.checked_add(length - 1).ok_or_else(invalid)?;
    Ok(Some((offset as u64, last as u64)))
}

/// Operations higher-level storage code is written against
#[async_trait]
pub trait ObjectBucket: Send + Sync {
    fn name(&self) -> &str;

    /// Calls `f` with every entry directly under `dir`: object keys and
    /// sub-directory prefixes (ending in [`DIR_DELIM`]).
    async fn iter(
        &self,
        ctx: &Context,
        dir: &str,
        f: &mut (dyn for<'e> FnMut(&'e str) -> Result<()> + Send),
    ) -> Result<()>;

    async fn get(&self, ctx: &Context, name: &str) -> Result<ObjectReader>;

    async fn get_range(
        &self,
        ctx: &Context,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader>;

    /// `Ok(false)` only when the store confirms the object is absent.
    async fn exists(&self, ctx: &Context, name: &str) -> Result<bool>;

    async fn upload(
        &self,
        ctx: &Context,
        name: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<()>;

    async fn delete(&self, ctx: &Context, name: &str) -> Result<()>;
}

/// Bucket client
///
/// Holds no per-call state; share it freely (`Arc<Bucket>` or `&Bucket`).
#[derive(Clone)]
pub struct Bucket {
    client: S3Client,
    name: String,
    sse: Option<ServerSideEncryption>,
    multipart: MultipartConfig,
    metrics: OpsMetrics,
}

impl Bucket {
    /// Validate `config`, build the S3 client and register the operation
    /// counters. No network calls are made.
    pub fn new(config: &Config, registry: &MetricsRegistry, component: &str) -> Result<Self> {
        Self::with_transport(config, registry, component, &TransportConfig::default())
    }

    pub fn with_transport(
        config: &Config,
        registry: &MetricsRegistry,
        component: &str,
        transport: &TransportConfig,
    ) -> Result<Self> {
        config.validate()?;

        let client = S3Client::with_transport(config, component, transport)
            .map_err(BucketError::ClientInit)?;
        let metrics = OpsMetrics::register(registry, &config.bucket)?;

        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            signature = ?config.signature_version,
            sse = config.sse_encryption,
            "s3 bucket client created"
        );

        Ok(Self {
            client,
            name: config.bucket.clone(),
            sse: ServerSideEncryption::from_flag(config.sse_encryption),
            multipart: MultipartConfig::default(),
            metrics,
        })
    }

    /// Override the part size used by uploads.
    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &OpsMetrics {
        &self.metrics
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }

    /// Run one remote call under `ctx`, wrapping failures with `op` and `key`.
    async fn remote<T, F>(&self, ctx: &Context, op: Operation, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = crate::s3::Result<T>>,
    {
        ctx.run(fut)
            .await
            .map_err(|reason| cancelled(op, reason))?
            .map_err(|err| BucketError::remote(op, key, err))
    }

    /// Calls `f` for each entry directly under `dir`.
    ///
    /// Pages are fetched as `f` consumes them. An error from `f` stops
    /// iteration and is returned as is.
    pub async fn iter<F>(&self, ctx: &Context, dir: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()> + Send,
    {
        self.metrics.inc(Operation::List);

        let prefix = normalize_dir(dir);
        let pages = self.client.list_pages(&prefix, Some(DIR_DELIM));
        futures::pin_mut!(pages);

        loop {
            let page = self
                .remote(ctx, Operation::List, &prefix, pages.try_next())
                .await?;
            let Some(page) = page else {
                break;
            };

            for entry in page.into_entries() {
                // Empty buckets may report a single empty key
                if entry.is_empty() {
                    continue;
                }
                if let Some(reason) = ctx.err() {
                    return Err(cancelled(Operation::List, reason));
                }
                f(&entry)?;
            }
        }

        Ok(())
    }

    /// Stream the whole object.
    pub async fn get(&self, ctx: &Context, name: &str) -> Result<ObjectReader> {
        self.metrics.inc(Operation::Get);

        self.remote(
            ctx,
            Operation::Get,
            name,
            self.client.get_object(name, None, self.sse.as_ref()),
        )
        .await
    }

    /// Stream `length` bytes starting at `offset`. A zero length yields an
    /// empty stream without a request.
    pub async fn get_range(
        &self,
        ctx: &Context,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader> {
        self.metrics.inc(Operation::Get);

        let Some(range) = byte_range(offset, length)? else {
            return Ok(Box::pin(tokio::io::empty()));
        };
        debug!(bucket = %self.name, key = %name, first = range.0, last = range.1, "get range");

        self.remote(
            ctx,
            Operation::Get,
            name,
            self.client.get_object(name, Some(range), self.sse.as_ref()),
        )
        .await
    }

    /// Whether `name` exists. A missing key is `Ok(false)`; every other
    /// failure is an error.
    pub async fn exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        self.metrics.inc(Operation::Stat);

        match self
            .remote(ctx, Operation::Stat, name, self.client.head_object(name))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Upload the full contents of `source` to `name`, replacing any
    /// existing object.
    pub async fn upload<R>(&self, ctx: &Context, name: &str, source: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        self.metrics.inc(Operation::Put);

        let etag = self
            .remote(
                ctx,
                Operation::Put,
                name,
                self.client
                    .upload_stream(name, source, &self.multipart, self.sse.as_ref()),
            )
            .await?;

        debug!(bucket = %self.name, key = %name, etag = %etag, "uploaded object");
        Ok(())
    }

    /// Remove `name`. Missing keys are left to the store to report.
    pub async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        self.metrics.inc(Operation::Delete);

        self.remote(ctx, Operation::Delete, name, self.client.delete_object(name))
            .await
    }
}

fn cancelled(op: Operation, reason: CancelReason) -> BucketError {
    BucketError::Cancelled { op, reason }
}

#[async_trait]
impl ObjectBucket for Bucket {
    fn name(&self) -> &str {
        Bucket::name(self)
    }

    async fn iter(
        &self,
        ctx: &Context,
        dir: &str,
        f: &mut (dyn for<'e> FnMut(&'e str) -> Result<()> + Send),
    ) -> Result<()> {
        Bucket::iter(self, ctx, dir, f).await
    }

    async fn get(&self, ctx: &Context, name: &str) -> Result<ObjectReader> {
        Bucket::get(self, ctx, name).await
    }

    async fn get_range(
        &self,
        ctx: &Context,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader> {
        Bucket::get_range(self, ctx, name, offset, length).await
    }

    async fn exists(&self, ctx: &Context, name: &str) -> Result<bool> {
        Bucket::exists(self, ctx, name).await
    }

    async fn upload(
        &self,
        ctx: &Context,
        name: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<()> {
        Bucket::upload(self, ctx, name, source).await
    }

    async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        Bucket::delete(self, ctx, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    fn test_config() -> Config {
        let mut config = Config::new("thanos", "127.0.0.1:9000", "access", "secret");
        config.insecure = true;
        config
    }

    #[test]
    fn test_normalize_dir() {
        assert_eq!(normalize_dir(""), "");
        assert_eq!(normalize_dir("logs"), "logs/");
        assert_eq!(normalize_dir("logs/"), "logs/");
        assert_eq!(normalize_dir("logs///"), "logs/");
        assert_eq!(normalize_dir("a/b"), "a/b/");
    }

    #[test]
    fn test_byte_range() {
        assert_eq!(byte_range(0, 1).unwrap(), Some((0, 0)));
        assert_eq!(byte_range(10, 5).unwrap(), Some((10, 14)));
        assert_eq!(byte_range(0, 0).unwrap(), None);
        assert_eq!(byte_range(7, 0).unwrap(), None);

        for (offset, length) in [(-1, 5), (-1, 0), (0, -3), (i64::MAX, 2)] {
            assert!(matches!(
                byte_range(offset, length),
                Err(BucketError::InvalidRange { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let mut config = test_config();
        config.secret_key.clear();

        let err = Bucket::new(&config, &MetricsRegistry::dummy(), "test")
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BucketError::Config(ConfigError::Missing { field: "secret key" })
        ));
    }

    #[tokio::test]
    async fn test_new_rejects_endpoint_with_scheme() {
        let mut config = test_config();
        config.endpoint = "http://127.0.0.1:9000".to_string();

        let err = Bucket::new(&config, &MetricsRegistry::dummy(), "test")
            .err()
            .unwrap();
        assert!(matches!(err, BucketError::ClientInit(_)));
    }

    #[tokio::test]
    async fn test_invalid_range_counts_get_without_network() {
        let bucket = Bucket::new(&test_config(), &MetricsRegistry::dummy(), "test").unwrap();
        let ctx = Context::new();

        let err = bucket.get_range(&ctx, "obj", -1, 10).await.err().unwrap();
        assert!(matches!(err, BucketError::InvalidRange { offset: -1, length: 10 }));
        assert_eq!(bucket.metrics().count(Operation::Get), 1);
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_before_request() {
        let bucket = Bucket::new(&test_config(), &MetricsRegistry::dummy(), "test").unwrap();
        let ctx = Context::new();
        ctx.cancel();

        let err = bucket.exists(&ctx, "obj").await.err().unwrap();
        assert!(err.is_cancelled());
        assert_eq!(bucket.metrics().count(Operation::Stat), 1);
    }

    #[tokio::test]
    async fn test_sse_resolved_from_flag() {
        let bucket = Bucket::new(&test_config(), &MetricsRegistry::dummy(), "test").unwrap();
        assert!(bucket.sse.is_none());

        let mut config = test_config();
        config.sse_encryption = true;
        let bucket = Bucket::new(&config, &MetricsRegistry::dummy(), "test").unwrap();
        assert_eq!(bucket.sse, Some(ServerSideEncryption::S3));
    }
}

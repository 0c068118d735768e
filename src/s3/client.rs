//! S3 client implementation with core operations
//!
//! - Path-style addressing (`scheme://endpoint/bucket/key`)
//! - Tuned hyper connection pool shared by every clone
//! - SigV4 or SigV2 signing, chosen once at construction
//! - UNSIGNED-PAYLOAD for object data (skips SHA256 of the body)
//! - Streaming object reads, part-buffered writes of unknown length
//! - No retries: every failure is returned to the caller

use crate::config::Config;
use crate::s3::signer::Signer;
use crate::s3::transport::{TimeoutConnector, TransportConfig};
use crate::s3::types::{
    CompleteMultipartUploadResponse, CompletedPart, CreateMultipartUploadResponse,
    ListObjectsResponse, MultipartConfig, ObjectInfo, ServerSideEncryption,
};
use crate::s3::xml;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use native_tls::TlsConnector;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Page size requested from ListObjectsV2
const LIST_MAX_KEYS: u32 = 1000;

/// Streaming body of an object read. Dropping it releases the connection.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Request failed: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("S3 error: {status} {code} - {message}")]
    S3Response {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("no response headers within {0:?}")]
    ResponseTimeout(Duration),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::XmlParse(err.to_string())
    }
}

impl S3Error {
    /// S3 error code, when the store answered with one
    pub fn code(&self) -> Option<&str> {
        match self {
            S3Error::S3Response { code, .. } => Some(code),
            _ => None,
        }
    }

    /// HTTP status, when the store answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            S3Error::S3Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_no_such_key(&self) -> bool {
        self.code() == Some("NoSuchKey")
    }

    /// Build the error for a non-success response.
    ///
    /// Responses without an error document (HEAD) get a code derived from the
    /// status, with 404 meaning `NoSuchKey` for object requests.
    fn from_response(status: StatusCode, body: &[u8], object_request: bool) -> Self {
        if let Some(err) = xml::parse_error_response(body) {
            return S3Error::S3Response {
                status,
                code: err.code,
                message: err.message,
            };
        }

        let code = match status {
            StatusCode::NOT_FOUND if object_request => "NoSuchKey",
            StatusCode::NOT_FOUND => "NoSuchBucket",
            StatusCode::FORBIDDEN => "AccessDenied",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::BAD_REQUEST => "BadRequest",
            _ => status.canonical_reason().unwrap_or("Unknown"),
        };

        S3Error::S3Response {
            status,
            code: code.to_string(),
            message: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;

type Connector = TimeoutConnector<HttpsConnector<HttpConnector>>;

/// Whether the response-header timeout applies to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderDeadline {
    /// Control requests: headers must arrive within the timeout
    Bounded,
    /// Requests carrying object data: the clock would include the upload
    Unbounded,
}

/// S3 client bound to one bucket
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct S3Client {
    client: HyperClient<Connector, Full<Bytes>>,
    signer: Signer,
    /// `scheme://host[:port]`
    base_url: String,
    bucket: String,
    user_agent: String,
    response_header_timeout: Duration,
}

impl S3Client {
    /// Build a client from validated configuration with the default transport.
    ///
    /// No network calls are made.
    pub fn new(config: &Config, component: &str) -> Result<Self> {
        Self::with_transport(config, component, &TransportConfig::default())
    }

    pub fn with_transport(
        config: &Config,
        component: &str,
        transport: &TransportConfig,
    ) -> Result<Self> {
        let base_url = endpoint_url(&config.endpoint, config.insecure)?;
        if config.insecure {
            warn!(endpoint = %config.endpoint, "using plain HTTP for s3 endpoint");
        }

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(transport.dial_timeout));
        http.set_keepalive(Some(transport.keep_alive));
        http.set_happy_eyeballs_timeout(transport.happy_eyeballs_timeout);

        let tls = TlsConnector::new()?;
        let https = HttpsConnector::from((http, tls.into()));
        let connector = TimeoutConnector::new(https, transport.connect_budget());

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(transport.idle_conn_timeout)
            .pool_max_idle_per_host(transport.max_idle_conns)
            .set_host(true)
            .build(connector);

        let signer = Signer::new(
            config.signature_version,
            config.access_key.clone(),
            config.secret_key.clone(),
            Some(config.region.clone()),
        );

        Ok(Self {
            client,
            signer,
            base_url,
            bucket: config.bucket.clone(),
            user_agent: user_agent(component),
            response_header_timeout: transport.response_header_timeout,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Encode an S3 key, preserving forward slashes
    fn encode_s3_key(key: &str) -> Cow<'_, str> {
        let is_plain = |b: u8| {
            matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/')
        };

        if key.bytes().all(is_plain) {
            return Cow::Borrowed(key);
        }

        let mut result = String::with_capacity(key.len() + 32);
        for byte in key.bytes() {
            if is_plain(byte) {
                result.push(byte as char);
            } else {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
        Cow::Owned(result)
    }

    /// Encode a query parameter value (RFC 3986) into `buf`
    fn url_encode_into(buf: &mut String, s: &str) {
        for byte in s.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    buf.push(byte as char);
                }
                _ => {
                    buf.push('%');
                    buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.base_url, self.bucket)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, Self::encode_s3_key(key))
    }

    fn upload_url(&self, key: &str, upload_id: &str, part_number: Option<u32>) -> String {
        let mut url = self.object_url(key);
        url.push('?');
        if let Some(part_number) = part_number {
            let _ = write!(url, "partNumber={}&", part_number);
        }
        url.push_str("uploadId=");
        Self::url_encode_into(&mut url, upload_id);
        url
    }

    /// Build the URL of a ListObjectsV2 request.
    ///
    /// Parameters are emitted in alphabetical order.
    pub fn build_list_url(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: u32,
    ) -> String {
        let mut url = self.bucket_url();
        url.push_str("/?");

        if let Some(token) = continuation_token {
            url.push_str("continuation-token=");
            Self::url_encode_into(&mut url, token);
            url.push('&');
        }
        if let Some(d) = delimiter {
            url.push_str("delimiter=");
            Self::url_encode_into(&mut url, d);
            url.push('&');
        }
        let _ = write!(url, "list-type=2&max-keys={}", max_keys);
        if let Some(p) = prefix {
            url.push_str("&prefix=");
            Self::url_encode_into(&mut url, p);
        }

        url
    }

    /// Sign and send one request.
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: BTreeMap<String, String>,
        body: Bytes,
        deadline: HeaderDeadline,
    ) -> Result<Response<Incoming>> {
        let signed = match deadline {
            HeaderDeadline::Unbounded => {
                self.signer
                    .sign_unsigned_payload(method.as_str(), url, headers)
            }
            HeaderDeadline::Bounded => self.signer.sign(method.as_str(), url, headers, &body),
        };

        let uri: Uri = url
            .parse()
            .map_err(|e| S3Error::InvalidResponse(format!("Invalid request URL {}: {}", url, e)))?;

        let mut req = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(hyper::header::USER_AGENT, &self.user_agent);
        for (key, value) in signed.iter() {
            req = req.header(key, value);
        }
        let request = req.body(Full::new(body))?;

        let pending = self.client.request(request);
        let response = match deadline {
            HeaderDeadline::Bounded => {
                tokio::time::timeout(self.response_header_timeout, pending)
                    .await
                    .map_err(|_| S3Error::ResponseTimeout(self.response_header_timeout))??
            }
            HeaderDeadline::Unbounded => pending.await?,
        };

        debug!(
            method = %method,
            bucket = %self.bucket,
            url = %url,
            status = %response.status(),
            "s3 request"
        );
        Ok(response)
    }

    /// Send a request and collect its body, failing on non-success statuses.
    async fn send_collect(
        &self,
        method: Method,
        url: &str,
        headers: BTreeMap<String, String>,
        body: Bytes,
        object_request: bool,
    ) -> Result<(HeaderMap, Bytes)> {
        let response = self
            .send(method, url, headers, body, HeaderDeadline::Bounded)
            .await?;
        let status = response.status();
        let (parts, body) = response.into_parts();
        // Always drain the body so the connection returns to the pool
        let body_bytes = body.collect().await?.to_bytes();

        if !status.is_success() {
            return Err(S3Error::from_response(status, &body_bytes, object_request));
        }
        Ok((parts.headers, body_bytes))
    }

    /// Turn a failed response into an error, draining its body.
    async fn error_from(response: Response<Incoming>, object_request: bool) -> S3Error {
        let status = response.status();
        match response.into_body().collect().await {
            Ok(body) => S3Error::from_response(status, &body.to_bytes(), object_request),
            Err(e) => S3Error::Hyper(e),
        }
    }

    /// Fetch one ListObjectsV2 page
    pub async fn list_objects_v2(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListObjectsResponse> {
        let url = self.build_list_url(prefix, delimiter, continuation_token, LIST_MAX_KEYS);
        let (_, body) = self
            .send_collect(Method::GET, &url, BTreeMap::new(), Bytes::new(), false)
            .await?;
        xml::parse_list_response(&body)
    }

    /// Lazily page through a listing.
    ///
    /// Each poll fetches at most one page; nothing is requested until the
    /// consumer pulls, and dropping the stream stops paging.
    pub fn list_pages<'a>(
        &'a self,
        prefix: &'a str,
        delimiter: Option<&'a str>,
    ) -> impl Stream<Item = Result<ListObjectsResponse>> + Send + 'a {
        // state: None = exhausted, Some(token) = next page to fetch
        futures::stream::try_unfold(Some(None::<String>), move |state| async move {
            let Some(token) = state else {
                return Ok(None);
            };

            let prefix = (!prefix.is_empty()).then_some(prefix);
            let mut page = self
                .list_objects_v2(prefix, delimiter, token.as_deref())
                .await?;

            let next = match page.next_continuation_token.take() {
                Some(token) if page.is_truncated && !token.is_empty() => Some(Some(token)),
                _ => None,
            };
            Ok::<_, S3Error>(Some((page, next)))
        })
    }

    /// Stream an object, optionally restricted to an inclusive byte range.
    pub async fn get_object(
        &self,
        key: &str,
        range: Option<(u64, u64)>,
        sse: Option<&ServerSideEncryption>,
    ) -> Result<ObjectReader> {
        let url = self.object_url(key);

        let mut headers = BTreeMap::new();
        if let Some((first, last)) = range {
            headers.insert("range".to_string(), format!("bytes={}-{}", first, last));
        }
        if let Some(sse) = sse {
            sse.apply_to_read(&mut headers);
        }

        let response = self
            .send(Method::GET, &url, headers, Bytes::new(), HeaderDeadline::Bounded)
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, true).await);
        }

        let frames = BodyStream::new(response.into_body())
            .try_filter_map(|frame| futures::future::ready(Ok(frame.into_data().ok())))
            .map_err(std::io::Error::other);

        Ok(Box::pin(StreamReader::new(frames)))
    }

    /// Fetch object metadata (HEAD)
    pub async fn head_object(&self, key: &str) -> Result<ObjectInfo> {
        let url = self.object_url(key);
        let (headers, _) = self
            .send_collect(Method::HEAD, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;

        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(ObjectInfo {
            size: header("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            etag: header("etag").map(|v| v.trim_matches('"').to_string()),
            last_modified: header("last-modified"),
            content_type: header("content-type"),
        })
    }

    /// Put a whole object in one request. Returns the ETag.
    pub async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        sse: Option<&ServerSideEncryption>,
    ) -> Result<String> {
        let url = self.object_url(key);

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );
        headers.insert("content-length".to_string(), data.len().to_string());
        if let Some(sse) = sse {
            sse.apply_to_write(&mut headers);
        }

        let response = self
            .send(Method::PUT, &url, headers, data, HeaderDeadline::Unbounded)
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, true).await);
        }

        let etag = etag_of(response.headers());
        response.into_body().collect().await?;
        Ok(etag)
    }

    /// Delete an object
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        let url = self.object_url(key);
        self.send_collect(Method::DELETE, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Multipart Upload Operations
    // =========================================================================

    /// Initiate a multipart upload (CreateMultipartUpload)
    pub async fn create_multipart_upload(
        &self,
        key: &str,
        sse: Option<&ServerSideEncryption>,
    ) -> Result<CreateMultipartUploadResponse> {
        let url = format!("{}?uploads", self.object_url(key));

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );
        if let Some(sse) = sse {
            sse.apply_to_write(&mut headers);
        }

        let (_, body) = self
            .send_collect(Method::POST, &url, headers, Bytes::new(), true)
            .await?;
        xml::parse_create_multipart_response(&body)
    }

    /// Upload one part (UploadPart). Part numbers start at 1.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart> {
        let url = self.upload_url(key, upload_id, Some(part_number));

        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_string(), data.len().to_string());

        let response = self
            .send(Method::PUT, &url, headers, data, HeaderDeadline::Unbounded)
            .await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, true).await);
        }

        let etag = etag_of(response.headers());
        response.into_body().collect().await?;
        Ok(CompletedPart::new(part_number, etag))
    }

    /// Complete a multipart upload (CompleteMultipartUpload)
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteMultipartUploadResponse> {
        let url = self.upload_url(key, upload_id, None);
        let body = Bytes::from(xml::complete_multipart_body(parts));

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/xml".to_string());
        headers.insert("content-length".to_string(), body.len().to_string());

        let (_, body) = self
            .send_collect(Method::POST, &url, headers, body, true)
            .await?;

        // The store may report a failure in a 200 response
        if let Some(err) = xml::parse_error_response(&body) {
            return Err(S3Error::S3Response {
                status: StatusCode::OK,
                code: err.code,
                message: err.message,
            });
        }
        xml::parse_complete_multipart_response(&body)
    }

    /// Abort a multipart upload, deleting its parts
    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let url = self.upload_url(key, upload_id, None);
        self.send_collect(Method::DELETE, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        Ok(())
    }

    /// Upload a source of unknown length. Returns the ETag.
    ///
    /// The first part is buffered; a source that ends inside it goes out as a
    /// single PUT. Longer sources become a multipart upload with parts sent
    /// sequentially as they are read, aborted if anything fails.
    pub async fn upload_stream<R>(
        &self,
        key: &str,
        reader: &mut R,
        config: &MultipartConfig,
        sse: Option<&ServerSideEncryption>,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let part_size = config.part_size();
        let first = read_part(reader, part_size).await?;
        if first.len() < part_size {
            return self.put_object(key, first, sse).await;
        }

        let upload_id = self.create_multipart_upload(key, sse).await?.upload_id;

        let result = async {
            let parts = self
                .upload_parts(key, &upload_id, first, reader, part_size)
                .await?;
            self.complete_multipart_upload(key, &upload_id, &parts)
                .await
        }
        .await;

        match result {
            Ok(complete) => Ok(complete.etag),
            Err(err) => {
                if let Err(abort_err) = self.abort_multipart_upload(key, &upload_id).await {
                    warn!(
                        bucket = %self.bucket,
                        key = %key,
                        upload_id = %upload_id,
                        error = %abort_err,
                        "failed to abort multipart upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts<R>(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        reader: &mut R,
        part_size: usize,
    ) -> Result<Vec<CompletedPart>>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut parts = Vec::new();
        let mut data = first;
        let mut part_number = 1u32;

        loop {
            parts.push(self.upload_part(key, upload_id, part_number, data).await?);

            data = read_part(reader, part_size).await?;
            if data.is_empty() {
                break;
            }
            part_number += 1;
        }

        Ok(parts)
    }
}

/// Read up to `part_size` bytes, stopping early only at end of input.
async fn read_part<R>(reader: &mut R, part_size: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buffer = Vec::with_capacity(part_size.min(1 << 20));
    (&mut *reader)
        .take(part_size as u64)
        .read_to_end(&mut buffer)
        .await?;
    Ok(Bytes::from(buffer))
}

fn etag_of(headers: &HeaderMap) -> String {
    headers
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
        .unwrap_or_default()
}

/// `scheme://endpoint` for a host[:port] endpoint.
fn endpoint_url(endpoint: &str, insecure: bool) -> Result<String> {
    if endpoint.contains("://") {
        return Err(S3Error::InvalidEndpoint(format!(
            "{} (endpoint must not include a scheme)",
            endpoint
        )));
    }

    let host = endpoint.trim_end_matches('/');
    if host.contains('/') {
        return Err(S3Error::InvalidEndpoint(format!(
            "{} (endpoint must not include a path)",
            endpoint
        )));
    }

    let scheme = if insecure { "http" } else { "https" };
    let url = format!("{}://{}", scheme, host);

    let uri: Uri = url
        .parse()
        .map_err(|e| S3Error::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
    if uri.host().map_or(true, str::is_empty) {
        return Err(S3Error::InvalidEndpoint(format!("{} (missing host)", endpoint)));
    }

    Ok(url)
}

fn user_agent(component: &str) -> String {
    format!(
        "objstore-{}/{} ({}; {})",
        component,
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignatureVersion;

    fn test_config() -> Config {
        let mut config = Config::new("my-bucket", "127.0.0.1:9000", "access", "secret");
        config.insecure = true;
        config
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = S3Client::new(&test_config(), "test").unwrap();

        assert_eq!(client.bucket(), "my-bucket");
        assert_eq!(client.base_url(), "http://127.0.0.1:9000");
        assert_eq!(client.signer().version(), SignatureVersion::V4);
        assert!(client.user_agent().starts_with("objstore-test/"));
    }

    #[tokio::test]
    async fn test_signature_v2_selected() {
        let mut config = test_config();
        config.signature_version = SignatureVersion::V2;
        let client = S3Client::new(&config, "test").unwrap();
        assert_eq!(client.signer().version(), SignatureVersion::V2);
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("s3.amazonaws.com", false).unwrap(),
            "https://s3.amazonaws.com"
        );
        assert_eq!(
            endpoint_url("minio:9000/", true).unwrap(),
            "http://minio:9000"
        );
        assert!(matches!(
            endpoint_url("https://s3.amazonaws.com", false),
            Err(S3Error::InvalidEndpoint(_))
        ));
        assert!(matches!(
            endpoint_url("host/path", false),
            Err(S3Error::InvalidEndpoint(_))
        ));
        assert!(matches!(
            endpoint_url("bad host", false),
            Err(S3Error::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_encode_s3_key() {
        assert!(matches!(
            S3Client::encode_s3_key("path/to/file.txt"),
            Cow::Borrowed("path/to/file.txt")
        ));
        assert_eq!(
            S3Client::encode_s3_key("path/to/file with spaces.txt"),
            "path/to/file%20with%20spaces.txt"
        );
    }

    #[tokio::test]
    async fn test_build_list_url() {
        let client = S3Client::new(&test_config(), "test").unwrap();

        assert_eq!(
            client.build_list_url(Some("logs/"), Some("/"), None, 1000),
            "http://127.0.0.1:9000/my-bucket/?delimiter=%2F&list-type=2&max-keys=1000&prefix=logs%2F"
        );
        assert_eq!(
            client.build_list_url(None, Some("/"), Some("a b"), 10),
            "http://127.0.0.1:9000/my-bucket/?continuation-token=a%20b&delimiter=%2F&list-type=2&max-keys=10"
        );
    }

    #[test]
    fn test_error_from_bodiless_response() {
        let err = S3Error::from_response(StatusCode::NOT_FOUND, b"", true);
        assert!(err.is_no_such_key());

        let err = S3Error::from_response(StatusCode::NOT_FOUND, b"", false);
        assert_eq!(err.code(), Some("NoSuchBucket"));

        let err = S3Error::from_response(StatusCode::FORBIDDEN, b"", true);
        assert_eq!(err.code(), Some("AccessDenied"));
        assert!(!err.is_no_such_key());
    }

    #[test]
    fn test_error_from_error_document() {
        let body = b"<Error><Code>NoSuchKey</Code><Message>gone</Message></Error>";
        let err = S3Error::from_response(StatusCode::NOT_FOUND, body, true);
        assert!(err.is_no_such_key());
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_read_part_stops_at_part_size() {
        let data = vec![7u8; 10];
        let mut reader = &data[..];

        let first = read_part(&mut reader, 4).await.unwrap();
        let second = read_part(&mut reader, 4).await.unwrap();
        let third = read_part(&mut reader, 4).await.unwrap();
        let fourth = read_part(&mut reader, 4).await.unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 4);
        assert_eq!(third.len(), 2);
        assert!(fourth.is_empty());
    }
}

//! In-process fake S3 server for integration tests
//!
//! Speaks the path-style subset the bucket client uses: ListObjectsV2,
//! GetObject (with Range), HeadObject, PutObject, multipart uploads and
//! DeleteObject. Requests are recorded; failures and delays can be injected.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use objstore::Config;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const BUCKET: &str = "thanos";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub key: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_list(&self) -> bool {
        self.method == Method::GET && self.query.contains_key("list-type")
    }
}

struct Upload {
    key: String,
    parts: BTreeMap<u32, Bytes>,
}

struct State {
    objects: Mutex<BTreeMap<String, Bytes>>,
    uploads: Mutex<HashMap<String, Upload>>,
    requests: Mutex<Vec<RecordedRequest>>,
    next_upload: AtomicUsize,
    page_size: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<(StatusCode, String)>>,
    fail_parts: AtomicBool,
    empty_key: AtomicBool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            objects: Mutex::default(),
            uploads: Mutex::default(),
            requests: Mutex::default(),
            next_upload: AtomicUsize::new(1),
            page_size: AtomicUsize::new(1000),
            delay: Mutex::default(),
            failure: Mutex::default(),
            fail_parts: AtomicBool::new(false),
            empty_key: AtomicBool::new(false),
        }
    }
}

pub struct FakeS3 {
    pub addr: SocketAddr,
    state: Arc<State>,
}

impl FakeS3 {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = server_state.clone();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(handle(&state, req).await) }
                    });
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        });

        Self { addr, state }
    }

    /// Configuration pointing at this server over plain HTTP
    pub fn config(&self) -> Config {
        let mut config = Config::new(BUCKET, self.addr.to_string(), "access", "secret");
        config.insecure = true;
        config
    }

    pub fn put(&self, key: &str, data: impl Into<Bytes>) {
        self.state
            .objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.into());
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.objects.lock().unwrap().get(key).cloned()
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.page_size.store(size, Ordering::SeqCst);
    }

    /// Hold every response for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    /// Answer every request with an error document.
    pub fn fail_all(&self, status: StatusCode, code: &str) {
        *self.state.failure.lock().unwrap() = Some((status, code.to_string()));
    }

    /// Reject every UploadPart request.
    pub fn fail_parts(&self) {
        self.state.fail_parts.store(true, Ordering::SeqCst);
    }

    /// Add an empty key to every listing, as some stores do for empty buckets.
    pub fn include_empty_key(&self) {
        self.state.empty_key.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn list_requests(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.is_list()).collect()
    }

    pub fn pending_uploads(&self) -> usize {
        self.state.uploads.lock().unwrap().len()
    }
}

async fn handle(state: &State, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let query = query_params(req.uri().query());
    let key = object_key(req.uri().path());

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        key: key.clone(),
        query: query.clone(),
        headers: req.headers().clone(),
    });

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let failure = state.failure.lock().unwrap().clone();
    if let Some((status, code)) = failure {
        return error(status, &code);
    }

    let range = req
        .headers()
        .get("range")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = match req.into_body().collect().await {
        Ok(body) => body.to_bytes(),
        Err(_) => return error(StatusCode::BAD_REQUEST, "IncompleteBody"),
    };

    match method {
        Method::GET if query.contains_key("list-type") => list(state, &query),
        Method::GET => get(state, &key, range.as_deref()),
        Method::HEAD => head(state, &key),
        Method::PUT if query.contains_key("uploadId") => upload_part(state, &query, body),
        Method::PUT => {
            let etag = etag(&body);
            state.objects.lock().unwrap().insert(key, body);
            Response::builder()
                .status(StatusCode::OK)
                .header("etag", format!("\"{}\"", etag))
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
        Method::POST if query.contains_key("uploads") => create_upload(state, &key),
        Method::POST if query.contains_key("uploadId") => complete_upload(state, &query),
        Method::DELETE if query.contains_key("uploadId") => {
            state.uploads.lock().unwrap().remove(&query["uploadId"]);
            empty(StatusCode::NO_CONTENT)
        }
        Method::DELETE => {
            state.objects.lock().unwrap().remove(&key);
            empty(StatusCode::NO_CONTENT)
        }
        _ => error(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed"),
    }
}

fn list(state: &State, query: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let prefix = query.get("prefix").map(String::as_str).unwrap_or("");
    let delimiter = query.get("delimiter").map(String::as_str).unwrap_or("");
    let start: usize = query
        .get("continuation-token")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let page_size = state.page_size.load(Ordering::SeqCst);

    // (name, is_prefix) in key order
    let mut entries = BTreeSet::new();
    for key in state.objects.lock().unwrap().keys() {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        match rest.find(delimiter).filter(|_| !delimiter.is_empty()) {
            Some(idx) => {
                entries.insert((format!("{}{}", prefix, &rest[..idx + delimiter.len()]), true));
            }
            None => {
                entries.insert((key.clone(), false));
            }
        }
    }
    let entries: Vec<(String, bool)> = entries.into_iter().collect();

    let end = (start + page_size).min(entries.len());
    let page = &entries[start.min(end)..end];
    let truncated = end < entries.len();

    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#);
    let _ = write!(xml, "<Name>{}</Name><Prefix>{}</Prefix>", BUCKET, escape(prefix));
    let _ = write!(xml, "<KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys>", page.len());
    let _ = write!(xml, "<IsTruncated>{}</IsTruncated>", truncated);
    if truncated {
        let _ = write!(xml, "<NextContinuationToken>{}</NextContinuationToken>", end);
    }
    if state.empty_key.load(Ordering::SeqCst) {
        xml.push_str("<Contents><Key></Key><Size>0</Size></Contents>");
    }
    for (name, is_prefix) in page {
        if *is_prefix {
            let _ = write!(xml, "<CommonPrefixes><Prefix>{}</Prefix></CommonPrefixes>", escape(name));
        } else {
            let size = state.objects.lock().unwrap().get(name).map_or(0, |b| b.len());
            let _ = write!(
                xml,
                "<Contents><Key>{}</Key><Size>{}</Size><ETag>\"etag\"</ETag></Contents>",
                escape(name),
                size
            );
        }
    }
    xml.push_str("</ListBucketResult>");

    xml_response(StatusCode::OK, xml)
}

fn get(state: &State, key: &str, range: Option<&str>) -> Response<Full<Bytes>> {
    let Some(data) = state.objects.lock().unwrap().get(key).cloned() else {
        return error(StatusCode::NOT_FOUND, "NoSuchKey");
    };

    let Some(range) = range else {
        return Response::builder()
            .status(StatusCode::OK)
            .header("content-length", data.len())
            .body(Full::new(data))
            .unwrap();
    };

    let parsed = range
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(a, b)| Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?)));
    let Some((first, last)) = parsed else {
        return error(StatusCode::BAD_REQUEST, "InvalidArgument");
    };
    if first >= data.len() {
        return error(StatusCode::RANGE_NOT_SATISFIABLE, "InvalidRange");
    }
    let last = last.min(data.len() - 1);

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header("content-range", format!("bytes {}-{}/{}", first, last, data.len()))
        .body(Full::new(data.slice(first..=last)))
        .unwrap()
}

fn head(state: &State, key: &str) -> Response<Full<Bytes>> {
    match state.objects.lock().unwrap().get(key) {
        Some(data) => Response::builder()
            .status(StatusCode::OK)
            .header("etag", format!("\"{}\"", etag(data)))
            .body(Full::new(Bytes::new()))
            .unwrap(),
        None => empty(StatusCode::NOT_FOUND),
    }
}

fn create_upload(state: &State, key: &str) -> Response<Full<Bytes>> {
    let upload_id = format!("upload-{}", state.next_upload.fetch_add(1, Ordering::SeqCst));
    state.uploads.lock().unwrap().insert(
        upload_id.clone(),
        Upload {
            key: key.to_string(),
            parts: BTreeMap::new(),
        },
    );

    xml_response(
        StatusCode::OK,
        format!(
            "<InitiateMultipartUploadResult><Bucket>{}</Bucket><Key>{}</Key><UploadId>{}</UploadId></InitiateMultipartUploadResult>",
            BUCKET,
            escape(key),
            upload_id
        ),
    )
}

fn upload_part(
    state: &State,
    query: &HashMap<String, String>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    if state.fail_parts.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError");
    }

    let part_number: u32 = query
        .get("partNumber")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    let mut uploads = state.uploads.lock().unwrap();
    let Some(upload) = uploads.get_mut(&query["uploadId"]) else {
        return error(StatusCode::NOT_FOUND, "NoSuchUpload");
    };

    let etag = etag(&body);
    upload.parts.insert(part_number, body);

    Response::builder()
        .status(StatusCode::OK)
        .header("etag", format!("\"{}\"", etag))
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn complete_upload(state: &State, query: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let Some(upload) = state.uploads.lock().unwrap().remove(&query["uploadId"]) else {
        return error(StatusCode::NOT_FOUND, "NoSuchUpload");
    };

    let mut data = Vec::new();
    for part in upload.parts.values() {
        data.extend_from_slice(part);
    }
    let data = Bytes::from(data);
    let etag = format!("{}-{}", etag(&data), upload.parts.len());
    state
        .objects
        .lock()
        .unwrap()
        .insert(upload.key.clone(), data);

    xml_response(
        StatusCode::OK,
        format!(
            "<CompleteMultipartUploadResult><Bucket>{}</Bucket><Key>{}</Key><ETag>\"{}\"</ETag></CompleteMultipartUploadResult>",
            BUCKET,
            escape(&upload.key),
            etag
        ),
    )
}

fn object_key(path: &str) -> String {
    let rest = path.trim_start_matches('/');
    let raw = rest.split_once('/').map(|(_, key)| key).unwrap_or("");
    decode(raw)
}

fn query_params(query: Option<&str>) -> HashMap<String, String> {
    query
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (decode(k), decode(v))
        })
        .collect()
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn etag(data: &[u8]) -> String {
    format!("{:08x}", data.len())
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn xml_response(status: StatusCode, xml: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/xml")
        .body(Full::new(Bytes::from(xml)))
        .unwrap()
}

fn error(status: StatusCode, code: &str) -> Response<Full<Bytes>> {
    xml_response(
        status,
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{} from fake store</Message><RequestId>fake</RequestId></Error>",
            code, code
        ),
    )
}

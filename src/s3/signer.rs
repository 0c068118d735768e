//! Request signers for S3-compatible APIs
//!
//! Two schemes are supported and selected once when the client is built:
//! - AWS Signature Version 4 (HMAC-SHA256, daily signing key cache)
//! - legacy AWS Signature Version 2 (HMAC-SHA1), still required by some
//!   older S3-compatible stores
//!
//! Both take the lowercase header map that will be sent and return it with
//! the authentication headers added.

use crate::config::SignatureVersion;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Hex lookup table for percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// SHA256 of the empty payload
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Payload hash used when the body is not hashed
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Query parameters that are part of the V2 canonicalized resource
const V2_SUB_RESOURCES: &[&str] = &[
    "acl",
    "delete",
    "lifecycle",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "tagging",
    "torrent",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
];

/// Signer selected from the configured signature version
#[derive(Clone)]
pub enum Signer {
    V2(S3SignerV2),
    V4(S3SignerV4),
}

impl Signer {
    pub fn new(
        version: SignatureVersion,
        access_key: String,
        secret_key: String,
        region: Option<String>,
    ) -> Self {
        match version {
            SignatureVersion::V2 => Signer::V2(S3SignerV2::new(access_key, secret_key)),
            SignatureVersion::V4 => Signer::V4(S3SignerV4::new(access_key, secret_key, region)),
        }
    }

    pub fn version(&self) -> SignatureVersion {
        match self {
            Signer::V2(_) => SignatureVersion::V2,
            Signer::V4(_) => SignatureVersion::V4,
        }
    }

    /// Sign a request whose full payload is known
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        payload: &[u8],
    ) -> BTreeMap<String, String> {
        match self {
            Signer::V2(signer) => signer.sign_at(method, url, headers, Utc::now()),
            Signer::V4(signer) => {
                let hash = if payload.is_empty() {
                    EMPTY_SHA256.to_string()
                } else {
                    hex::encode(Sha256::digest(payload))
                };
                signer.sign_at(method, url, headers, &hash, Utc::now())
            }
        }
    }

    /// Sign a request without hashing its body (object data)
    pub fn sign_unsigned_payload(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        match self {
            Signer::V2(signer) => signer.sign_at(method, url, headers, Utc::now()),
            Signer::V4(signer) => {
                signer.sign_at(method, url, headers, UNSIGNED_PAYLOAD, Utc::now())
            }
        }
    }
}

/// AWS Signature Version 4 signer
pub struct S3SignerV4 {
    access_key: String,
    region: String,
    service: String,
    /// "AWS4" + secret key, the root of the key derivation
    aws4_key: Vec<u8>,
    /// Signing key for the current day: (date_stamp, derived_key)
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl Clone for S3SignerV4 {
    fn clone(&self) -> Self {
        Self {
            access_key: self.access_key.clone(),
            region: self.region.clone(),
            service: self.service.clone(),
            aws4_key: self.aws4_key.clone(),
            cached_signing_key: Mutex::new(None),
        }
    }
}

impl S3SignerV4 {
    pub fn new(access_key: String, secret_key: String, region: Option<String>) -> Self {
        let region = region
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "us-east-1".to_string());
        Self {
            access_key,
            region,
            service: "s3".to_string(),
            aws4_key: format!("AWS4{}", secret_key).into_bytes(),
            cached_signing_key: Mutex::new(None),
        }
    }

    fn sign_at(
        &self,
        method: &str,
        url: &str,
        mut headers: BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let (host, path, query) = split_url(url);

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert(
            "x-amz-content-sha256".to_string(),
            payload_hash.to_string(),
        );

        let canonical_query = canonical_query_string(query);
        let signed_headers = headers
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(";");

        let mut canonical_headers = String::with_capacity(headers.len() * 64);
        for (k, v) in &headers {
            canonical_headers.push_str(k);
            canonical_headers.push(':');
            canonical_headers.push_str(v.trim());
            canonical_headers.push('\n');
        }

        // The path is already URI-encoded by the client
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, canonical_headers, signed_headers, payload_hash
        );
        tracing::trace!(%canonical_request, "sigv4 canonical request");

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope =
            format!("{}/{}/{}/aws4_request", date_stamp, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&date_stamp, &string_to_sign);

        headers.insert(
            "authorization".to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                algorithm, self.access_key, credential_scope, signed_headers, signature
            ),
        );

        headers
    }

    fn calculate_signature(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = {
            let mut cache = self
                .cached_signing_key
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match cache.as_ref() {
                Some((cached_date, key)) if cached_date == date_stamp => *key,
                _ => {
                    let key = self.derive_signing_key(date_stamp);
                    *cache = Some((date_stamp.to_string(), key));
                    key
                }
            }
        };

        hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }

    fn derive_signing_key(&self, date_stamp: &str) -> [u8; 32] {
        let k_date = hmac_sha256(&self.aws4_key, date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

/// Legacy AWS Signature Version 2 signer
#[derive(Clone)]
pub struct S3SignerV2 {
    access_key: String,
    secret_key: String,
}

impl S3SignerV2 {
    pub fn new(access_key: String, secret_key: String) -> Self {
        Self {
            access_key,
            secret_key,
        }
    }

    fn sign_at(
        &self,
        method: &str,
        url: &str,
        mut headers: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let (host, path, query) = split_url(url);

        headers.insert("host".to_string(), host.to_string());
        headers.insert(
            "date".to_string(),
            now.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );

        let string_to_sign = Self::string_to_sign(method, path, query, &headers);
        tracing::trace!(%string_to_sign, "sigv2 string to sign");

        headers.insert(
            "authorization".to_string(),
            format!("AWS {}:{}", self.access_key, self.signature(&string_to_sign)),
        );
        headers
    }

    /// Base64 HMAC-SHA1 of `string_to_sign` under the secret key
    fn signature(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn string_to_sign(
        method: &str,
        path: &str,
        query: &str,
        headers: &BTreeMap<String, String>,
    ) -> String {
        let header = |name: &str| headers.get(name).map(String::as_str).unwrap_or("");

        let mut out = String::with_capacity(256);
        out.push_str(method);
        out.push('\n');
        out.push_str(header("content-md5"));
        out.push('\n');
        out.push_str(header("content-type"));
        out.push('\n');
        out.push_str(header("date"));
        out.push('\n');

        // BTreeMap keeps the x-amz-* headers sorted
        for (k, v) in headers.iter().filter(|(k, _)| k.starts_with("x-amz-")) {
            out.push_str(k);
            out.push(':');
            out.push_str(v.trim());
            out.push('\n');
        }

        out.push_str(path);

        let mut sub_resources: Vec<(&str, Option<&str>)> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) if !v.is_empty() => (k, Some(v)),
                Some((k, _)) => (k, None),
                None => (pair, None),
            })
            .filter(|(k, _)| V2_SUB_RESOURCES.contains(k))
            .collect();
        sub_resources.sort_unstable_by(|a, b| a.0.cmp(b.0));

        for (i, (k, v)) in sub_resources.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(k);
            if let Some(v) = v {
                out.push('=');
                out.push_str(v);
            }
        }

        out
    }
}

/// Split a URL into (host, path, query) slices.
///
/// Default ports (:443 for https, :80 for http) are stripped from the host.
fn split_url(url: &str) -> (&str, &str, &str) {
    let (after_scheme, https) = if let Some(rest) = url.strip_prefix("https://") {
        (rest, true)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (rest, false)
    } else {
        (url, false)
    };

    let (authority, path_and_query) = match after_scheme.find('/') {
        Some(pos) => after_scheme.split_at(pos),
        None => (after_scheme, "/"),
    };

    let (path, query) = path_and_query
        .split_once('?')
        .unwrap_or((path_and_query, ""));

    let host = if https {
        authority.strip_suffix(":443").unwrap_or(authority)
    } else {
        authority.strip_suffix(":80").unwrap_or(authority)
    };

    (host, path, query)
}

/// Canonical V4 query string: decoded, re-encoded, sorted by name.
/// Valueless parameters such as `uploads` become `uploads=`.
fn canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let k = urlencoding::decode(k).unwrap_or_else(|_| k.into());
            let v = urlencoding::decode(v).unwrap_or_else(|_| v.into());
            (uri_encode(&k, true), uri_encode(&v, true))
        })
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// URI encode a string (RFC 3986)
pub(crate) fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => result.push('/'),
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}

//! XML bodies of the S3 API
//!
//! Parsing uses byte-slice tag matching over `quick_xml` events and reuses
//! one text buffer per document.

use crate::s3::client::{Result, S3Error};
use crate::s3::types::{
    CompleteMultipartUploadResponse, CompletedPart, CreateMultipartUploadResponse, ErrorResponse,
    ListObjectsResponse, S3Object,
};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt::Write as FmtWrite;

fn reader(xml_data: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;
    reader
}

/// Parse a ListObjectsV2 page
///
/// Text is kept as is: keys and prefixes may begin or end with whitespace.
pub fn parse_list_response(xml_data: &[u8]) -> Result<ListObjectsResponse> {
    let mut reader = Reader::from_reader(xml_data);

    let mut response = ListObjectsResponse::new();
    let mut current_object: Option<S3Object> = None;
    let mut current_text = String::with_capacity(256);
    let mut in_common_prefixes = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                match e.local_name().as_ref() {
                    b"Contents" => current_object = Some(S3Object::default()),
                    b"CommonPrefixes" => in_common_prefixes = true,
                    _ => {}
                }
                current_text.clear();
            }
            Event::Text(e) => current_text.push_str(&e.unescape()?),
            Event::CData(e) => current_text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"Key" => {
                        if let Some(ref mut obj) = current_object {
                            obj.key = std::mem::take(&mut current_text);
                        }
                    }
                    b"Size" => {
                        if let Some(ref mut obj) = current_object {
                            obj.size = current_text.trim().parse().unwrap_or(0);
                        }
                    }
                    b"LastModified" => {
                        if let Some(ref mut obj) = current_object {
                            obj.last_modified = Some(current_text.trim().to_string());
                        }
                    }
                    b"ETag" => {
                        if let Some(ref mut obj) = current_object {
                            obj.etag = Some(current_text.trim().to_string());
                        }
                    }
                    b"Contents" => {
                        if let Some(obj) = current_object.take() {
                            response.contents.push(obj);
                        }
                    }
                    b"CommonPrefixes" => in_common_prefixes = false,
                    b"Prefix" if in_common_prefixes => {
                        response
                            .common_prefixes
                            .push(std::mem::take(&mut current_text));
                    }
                    b"IsTruncated" => response.is_truncated = current_text.trim() == "true",
                    b"NextContinuationToken" => {
                        response.next_continuation_token =
                            Some(std::mem::take(&mut current_text));
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(response)
}

/// Parse an `<Error>` document. Returns `None` when the body is not one.
pub fn parse_error_response(xml_data: &[u8]) -> Option<ErrorResponse> {
    let mut reader = reader(xml_data);

    let mut response = ErrorResponse::default();
    let mut seen_error = false;
    let mut depth = 0usize;
    let mut current_text = String::new();

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => {
                if depth == 0 && e.local_name().as_ref() == b"Error" {
                    seen_error = true;
                }
                depth += 1;
            }
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape().ok()?);
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if seen_error && depth == 1 {
                    match e.local_name().as_ref() {
                        b"Code" => response.code = std::mem::take(&mut current_text),
                        b"Message" => response.message = std::mem::take(&mut current_text),
                        b"Resource" => response.resource = Some(std::mem::take(&mut current_text)),
                        b"RequestId" => {
                            response.request_id = Some(std::mem::take(&mut current_text))
                        }
                        _ => {}
                    }
                }
                current_text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    (seen_error && !response.code.is_empty()).then_some(response)
}

/// Parse a CreateMultipartUpload response
pub fn parse_create_multipart_response(xml_data: &[u8]) -> Result<CreateMultipartUploadResponse> {
    let mut reader = reader(xml_data);

    let mut bucket = String::new();
    let mut key = String::new();
    let mut upload_id = String::new();
    let mut current_text = String::with_capacity(128);

    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"Bucket" => bucket = std::mem::take(&mut current_text),
                    b"Key" => key = std::mem::take(&mut current_text),
                    b"UploadId" => upload_id = std::mem::take(&mut current_text),
                    _ => {}
                }
                current_text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if upload_id.is_empty() {
        return Err(S3Error::InvalidResponse(
            "Missing UploadId in response".to_string(),
        ));
    }

    Ok(CreateMultipartUploadResponse {
        bucket,
        key,
        upload_id,
    })
}

/// Parse a CompleteMultipartUpload response
pub fn parse_complete_multipart_response(
    xml_data: &[u8],
) -> Result<CompleteMultipartUploadResponse> {
    let mut reader = reader(xml_data);

    let mut response = CompleteMultipartUploadResponse {
        location: None,
        bucket: String::new(),
        key: String::new(),
        etag: String::new(),
    };
    let mut current_text = String::with_capacity(128);

    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"Location" => response.location = Some(std::mem::take(&mut current_text)),
                    b"Bucket" => response.bucket = std::mem::take(&mut current_text),
                    b"Key" => response.key = std::mem::take(&mut current_text),
                    b"ETag" => {
                        response.etag = current_text.trim_matches('"').to_string();
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(response)
}

/// Build the CompleteMultipartUpload request body. Parts must be sorted.
pub fn complete_multipart_body(parts: &[CompletedPart]) -> String {
    let mut xml = String::with_capacity(parts.len() * 100 + 100);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.push_str("<CompleteMultipartUpload>");
    for part in parts {
        let _ = write!(
            xml,
            "<Part><PartNumber>{}</PartNumber><ETag>\"{}\"</ETag></Part>",
            part.part_number,
            part.etag.trim_matches('"')
        );
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

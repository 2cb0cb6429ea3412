use std::convert::TryFrom;
use std::str::FromStr;

use encoding_rs::{Encoding, UTF_8};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use httparse::Header;
use mime::Mime;

use crate::constants;

pub(crate) fn convert_raw_headers_to_header_map(raw_headers: &[Header]) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw_headers.len());

    for raw_header in raw_headers {
        let name = HeaderName::try_from(raw_header.name).map_err(|err| crate::Error::DecodeHeaderName {
            name: raw_header.name.to_owned(),
            cause: err.into(),
        })?;

        let value = HeaderValue::try_from(raw_header.value).map_err(|err| crate::Error::DecodeHeaderValue {
            value: raw_header.value.to_owned(),
            cause: err.into(),
        })?;

        // `insert` replaces, so a duplicated header resolves to its last
        // occurrence.
        headers.insert(name, value);
    }

    Ok(headers)
}

/// The part's declared media type, defaulting to `application/octet-stream`
/// when the header is absent. An unparseable value is reported verbatim so
/// it can be surfaced in diagnostics.
pub(crate) fn part_content_type(headers: &HeaderMap) -> Result<Mime, String> {
    let raw = match headers.get(header::CONTENT_TYPE).and_then(|val| val.to_str().ok()) {
        Some(raw) => raw.trim(),
        None => constants::DEFAULT_CONTENT_TYPE,
    };

    Mime::from_str(raw).map_err(|_| raw.to_owned())
}

/// The declared `Content-Length` of a part, if present and parseable as a
/// non-negative integer.
pub(crate) fn part_content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.trim().parse::<usize>().ok())
}

/// What a response's top-level `Content-Type` asks of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContentClass {
    /// `multipart/x-mixed-replace`; a missing boundary parameter falls back
    /// to bare-JPEG demultiplexing.
    Multipart { raw: String, boundary: Option<String> },
    /// A single image; the whole body is one frame.
    Image(Mime),
    /// A textual body (plain text, HTML, JSON or XML), usually a server
    /// error message.
    Text { raw: String, mime: Option<Mime> },
    /// Absent, unparseable or unhandled.
    Unrecognized(Option<String>),
}

pub(crate) fn classify_content_type(raw: Option<&str>) -> ContentClass {
    let raw = match raw {
        Some(raw) => raw.trim(),
        None => return ContentClass::Unrecognized(None),
    };

    if raw.starts_with("multipart/x-mixed-replace") {
        return ContentClass::Multipart {
            raw: raw.to_owned(),
            boundary: crate::parse_boundary(raw).ok(),
        };
    }

    if raw.starts_with("image/") {
        return match Mime::from_str(raw) {
            Ok(mime) => ContentClass::Image(mime),
            Err(_) => ContentClass::Unrecognized(Some(raw.to_owned())),
        };
    }

    if raw.starts_with("text/") || raw.contains("json") || raw.contains("xml") || raw.contains("html") {
        return ContentClass::Text {
            raw: raw.to_owned(),
            mime: Mime::from_str(raw).ok(),
        };
    }

    ContentClass::Unrecognized(Some(raw.to_owned()))
}

/// Decodes a textual payload using the charset declared in its media type,
/// falling back to UTF-8 with replacement.
pub(crate) fn decode_text(content_type: Option<&Mime>, bytes: &[u8]) -> String {
    let encoding = content_type
        .and_then(|mime| mime.get_param(mime::CHARSET))
        .and_then(|charset| Encoding::for_label(charset.as_str().as_bytes()))
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

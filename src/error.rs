use std::fmt::{self, Debug, Display, Formatter};

use bytes::Bytes;
use derive_more::Display;
use serde::Serialize;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while demultiplexing an MJPEG stream and
/// in other operations.
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// The transport failed before a response head was available.
    #[display(fmt = "transport failed: {}", _0)]
    Transport(BoxError),

    /// No usable response was observed within the connection timeout.
    #[display(fmt = "connection timed out")]
    ConnectTimeout,

    /// The server answered with a non-success status.
    #[display(fmt = "unexpected http status: {}", status)]
    HttpStatus { status: u16 },

    /// The response carried no `Content-Type` header, or one this crate
    /// has no handling for.
    #[display(
        fmt = "unrecognized content type: {}",
        "content_type.as_deref().unwrap_or(\"<absent>\")"
    )]
    UnrecognizedContentType { content_type: Option<String> },

    /// The top-level response body is textual (plain text, HTML, JSON or
    /// XML) instead of an image or a multipart stream. Carries the decoded
    /// text, which is usually a server-side error message.
    #[display(fmt = "non-image response body ({})", content_type)]
    NonImagePayload { content_type: String, text: String },

    /// A part of the multipart stream is not an image. Servers sometimes
    /// emit a JSON/XML/HTML error body mid-stream in place of a frame; the
    /// raw part bytes are preserved for diagnostics.
    #[display(fmt = "unsupported part in stream: {} ({} bytes)", content_type, "data.len()")]
    UnsupportedPart { content_type: String, data: Bytes },

    /// Reading a chunk from the response body failed mid-stream.
    #[display(fmt = "stream read failed: {}", _0)]
    StreamReadFailed(BoxError),

    /// Failed to parse a part's header block.
    #[display(fmt = "failed to read part headers: {}", _0)]
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode a part's raw header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    #[display(fmt = "failed to decode part's raw header name: {:?} {}", name, cause)]
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode a part's raw header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    #[display(fmt = "failed to decode part's raw header value: {}", cause)]
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// The demuxer already reached its terminal `Failed` state; no further
    /// input is accepted.
    #[display(fmt = "demuxer already failed, no further input accepted")]
    AlreadyFailed,

    /// The `Content-Type` header is not `multipart/x-mixed-replace`.
    #[display(fmt = "Content-Type is not multipart/x-mixed-replace")]
    NotMultipart,

    /// No boundary found in `Content-Type` header.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(mime::FromStrError),
}

impl Error {
    /// The numeric code carried by [`ErrorDetail`] for this error.
    ///
    /// `-1` transport failure, timeout or bad status, `0` unrecognized
    /// content type, `1` non-image top-level payload, `98` mid-stream read
    /// failure, `99` unsupported or malformed part.
    pub fn code(&self) -> i32 {
        match self {
            Error::Transport(_) | Error::ConnectTimeout | Error::HttpStatus { .. } => -1,
            Error::UnrecognizedContentType { .. } => 0,
            Error::NonImagePayload { .. } => 1,
            Error::StreamReadFailed(_) => 98,
            _ => 99,
        }
    }

    /// Builds the structured payload reported through
    /// [`FrameSink::on_error`](crate::FrameSink::on_error).
    pub fn detail(&self) -> ErrorDetail {
        let mut detail = ErrorDetail::with_code(self.code());

        match self {
            Error::Transport(cause) => {
                detail.message = Some(cause.to_string());
                detail.name = Some("TransportError".to_owned());
            }
            Error::ConnectTimeout => {
                detail.message = Some("connection timed out".to_owned());
                detail.name = Some("AbortError".to_owned());
            }
            Error::UnrecognizedContentType { content_type } => {
                detail.content_type = content_type.clone();
            }
            Error::NonImagePayload { content_type, text } => {
                detail.content_type = Some(content_type.clone());
                detail.message = Some(text.clone());
            }
            Error::UnsupportedPart { content_type, data } => {
                detail.part_type = Some(content_type.clone());
                detail.size = Some(data.len());
            }
            Error::StreamReadFailed(cause) => {
                detail.message = Some(cause.to_string());
                detail.name = Some("StreamReadError".to_owned());
            }
            _ => {
                detail.message = Some(self.to_string());
            }
        }

        detail
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}

/// Structured payload passed to the error callback, shaped like the JSON
/// body MJPEG viewers exchange: always a `code`, plus whichever of the
/// optional fields apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub part_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl ErrorDetail {
    pub(crate) fn with_code(code: i32) -> Self {
        ErrorDetail {
            code,
            content_type: None,
            message: None,
            name: None,
            part_type: None,
            size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::ConnectTimeout.code(), -1);
        assert_eq!(Error::HttpStatus { status: 503 }.code(), -1);
        assert_eq!(Error::UnrecognizedContentType { content_type: None }.code(), 0);
        assert_eq!(
            Error::NonImagePayload {
                content_type: "text/plain".to_owned(),
                text: "oops".to_owned(),
            }
            .code(),
            1
        );
        assert_eq!(
            Error::UnsupportedPart {
                content_type: "application/json".to_owned(),
                data: Bytes::from_static(b"{}"),
            }
            .code(),
            99
        );
        assert_eq!(Error::StreamReadFailed("reset".into()).code(), 98);
        assert_eq!(Error::AlreadyFailed.code(), 99);
    }

    #[test]
    fn test_detail_serialization_omits_absent_fields() {
        let detail = Error::UnrecognizedContentType { content_type: None }.detail();
        assert_eq!(serde_json::to_string(&detail).unwrap(), r#"{"code":0}"#);

        let detail = Error::UnsupportedPart {
            content_type: "application/json".to_owned(),
            data: Bytes::from_static(b"{\"err\":1}"),
        }
        .detail();
        assert_eq!(
            serde_json::to_string(&detail).unwrap(),
            r#"{"code":99,"type":"application/json","size":9}"#
        );
    }
}

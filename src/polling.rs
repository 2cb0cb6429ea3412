use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::stream::StreamExt;

use crate::frame::Frame;
use crate::helpers::{self, ContentClass};
use crate::session::StreamConfig;
use crate::transport::{BodyStream, Transport};

/// Single-image-per-response source, for servers that serve one still per
/// `GET` instead of a multipart stream.
///
/// There is nothing to demultiplex here: the full response body *is* the
/// frame. [`StreamSession`](crate::StreamSession) uses this path whenever
/// the response's top-level content type is `image/*`, re-fetching on its
/// refresh interval; it is also usable standalone.
pub struct PollingSource {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
}

impl PollingSource {
    pub fn new(config: StreamConfig, transport: Arc<dyn Transport>) -> PollingSource {
        PollingSource { config, transport }
    }

    /// Fetches exactly one frame.
    ///
    /// Classifies the response's content type the same way a streaming
    /// session does, so a textual error body comes back as
    /// [`Error::NonImagePayload`](crate::Error::NonImagePayload) rather
    /// than bogus image bytes. A multipart response is refused; use a
    /// session for those.
    pub async fn fetch_once(&self) -> crate::Result<Frame> {
        let response = self
            .transport
            .fetch(crate::session::build_request(&self.config))
            .await
            .map_err(crate::Error::Transport)?;

        if !response.status.is_success() {
            return Err(crate::Error::HttpStatus {
                status: response.status.as_u16(),
            });
        }

        match helpers::classify_content_type(response.content_type()) {
            ContentClass::Image(mime) => {
                let data = drain_body(response.body).await?;
                Ok(Frame::new(mime, data))
            }
            ContentClass::Text { raw, mime } => {
                let data = drain_body(response.body).await?;
                Err(crate::Error::NonImagePayload {
                    content_type: raw,
                    text: helpers::decode_text(mime.as_ref(), &data),
                })
            }
            ContentClass::Multipart { raw, .. } => Err(crate::Error::UnrecognizedContentType {
                content_type: Some(raw),
            }),
            ContentClass::Unrecognized(content_type) => Err(crate::Error::UnrecognizedContentType { content_type }),
        }
    }
}

/// Collects the remainder of a response body into one buffer.
pub(crate) async fn drain_body(mut body: BodyStream) -> crate::Result<Bytes> {
    let mut buf = BytesMut::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(crate::Error::StreamReadFailed)?;
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

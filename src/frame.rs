use bytes::Bytes;
use mime::Mime;

/// A single still image demultiplexed from the stream.
///
/// The pixel data is opaque to this crate; it is handed over exactly once,
/// with its declared media type, and never retained after emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    content_type: Mime,
    data: Bytes,
}

impl Frame {
    pub(crate) fn new(content_type: Mime, data: Bytes) -> Self {
        Frame { content_type, data }
    }

    /// The media type the part declared, e.g. `image/jpeg`.
    pub fn content_type(&self) -> &Mime {
        &self.content_type
    }

    /// The raw image bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the frame, returning its media type and bytes.
    pub fn into_parts(self) -> (Mime, Bytes) {
        (self.content_type, self.data)
    }
}

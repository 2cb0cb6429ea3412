//! An incremental demultiplexer and session layer for
//! `multipart/x-mixed-replace` (MJPEG) streams.
//!
//! IP cameras deliver motion JPEG as one long-lived HTTP response whose
//! body is a run of parts, each a complete still image. The body arrives
//! in arbitrary-sized chunks with no alignment to part boundaries, header
//! lines or even bytes of the JPEG markers, so [`FrameDemuxer`] is a
//! byte-level state machine: feed it chunks as they arrive and it hands
//! back complete, validated frames.
//!
//! [`StreamSession`] wraps a demuxer with the lifecycle around one stream
//! attempt (connect timeout, refresh re-fetching for single-image servers,
//! cooperative stop), delivering frames and errors through a
//! [`FrameSink`]. The HTTP request itself is issued by an injected
//! [`Transport`], so the crate runs against any client and is fully
//! testable without sockets.
//!
//! # Examples
//!
//! ```
//! use mjpeg_stream::{DemuxMode, FrameDemuxer};
//!
//! let mut demuxer = FrameDemuxer::new(DemuxMode::Boundary("frame".to_owned()));
//!
//! let data = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n\xFF\xD8\xFF\xD9\r\n";
//! for frame in demuxer.push(&data[..]).unwrap() {
//!     println!("{}: {} bytes", frame.content_type(), frame.len());
//! }
//! ```

pub use demuxer::{DemuxMode, FrameDemuxer};
pub use error::{Error, ErrorDetail};
pub use frame::Frame;
pub use polling::PollingSource;
pub use session::{Credentials, FrameSink, StreamConfig, StreamSession};
pub use transport::{BodyStream, BoxError, FetchRequest, FetchResponse, Transport};

mod buffer;
mod constants;
mod demuxer;
mod error;
mod frame;
mod helpers;
mod polling;
mod session;
mod transport;

/// A Result type often returned from methods that can have `mjpeg-stream`
/// errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    if !(m.type_() == mime::MULTIPART && m.subtype() == "x-mixed-replace") {
        return Err(Error::NotMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(Error::NoBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/x-mixed-replace; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("ABCDEFG".to_owned()));

        let content_type = "multipart/x-mixed-replace; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("------ABCDEFG".to_owned()));

        let content_type = "multipart/x-mixed-replace";
        assert_eq!(parse_boundary(content_type), Err(Error::NoBoundary));

        let content_type = "boundary=------ABCDEFG";
        assert!(parse_boundary(content_type).is_err());

        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Err(Error::NotMultipart));

        let content_type = "image/jpeg";
        assert_eq!(parse_boundary(content_type), Err(Error::NotMultipart));
    }
}

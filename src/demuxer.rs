use bytes::Bytes;
use mime::Mime;

use crate::buffer::ByteCursor;
use crate::constants;
use crate::frame::Frame;
use crate::helpers;

/// How part boundaries are recognized in the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxMode {
    /// Parts are delimited by `--<boundary>` lines, per
    /// `multipart/x-mixed-replace`.
    Boundary(String),
    /// No multipart framing at all; the body is a run of raw JPEG images
    /// delimited only by their own SOI/EOI markers.
    BareJpeg,
}

/// Declared media type of the part currently being read. `Err` carries a
/// raw value that would not parse as a mime type.
type PartType = Result<Mime, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParserState {
    AwaitingPartStart,
    ReadingHeaders,
    ReadingBodyFixedLength { content_type: PartType, remaining: usize },
    ReadingBodyUnbounded { content_type: PartType },
    Failed,
}

enum Step {
    Continue,
    NeedMoreData,
    Emit(Frame),
}

/// Incremental demultiplexer for one MJPEG stream attempt.
///
/// Bytes are fed in with [`push`](FrameDemuxer::push) exactly as they
/// arrive from the transport; the demuxer makes no assumption about chunk
/// boundaries relative to structural boundaries, and the emitted frames
/// depend only on the byte contents, never on how they were split.
///
/// A demuxer is created for a single response body and discarded with it;
/// it is never reused across attempts.
///
/// # Examples
///
/// ```
/// use mjpeg_stream::{DemuxMode, FrameDemuxer};
///
/// let mut demuxer = FrameDemuxer::new(DemuxMode::Boundary("frame".to_owned()));
/// let data = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n\xFF\xD8\xFF\xD9\r\n";
/// let frames = demuxer.push(&data[..]).unwrap();
///
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].data().as_ref(), b"\xFF\xD8\xFF\xD9");
/// ```
pub struct FrameDemuxer {
    mode: DemuxMode,
    /// Scan pattern for a part start: `--<boundary>`, or the JPEG SOI
    /// marker in bare mode.
    marker: Vec<u8>,
    cursor: ByteCursor,
    state: ParserState,
    /// Set once the terminal `--<boundary>--` delimiter has been seen;
    /// everything after it is epilogue.
    finished: bool,
    /// A failure hit after frames had already completed within the same
    /// `push` call; reported on the next call.
    pending_error: Option<crate::Error>,
}

impl FrameDemuxer {
    pub fn new(mode: DemuxMode) -> FrameDemuxer {
        let marker = match &mode {
            DemuxMode::Boundary(boundary) => format!("{}{}", constants::BOUNDARY_EXT, boundary).into_bytes(),
            DemuxMode::BareJpeg => constants::JPEG_SOI.to_vec(),
        };

        FrameDemuxer {
            mode,
            marker,
            cursor: ByteCursor::new(),
            state: ParserState::AwaitingPartStart,
            finished: false,
            pending_error: None,
        }
    }

    /// Consumes the next chunk of the response body and returns every frame
    /// it completed, in order.
    ///
    /// A structural failure puts the demuxer into its terminal state: the
    /// call returns the error, unless frames completed earlier in the same
    /// chunk, in which case those are returned and the error is held for
    /// the next call (see [`take_error`](FrameDemuxer::take_error)). Once
    /// failed, every further call returns [`Error::AlreadyFailed`](crate::Error::AlreadyFailed).
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> crate::Result<Vec<Frame>> {
        if self.state == ParserState::Failed {
            return Err(self.pending_error.take().unwrap_or(crate::Error::AlreadyFailed));
        }

        self.cursor.push(chunk.as_ref());

        let mut frames = Vec::new();

        loop {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::NeedMoreData) => return Ok(frames),
                Ok(Step::Emit(frame)) => frames.push(frame),
                Err(err) => {
                    self.state = ParserState::Failed;

                    return if frames.is_empty() {
                        Err(err)
                    } else {
                        self.pending_error = Some(err);
                        Ok(frames)
                    };
                }
            }
        }
    }

    /// Whether the demuxer has reached its terminal `Failed` state.
    pub fn is_failed(&self) -> bool {
        self.state == ParserState::Failed
    }

    /// Whether the terminal multipart delimiter has been consumed. Always
    /// `false` in bare-JPEG mode.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Takes a failure that was deferred because frames completed earlier
    /// in the same `push` call.
    pub fn take_error(&mut self) -> Option<crate::Error> {
        self.pending_error.take()
    }

    fn step(&mut self) -> crate::Result<Step> {
        match self.state.clone() {
            ParserState::AwaitingPartStart => self.scan_part_start(),
            ParserState::ReadingHeaders => self.read_headers(),
            ParserState::ReadingBodyFixedLength { content_type, remaining } => {
                match self.cursor.read_exact(remaining) {
                    Some(body) => self.finish_part(content_type, body),
                    None => Ok(Step::NeedMoreData),
                }
            }
            ParserState::ReadingBodyUnbounded { content_type } => self.read_unbounded_body(content_type),
            ParserState::Failed => Ok(Step::NeedMoreData),
        }
    }

    fn scan_part_start(&mut self) -> crate::Result<Step> {
        if self.finished {
            // Epilogue after the terminal delimiter.
            let _ = self.cursor.take_all();
            return Ok(Step::NeedMoreData);
        }

        let idx = match self.cursor.find(&self.marker) {
            Some(idx) => idx,
            None => {
                // Bytes preceding a part start are boundary padding, never
                // frame data. Keep only a tail that could still be a split
                // marker prefix.
                self.cursor.discard_except_tail(self.marker.len() - 1);
                return Ok(Step::NeedMoreData);
            }
        };

        self.cursor.advance(idx);

        if self.mode == DemuxMode::BareJpeg {
            // The SOI marker belongs to the body.
            self.state = ParserState::ReadingBodyUnbounded {
                content_type: Ok(mime::IMAGE_JPEG),
            };
            return Ok(Step::Continue);
        }

        // Classify what follows the delimiter line: `--` ends the stream,
        // CRLF/LF variation is tolerated before the part headers.
        let marker_len = self.marker.len();
        let (first, second) = {
            let buf = self.cursor.as_slice();
            match buf.get(marker_len) {
                Some(byte) => (*byte, buf.get(marker_len + 1).copied()),
                None => return Ok(Step::NeedMoreData),
            }
        };

        match (first, second) {
            (b'-', Some(b'-')) => {
                self.finished = true;
                let _ = self.cursor.take_all();
                Ok(Step::NeedMoreData)
            }
            (b'-', None) | (constants::CR, None) => Ok(Step::NeedMoreData),
            (constants::CR, Some(constants::LF)) => {
                self.cursor.advance(marker_len + 2);
                self.state = ParserState::ReadingHeaders;
                Ok(Step::Continue)
            }
            (constants::CR, Some(_)) => {
                self.cursor.advance(marker_len + 1);
                self.state = ParserState::ReadingHeaders;
                Ok(Step::Continue)
            }
            (constants::LF, _) => {
                self.cursor.advance(marker_len + 1);
                self.state = ParserState::ReadingHeaders;
                Ok(Step::Continue)
            }
            _ => {
                self.cursor.advance(marker_len);
                self.state = ParserState::ReadingHeaders;
                Ok(Step::Continue)
            }
        }
    }

    fn read_headers(&mut self) -> crate::Result<Step> {
        let mut raw = [httparse::EMPTY_HEADER; constants::MAX_HEADERS];

        let (consumed, headers) = match httparse::parse_headers(self.cursor.as_slice(), &mut raw) {
            Ok(httparse::Status::Complete((consumed, raw_headers))) => {
                (consumed, helpers::convert_raw_headers_to_header_map(raw_headers)?)
            }
            Ok(httparse::Status::Partial) => return Ok(Step::NeedMoreData),
            Err(err) => return Err(crate::Error::ReadHeaderFailed(err)),
        };

        self.cursor.advance(consumed);

        let content_type = helpers::part_content_type(&headers);

        match helpers::part_content_length(&headers) {
            Some(0) => Err(crate::Error::UnsupportedPart {
                content_type: part_type_string(&content_type),
                data: Bytes::new(),
            }),
            Some(remaining) => {
                self.state = ParserState::ReadingBodyFixedLength { content_type, remaining };
                Ok(Step::Continue)
            }
            None => {
                self.state = ParserState::ReadingBodyUnbounded { content_type };
                Ok(Step::Continue)
            }
        }
    }

    fn read_unbounded_body(&mut self, content_type: PartType) -> crate::Result<Step> {
        let body = match self.mode {
            DemuxMode::Boundary(_) => match self.cursor.read_to(&self.marker) {
                // The delimiter's leading CRLF (or LF) is framing, not body.
                Some(body) => trim_trailing_newline(body),
                None => return Ok(Step::NeedMoreData),
            },
            DemuxMode::BareJpeg => match self.cursor.find(constants::JPEG_EOI) {
                Some(idx) => match self.cursor.read_exact(idx + constants::JPEG_EOI.len()) {
                    Some(body) => body,
                    None => return Ok(Step::NeedMoreData),
                },
                None => return Ok(Step::NeedMoreData),
            },
        };

        self.finish_part(content_type, body)
    }

    fn finish_part(&mut self, content_type: PartType, body: Bytes) -> crate::Result<Step> {
        self.state = ParserState::AwaitingPartStart;

        match content_type {
            Ok(mime) if mime.type_() == mime::IMAGE => Ok(Step::Emit(Frame::new(mime, body))),
            Ok(mime) => Err(crate::Error::UnsupportedPart {
                content_type: mime.to_string(),
                data: body,
            }),
            Err(raw) => Err(crate::Error::UnsupportedPart {
                content_type: raw,
                data: body,
            }),
        }
    }
}

fn part_type_string(content_type: &PartType) -> String {
    match content_type {
        Ok(mime) => mime.to_string(),
        Err(raw) => raw.clone(),
    }
}

fn trim_trailing_newline(body: Bytes) -> Bytes {
    if body.ends_with(b"\r\n") {
        body.slice(..body.len() - 2)
    } else if body.ends_with(b"\n") {
        body.slice(..body.len() - 1)
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "myboundary";

    fn boundary_demuxer() -> FrameDemuxer {
        FrameDemuxer::new(DemuxMode::Boundary(BOUNDARY.to_owned()))
    }

    fn part(content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        data.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        data.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        data.extend_from_slice(body);
        data.extend_from_slice(b"\r\n");
        data
    }

    fn collect_all(demuxer: &mut FrameDemuxer, data: &[u8], chunk_size: usize) -> Vec<Frame> {
        let mut frames = Vec::new();
        for chunk in data.chunks(chunk_size) {
            frames.extend(demuxer.push(chunk).unwrap());
        }
        frames
    }

    #[test]
    fn test_single_part_with_content_length() {
        let mut demuxer = boundary_demuxer();
        let frames = demuxer.push(part("image/jpeg", b"\xFF\xD8abcd\xFF\xD9")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].content_type(), &mime::IMAGE_JPEG);
        assert_eq!(frames[0].data().as_ref(), b"\xFF\xD8abcd\xFF\xD9");
    }

    #[test]
    fn test_chunk_split_invariance() {
        let mut data = Vec::new();
        for i in 0..4u8 {
            data.extend_from_slice(&part("image/jpeg", &[0xFF, 0xD8, i, i, i, 0xFF, 0xD9]));
        }
        data.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let whole = collect_all(&mut boundary_demuxer(), &data, data.len());
        assert_eq!(whole.len(), 4);

        for chunk_size in &[1usize, 2, 3, 5, 7, 16, 64] {
            let frames = collect_all(&mut boundary_demuxer(), &data, *chunk_size);
            assert_eq!(&frames, &whole, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_unbounded_body_ends_at_next_boundary() {
        let mut demuxer = boundary_demuxer();
        let data = format!(
            "--{b}\r\nContent-Type: image/jpeg\r\n\r\nBODYBYTES\r\n--{b}\r\n",
            b = BOUNDARY
        );

        let frames = demuxer.push(data.as_bytes()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().as_ref(), b"BODYBYTES");
    }

    #[test]
    fn test_unbounded_body_tolerates_lf_only_framing() {
        let mut demuxer = boundary_demuxer();
        let data = format!("--{b}\nContent-Type: image/jpeg\n\nBODY\n--{b}\n", b = BOUNDARY);

        let frames = demuxer.push(data.as_bytes()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data().as_ref(), b"BODY");
    }

    #[test]
    fn test_headers_normalized_last_occurrence_wins() {
        let mut demuxer = boundary_demuxer();
        let data = format!(
            "--{}\r\ncontent-TYPE: image/png\r\nContent-Type:  image/jpeg \r\nContent-Length: 2\r\n\r\nok",
            BOUNDARY
        );

        let frames = demuxer.push(data.as_bytes()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].content_type(), &mime::IMAGE_JPEG);
    }

    #[test]
    fn test_missing_content_type_defaults_to_octet_stream() {
        let mut demuxer = boundary_demuxer();
        let data = format!("--{}\r\nContent-Length: 3\r\n\r\nxyz", BOUNDARY);

        let err = demuxer.push(data.as_bytes()).unwrap_err();
        match err {
            crate::Error::UnsupportedPart { content_type, data } => {
                assert_eq!(content_type, "application/octet-stream");
                assert_eq!(data.as_ref(), b"xyz");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_json_part_fails_terminally_with_bytes_intact() {
        let mut demuxer = boundary_demuxer();
        let body = br#"{"error":"camera offline"}"#;
        let data = part("application/json", body);

        let err = demuxer.push(&data).unwrap_err();
        match err {
            crate::Error::UnsupportedPart { content_type, data } => {
                assert_eq!(content_type, "application/json");
                assert_eq!(data.as_ref(), &body[..]);
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(demuxer.is_failed());
        assert_eq!(demuxer.push(b"more").unwrap_err(), crate::Error::AlreadyFailed);
    }

    #[test]
    fn test_zero_content_length_is_rejected() {
        let mut demuxer = boundary_demuxer();
        let data = format!("--{}\r\nContent-Type: image/jpeg\r\nContent-Length: 0\r\n\r\n", BOUNDARY);

        let err = demuxer.push(data.as_bytes()).unwrap_err();
        match err {
            crate::Error::UnsupportedPart { data, .. } => assert!(data.is_empty()),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_error_after_frames_in_same_chunk_is_deferred() {
        let mut demuxer = boundary_demuxer();
        let mut data = part("image/jpeg", b"\xFF\xD8ok\xFF\xD9");
        data.extend_from_slice(&part("text/html", b"<h1>gone</h1>"));

        let frames = demuxer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(demuxer.is_failed());

        let err = demuxer.take_error().unwrap();
        assert!(matches!(err, crate::Error::UnsupportedPart { .. }));
    }

    #[test]
    fn test_terminal_boundary_quiesces() {
        let mut demuxer = boundary_demuxer();
        let mut data = part("image/jpeg", b"\xFF\xD8x\xFF\xD9");
        data.extend_from_slice(format!("--{}--\r\nepilogue", BOUNDARY).as_bytes());

        let frames = demuxer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(demuxer.is_finished());
        assert!(demuxer.push(b"ignored").unwrap().is_empty());
    }

    #[test]
    fn test_bare_jpeg_stream() {
        let mut demuxer = FrameDemuxer::new(DemuxMode::BareJpeg);
        let data = b"junk\xFF\xD8one\xFF\xD9padding\xFF\xD8two\xFF\xD9";

        let frames = demuxer.push(&data[..]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].content_type(), &mime::IMAGE_JPEG);
        assert_eq!(frames[0].data().as_ref(), b"\xFF\xD8one\xFF\xD9");
        assert_eq!(frames[1].data().as_ref(), b"\xFF\xD8two\xFF\xD9");
    }

    #[test]
    fn test_bare_jpeg_one_byte_at_a_time() {
        let data = b"\xFF\xD8frame-a\xFF\xD9\xFF\xD8frame-b\xFF\xD9";

        let mut demuxer = FrameDemuxer::new(DemuxMode::BareJpeg);
        let frames = collect_all(&mut demuxer, &data[..], 1);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data().as_ref(), b"\xFF\xD8frame-a\xFF\xD9");
        assert_eq!(frames[1].data().as_ref(), b"\xFF\xD8frame-b\xFF\xD9");
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut demuxer = boundary_demuxer();
        let data = part("image/jpeg", b"\xFF\xD8data\xFF\xD9");

        // Split in the middle of the boundary marker.
        let frames1 = demuxer.push(&data[..4]).unwrap();
        assert!(frames1.is_empty());
        let frames2 = demuxer.push(&data[4..]).unwrap();
        assert_eq!(frames2.len(), 1);
        assert_eq!(frames2[0].data().as_ref(), b"\xFF\xD8data\xFF\xD9");
    }
}

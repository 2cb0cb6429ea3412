pub(crate) const MAX_HEADERS: usize = 32;

pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CR: u8 = b'\r';
pub(crate) const LF: u8 = b'\n';

/// JPEG start-of-image marker, the first two bytes of every JPEG payload.
pub(crate) const JPEG_SOI: &[u8] = &[0xFF, 0xD8];
/// JPEG end-of-image marker, the last two bytes of every JPEG payload.
pub(crate) const JPEG_EOI: &[u8] = &[0xFF, 0xD9];

/// Connection timeout applied while waiting for the response head, in
/// milliseconds. `0` disables the timer.
pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;

/// Re-fetch interval for single-image (non-multipart) responses, in
/// milliseconds. `0` disables automatic refresh.
pub(crate) const DEFAULT_REFRESH_INTERVAL_MS: u64 = 500;

pub(crate) const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

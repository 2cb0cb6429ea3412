use bytes::{Bytes, BytesMut};
use memchr::memmem;

/// A forward-only cursor over bytes that have arrived but are not yet
/// attributed to a completed structural unit.
///
/// Chunks are appended as they arrive; the demuxer splits completed
/// headers and bodies off the front. Bytes are never revisited after a
/// `read_*` or `advance` call.
pub(crate) struct ByteCursor {
    buf: BytesMut,
}

impl ByteCursor {
    pub fn new() -> Self {
        ByteCursor { buf: BytesMut::new() }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Position of the first occurrence of `pattern` in the pending bytes.
    pub fn find(&self, pattern: &[u8]) -> Option<usize> {
        memmem::find(&self.buf, pattern)
    }

    /// Splits off exactly `size` bytes, or `None` if fewer are pending.
    pub fn read_exact(&mut self, size: usize) -> Option<Bytes> {
        if size <= self.buf.len() {
            Some(self.buf.split_to(size).freeze())
        } else {
            None
        }
    }

    /// Splits off everything before the first occurrence of `pattern`,
    /// leaving the pattern itself pending.
    pub fn read_to(&mut self, pattern: &[u8]) -> Option<Bytes> {
        memmem::find(&self.buf, pattern).map(|idx| self.buf.split_to(idx).freeze())
    }

    /// Discards `size` pending bytes.
    pub fn advance(&mut self, size: usize) {
        let _ = self.buf.split_to(size);
    }

    /// Discards everything except the trailing `keep` bytes. Used while
    /// scanning for a marker: bytes that cannot be part of a split marker
    /// prefix are boundary padding and never belong to a frame.
    pub fn discard_except_tail(&mut self, keep: usize) {
        if self.buf.len() > keep {
            let cut = self.buf.len() - keep;
            let _ = self.buf.split_to(cut);
        }
    }

    pub fn take_all(&mut self) -> Bytes {
        self.buf.split_to(self.buf.len()).freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_exact() {
        let mut cursor = ByteCursor::new();
        cursor.push(b"hello");
        assert_eq!(cursor.read_exact(10), None);
        assert_eq!(cursor.read_exact(4).as_deref(), Some(&b"hell"[..]));
        assert_eq!(cursor.as_slice(), b"o");
    }

    #[test]
    fn test_read_to() {
        let mut cursor = ByteCursor::new();
        cursor.push(b"abc\r\n\r\nrest");
        assert_eq!(cursor.read_to(b"\r\n\r\n").as_deref(), Some(&b"abc"[..]));
        assert_eq!(cursor.as_slice(), b"\r\n\r\nrest");
        cursor.advance(4);
        assert_eq!(cursor.as_slice(), b"rest");
    }

    #[test]
    fn test_pattern_split_across_pushes() {
        let mut cursor = ByteCursor::new();
        cursor.push(b"xx\r");
        assert_eq!(cursor.find(b"\r\n"), None);
        cursor.push(b"\nyy");
        assert_eq!(cursor.find(b"\r\n"), Some(2));
    }

    #[test]
    fn test_discard_except_tail() {
        let mut cursor = ByteCursor::new();
        cursor.push(b"0123456789");
        cursor.discard_except_tail(3);
        assert_eq!(cursor.as_slice(), b"789");
        cursor.discard_except_tail(5);
        assert_eq!(cursor.as_slice(), b"789");
    }
}

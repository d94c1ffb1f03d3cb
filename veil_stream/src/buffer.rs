use bytes::BytesMut;

/// Provides the byte buffers a [`SecureStream`](crate::SecureStream) owns.
///
/// Injected at construction so tests (or pooling setups) can substitute a
/// deterministic allocator. The returned buffer must hold at least
/// `capacity` bytes.
pub trait BufferAllocator {
    fn alloc(&self, capacity: usize) -> BytesMut;
}

/// Default allocator: plain heap allocations.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn alloc(&self, capacity: usize) -> BytesMut {
        BytesMut::with_capacity(capacity)
    }
}

/// A fixed-capacity byte buffer with explicit read and write cursors.
///
/// `start..end` is the unread region, `end..capacity` the writable spare.
/// There is no growth operation; when an operation needs more room than
/// the buffer holds, its *input* is shrunk instead. The single exception
/// is [`widen`](RecordBuffer::widen), reserved for the bounded-and-rare
/// handshake scratch case.
pub(crate) struct RecordBuffer {
    buf: BytesMut,
    start: usize,
    end: usize,
}

impl RecordBuffer {
    pub(crate) fn new(mut buf: BytesMut, capacity: usize) -> Self {
        buf.resize(capacity, 0);
        Self { buf, start: 0, end: 0 }
    }

    /// The unread bytes.
    pub(crate) fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when the unread bytes fill the whole buffer, i.e. not even
    /// compaction can make room.
    pub(crate) fn is_full(&self) -> bool {
        self.end - self.start == self.buf.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The writable spare region.
    pub(crate) fn spare(&mut self) -> &mut [u8] {
        &mut self.buf[self.end..]
    }

    pub(crate) fn spare_len(&self) -> usize {
        self.buf.len() - self.end
    }

    /// Consume `n` unread bytes. Cursors reset once everything is read.
    pub(crate) fn advance(&mut self, n: usize) {
        self.start += n;
        debug_assert!(self.start <= self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Mark `n` spare bytes as written.
    pub(crate) fn commit(&mut self, n: usize) {
        self.end += n;
        debug_assert!(self.end <= self.buf.len());
    }

    /// Move the unread bytes to the front, reclaiming consumed space.
    pub(crate) fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// One-time growth used only by the handshake scratch exception.
    pub(crate) fn widen(&mut self, additional: usize) {
        let new_len = self.buf.len() + additional;
        self.buf.resize(new_len, 0);
    }

    /// Drop the allocation. Idempotent; the buffer reads as empty and
    /// full afterwards, so nothing can be staged into it.
    pub(crate) fn release(&mut self) {
        self.buf = BytesMut::new();
        self.start = 0;
        self.end = 0;
    }
}

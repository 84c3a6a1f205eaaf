//! Receive-buffer management around outstanding submissions.

use crate::Error;

/// Growable receive buffer whose storage is lent to the reactor while a
/// submission is outstanding.
///
/// While lent, the storage is owned by the submission and must not be
/// touched; it comes home through [`RecvBuf::restore`] together with the
/// number of bytes the reactor filled in.
#[derive(Debug)]
pub(crate) struct RecvBuf {
    buf: Option<Vec<u8>>,
    size: usize,
    filled: usize,
}

impl RecvBuf {
    pub fn with_size(size: usize) -> Self {
        RecvBuf {
            buf: Some(vec![0; size]),
            size,
            filled: 0,
        }
    }

    /// Bytes of received data.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Current allocated size, valid also while the storage is lent.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.size
    }

    /// Offset a recv submission should fill from.
    pub fn write_offset(&self) -> usize {
        self.filled
    }

    /// True while the storage is inside an outstanding submission.
    pub fn is_lent(&self) -> bool {
        self.buf.is_none()
    }

    /// Take the storage to move it into a submission.
    pub fn lend(&mut self) -> Vec<u8> {
        // invariant: at most one submission per connection is in flight
        self.buf.take().expect("recv buffer already lent")
    }

    /// Return the storage with `received` new bytes at the fill mark.
    pub fn restore(&mut self, buf: Vec<u8>, received: usize) {
        debug_assert!(self.buf.is_none());
        self.filled += received;
        assert!(self.filled <= self.size);
        self.buf = Some(buf);
    }

    /// The received bytes.
    pub fn filled(&self) -> &[u8] {
        let buf = self.buf.as_ref().expect("recv buffer lent");
        &buf[..self.filled]
    }

    /// Grow by `step`, or up to `step` from a smaller initial size.
    /// Fails once the new size would exceed `cap`.
    pub fn grow(&mut self, step: usize, cap: usize) -> Result<(), Error> {
        let new_size = if self.size < step {
            step
        } else {
            self.size + step
        };
        if new_size > cap {
            return Err(Error::HeaderFieldsTooLong);
        }

        let buf = self.buf.as_mut().expect("recv buffer lent during grow");
        buf.resize(new_size, 0);
        self.size = new_size;
        Ok(())
    }

    /// Forget all received data, keeping the allocation.
    pub fn reset(&mut self) {
        self.filled = 0;
    }

    /// Drop received data beyond `len`, keeping the allocation.
    pub fn truncate(&mut self, len: usize) {
        assert!(len <= self.filled);
        self.filled = len;
    }
}

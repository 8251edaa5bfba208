//! Buffered byte stream over a bridge
//!
//! [`SerialStream`] turns the batch-oriented bridge into something closer to a
//! byte stream: bytes from each batch go into a [`ByteFifo`] and are handed
//! out in whatever sizes the consumer asks for. A read fetches at most two
//! batches, so every call stays bounded by a couple of read timeouts.

use std::num::NonZeroUsize;

use tracing::trace;

use crate::bridge::SerialBridge;
use crate::fifo::ByteFifo;
use crate::platform::UsbPlatform;

/// Default FIFO capacity: two full 4112-byte transfers
pub const DEFAULT_STREAM_CAPACITY: NonZeroUsize = match NonZeroUsize::new(2 * 4112) {
    Some(n) => n,
    None => unreachable!(),
};

/// Stream view of an open bridge
pub struct SerialStream<P> {
    bridge: SerialBridge<P>,
    fifo: ByteFifo,
}

impl<P: UsbPlatform> SerialStream<P> {
    /// Wrap a bridge with the default FIFO capacity
    pub fn new(bridge: SerialBridge<P>) -> Self {
        Self::with_capacity(bridge, DEFAULT_STREAM_CAPACITY)
    }

    /// Wrap a bridge with a specific FIFO capacity
    pub fn with_capacity(bridge: SerialBridge<P>, capacity: NonZeroUsize) -> Self {
        Self {
            bridge,
            fifo: ByteFifo::new(capacity),
        }
    }

    /// Bytes buffered and not yet consumed
    pub fn buffered(&self) -> usize {
        self.fifo.available()
    }

    pub fn has_error(&self) -> bool {
        self.bridge.has_error()
    }

    pub fn is_connected(&self) -> bool {
        self.bridge.is_connected()
    }

    /// Close the bridge and drop buffered bytes
    pub fn disconnect(&mut self) {
        self.bridge.close();
        self.fifo.clear();
    }

    /// Drop up to `count` buffered bytes
    pub fn skip(&mut self, count: usize) -> usize {
        self.fifo.skip(count)
    }

    /// Copy up to `buf.len()` bytes without consuming them
    pub fn peek(&mut self, buf: &mut [u8]) -> usize {
        let available = self.fill_to(buf.len());
        let count = available.min(buf.len());
        self.fifo.peek(&mut buf[..count])
    }

    /// Read up to `buf.len()` bytes
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let available = self.fill_to(buf.len());
        let count = available.min(buf.len());
        self.fifo.read(&mut buf[..count]);

        let missing = buf.len() - count;
        if missing == 0 {
            return count;
        }

        let available = self.fill_to(missing);
        if available == 0 {
            return count;
        }
        let second = available.min(missing);
        self.fifo.read(&mut buf[count..count + second]);
        count + second
    }

    /// Read bytes up to and including a `\n`, at most `buf.len()` of them
    ///
    /// Fetches at most one batch mid-line, so a returned slice without a
    /// trailing newline means the line is not complete yet.
    pub fn read_line(&mut self, buf: &mut [u8]) -> usize {
        let mut count = self.drain_line(buf, 0);
        if count == buf.len() || (count > 0 && buf[count - 1] == b'\n') {
            return count;
        }

        self.fetch();
        count = self.drain_line(buf, count);
        count
    }

    /// The wrapped bridge
    pub fn bridge(&self) -> &SerialBridge<P> {
        &self.bridge
    }

    fn drain_line(&mut self, buf: &mut [u8], mut count: usize) -> usize {
        while count < buf.len() {
            let Some(byte) = self.fifo.pop() else {
                break;
            };
            buf[count] = byte;
            count += 1;
            if byte == b'\n' {
                break;
            }
        }
        count
    }

    fn fill_to(&mut self, requested: usize) -> usize {
        if self.fifo.available() < requested {
            self.fetch();
        }
        self.fifo.available()
    }

    fn fetch(&mut self) {
        if self.bridge.has_error() {
            return;
        }
        let batch = self.bridge.read_batch();
        if !batch.is_empty() {
            trace!("Buffered {} byte(s)", batch.len());
            self.fifo.write(&batch);
        }
    }
}

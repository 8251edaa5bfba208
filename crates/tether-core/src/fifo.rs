//! Fixed-capacity byte ring buffer
//!
//! When full, writes overwrite the oldest bytes. Reads, peeks and skips are
//! clamped to what is buffered.

use std::num::NonZeroUsize;

/// Ring buffer of bytes
#[derive(Debug, Clone)]
pub struct ByteFifo {
    buffer: Box<[u8]>,
    head: usize,
    len: usize,
}

impl ByteFifo {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            buffer: vec![0; capacity.get()].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of buffered bytes
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of buffered bytes
    pub fn available(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Append one byte, dropping the oldest if full
    pub fn push(&mut self, byte: u8) {
        let cap = self.capacity();
        let tail = (self.head + self.len) % cap;
        self.buffer[tail] = byte;
        if self.len == cap {
            self.head = (self.head + 1) % cap;
        } else {
            self.len += 1;
        }
    }

    /// Remove the oldest byte
    pub fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buffer[self.head];
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(byte)
    }

    /// Append a slice, dropping the oldest bytes on overflow
    ///
    /// A slice longer than the capacity keeps only its last `capacity` bytes.
    pub fn write(&mut self, data: &[u8]) {
        let cap = self.capacity();
        let data = if data.len() > cap {
            &data[data.len() - cap..]
        } else {
            data
        };
        if data.is_empty() {
            return;
        }

        let tail = (self.head + self.len) % cap;
        let first = data.len().min(cap - tail);
        self.buffer[tail..tail + first].copy_from_slice(&data[..first]);
        self.buffer[..data.len() - first].copy_from_slice(&data[first..]);

        let total = self.len + data.len();
        if total > cap {
            self.head = (self.head + total - cap) % cap;
            self.len = cap;
        } else {
            self.len = total;
        }
    }

    /// Copy up to `out.len()` bytes without consuming them
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        let first = n.min(self.capacity() - self.head);
        out[..first].copy_from_slice(&self.buffer[self.head..self.head + first]);
        out[first..n].copy_from_slice(&self.buffer[..n - first]);
        n
    }

    /// Move up to `out.len()` bytes into `out`
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(out);
        self.skip(n)
    }

    /// Drop up to `count` bytes
    pub fn skip(&mut self, count: usize) -> usize {
        let n = count.min(self.len);
        self.head = (self.head + n) % self.capacity();
        self.len -= n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn fifo(capacity: usize) -> ByteFifo {
        ByteFifo::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_push_pop() {
        let mut f = fifo(3);
        f.push(1);
        f.push(2);
        assert_eq!(f.available(), 2);
        assert_eq!(f.pop(), Some(1));
        assert_eq!(f.pop(), Some(2));
        assert_eq!(f.pop(), None);
    }

    #[test]
    fn test_push_overwrites_oldest() {
        let mut f = fifo(3);
        for b in 1..=5 {
            f.push(b);
        }
        assert!(f.is_full());
        let mut out = [0u8; 3];
        assert_eq!(f.read(&mut out), 3);
        assert_eq!(out, [3, 4, 5]);
    }

    #[test]
    fn test_write_wraps_around() {
        let mut f = fifo(4);
        f.write(&[1, 2, 3]);
        f.skip(2);
        f.write(&[4, 5, 6]);

        let mut out = [0u8; 4];
        assert_eq!(f.peek(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
        assert_eq!(f.available(), 4);
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let mut f = fifo(4);
        f.write(&[1]);
        f.write(&[2, 3, 4, 5, 6, 7]);

        let mut out = [0u8; 8];
        assert_eq!(f.read(&mut out), 4);
        assert_eq!(&out[..4], &[4, 5, 6, 7]);
        assert!(f.is_empty());
    }

    #[test]
    fn test_skip_and_read_clamp() {
        let mut f = fifo(8);
        f.write(b"abc");
        assert_eq!(f.skip(10), 3);
        assert_eq!(f.skip(1), 0);

        let mut out = [0u8; 4];
        assert_eq!(f.read(&mut out), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u8),
        Pop,
        Write(Vec<u8>),
        Read(usize),
        Skip(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u8>().prop_map(Op::Push),
            Just(Op::Pop),
            prop::collection::vec(any::<u8>(), 0..24).prop_map(Op::Write),
            (0usize..24).prop_map(Op::Read),
            (0usize..24).prop_map(Op::Skip),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_bounded_deque(
            capacity in 1usize..16,
            ops in prop::collection::vec(op(), 0..64),
        ) {
            let mut f = fifo(capacity);
            let mut model: VecDeque<u8> = VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(b) => {
                        f.push(b);
                        model.push_back(b);
                    }
                    Op::Pop => {
                        prop_assert_eq!(f.pop(), model.pop_front());
                    }
                    Op::Write(data) => {
                        f.write(&data);
                        model.extend(data);
                    }
                    Op::Read(n) => {
                        let mut out = vec![0u8; n];
                        let got = f.read(&mut out);
                        let expected: Vec<u8> = model.drain(..n.min(model.len())).collect();
                        prop_assert_eq!(&out[..got], &expected[..]);
                    }
                    Op::Skip(n) => {
                        let expected = n.min(model.len());
                        model.drain(..expected);
                        prop_assert_eq!(f.skip(n), expected);
                    }
                }
                while model.len() > capacity {
                    model.pop_front();
                }
                prop_assert_eq!(f.available(), model.len());
            }
        }
    }
}

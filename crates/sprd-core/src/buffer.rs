//! Fixed-capacity byte accumulator for absorbing bulk reads.
//!
//! USB reads arrive in arbitrary sizes; protocol layers append them here and
//! then look at logical message boundaries with `peek`/`consume`. Consumed
//! bytes are compacted to the front, there is no wraparound.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorError {
    #[error("Buffer overflow: {requested} bytes requested, {free} free")]
    Overflow { requested: usize, free: usize },

    #[error("Not enough data: {requested} bytes requested, {available} available")]
    NotEnoughData { requested: usize, available: usize },
}

/// Byte buffer with a capacity fixed at construction.
#[derive(Debug)]
pub struct ByteAccumulator {
    buffer: Box<[u8]>,
    tail: usize,
}

impl ByteAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            tail: 0,
        }
    }

    /// Copy `data` after the current contents.
    ///
    /// Fails without modifying the buffer if `data` does not fit.
    pub fn append(&mut self, data: &[u8]) -> Result<(), AccumulatorError> {
        if data.len() > self.free() {
            return Err(AccumulatorError::Overflow {
                requested: data.len(),
                free: self.free(),
            });
        }
        self.buffer[self.tail..self.tail + data.len()].copy_from_slice(data);
        self.tail += data.len();
        Ok(())
    }

    /// First `len` bytes, without consuming them.
    pub fn peek(&self, len: usize) -> Result<&[u8], AccumulatorError> {
        self.check_available(len)?;
        Ok(&self.buffer[..len])
    }

    /// Drop the first `len` bytes and shift the rest to the front.
    pub fn consume(&mut self, len: usize) -> Result<(), AccumulatorError> {
        self.check_available(len)?;
        self.buffer.copy_within(len..self.tail, 0);
        self.tail -= len;
        Ok(())
    }

    /// `peek` followed by `consume`, returning an owned copy.
    pub fn get(&mut self, len: usize) -> Result<Vec<u8>, AccumulatorError> {
        let data = self.peek(len)?.to_vec();
        self.consume(len)?;
        Ok(data)
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.tail = 0;
    }

    pub fn available(&self) -> usize {
        self.tail
    }

    pub fn free(&self) -> usize {
        self.buffer.len() - self.tail
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tail == 0
    }

    fn check_available(&self, len: usize) -> Result<(), AccumulatorError> {
        if len > self.tail {
            return Err(AccumulatorError::NotEnoughData {
                requested: len,
                available: self.tail,
            });
        }
        Ok(())
    }
}

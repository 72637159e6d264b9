//! Capture bytes retained until the engine identifies the container.

/// Growable buffer holding everything captured before detection succeeded.
///
/// The buffer starts at an initial limit and doubles up to a hard cap. When it
/// is full at the cap the owner resets it and starts over.
#[derive(Debug)]
pub struct DetectionBuffer {
    data: Vec<u8>,
    limit: usize,
    max: usize,
}

impl DetectionBuffer {
    pub fn new(initial: usize, max: usize) -> Self {
        Self {
            data: Vec::with_capacity(initial),
            limit: initial.min(max),
            max,
        }
    }

    /// Append as much of `input` as fits; returns the number of bytes taken
    pub fn append(&mut self, input: &[u8]) -> usize {
        let take = (self.limit - self.data.len()).min(input.len());
        self.data.extend_from_slice(&input[..take]);
        take
    }

    /// The most recent `len` bytes
    pub fn tail(&self, len: usize) -> &[u8] {
        &self.data[self.data.len() - len..]
    }

    pub fn retained(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.limit
    }

    /// Current limit
    pub fn capacity(&self) -> usize {
        self.limit
    }

    pub fn at_cap(&self) -> bool {
        self.limit >= self.max
    }

    /// Double the limit, capped; returns false when already at the cap
    pub fn grow(&mut self) -> bool {
        if self.at_cap() {
            return false;
        }
        self.limit = self.limit.saturating_mul(2).min(self.max);
        self.data.reserve_exact(self.limit - self.data.len());
        true
    }

    /// Start over from position zero, keeping the current limit
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Hand the retained bytes out and free the buffer
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_stops_at_limit() {
        let mut buffer = DetectionBuffer::new(10, 40);
        assert_eq!(buffer.append(&[1; 6]), 6);
        assert_eq!(buffer.append(&[2; 6]), 4);
        assert!(buffer.is_full());
        assert_eq!(buffer.tail(4), &[2; 4]);
    }

    #[test]
    fn test_growth_is_capped() {
        let mut buffer = DetectionBuffer::new(10, 30);
        assert!(buffer.grow());
        assert_eq!(buffer.capacity(), 20);
        assert!(buffer.grow());
        assert_eq!(buffer.capacity(), 30);
        assert!(!buffer.grow());
        assert!(buffer.at_cap());
    }

    #[test]
    fn test_reset_keeps_limit() {
        let mut buffer = DetectionBuffer::new(10, 20);
        buffer.append(&[0; 10]);
        buffer.grow();
        buffer.append(&[0; 10]);
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 20);
    }

    #[test]
    fn test_take_releases_bytes() {
        let mut buffer = DetectionBuffer::new(4, 4);
        buffer.append(&[9, 8, 7]);
        assert_eq!(buffer.take(), vec![9, 8, 7]);
        assert!(buffer.is_empty());
    }
}

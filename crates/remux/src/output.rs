//! Engine output accumulation and ring-aware destination writes.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use tracing::debug;

use crate::destination::Destination;

/// Remuxed bytes waiting to be flushed.
///
/// The capacity is a soft bound: a write that does not fit triggers a flush,
/// and a single write larger than the capacity raises it.
#[derive(Debug)]
pub struct OutputBuffer {
    data: BytesMut,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    /// Raise the capacity so that `additional` more bytes fit
    pub fn make_room(&mut self, additional: usize) {
        if self.remaining() < additional {
            self.capacity = self.data.len() + additional;
            self.data.reserve(additional);
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Remove and return the first `at` bytes
    pub fn split_to(&mut self, at: usize) -> BytesMut {
        self.data.split_to(at)
    }

    /// Remove and return everything buffered
    pub fn take(&mut self) -> BytesMut {
        self.data.split()
    }
}

/// Bytes written to the current destination and across the session
#[derive(Debug, Default)]
pub struct ByteCounters {
    current: AtomicU64,
    total: AtomicU64,
}

impl ByteCounters {
    pub fn add(&self, bytes: u64) {
        self.current.fetch_add(bytes, Ordering::Relaxed);
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes written since the current destination was opened
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Bytes written since the session started; never reset
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn start_destination(&self) {
        self.current.store(0, Ordering::Relaxed);
    }
}

/// Wraparound state of a ring recording
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RingPosition {
    /// Bytes after which the destination rewinds; 0 disables the ring
    pub limit: u64,
    /// Bytes written since the last rewind
    pub since_wrap: u64,
    /// Rewinds performed on the current destination
    pub wraps: u64,
}

impl RingPosition {
    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Forget the position when a new destination is opened
    pub fn restart(&mut self) {
        self.since_wrap = 0;
        self.wraps = 0;
    }

    /// Write all of `data`, rewinding the destination each time the limit is reached
    pub fn write(
        &mut self,
        destination: &mut dyn Destination,
        mut data: &[u8],
        counters: &ByteCounters,
    ) -> io::Result<()> {
        while !data.is_empty() {
            let len = if self.is_enabled() {
                if self.since_wrap >= self.limit {
                    self.wrap(destination)?;
                }
                (self.limit - self.since_wrap).min(data.len() as u64) as usize
            } else {
                data.len()
            };

            let written = destination.write(&data[..len])?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "destination accepted no bytes",
                ));
            }
            counters.add(written as u64);
            self.since_wrap += written as u64;
            data = &data[written..];

            if self.is_enabled() && self.since_wrap >= self.limit {
                self.wrap(destination)?;
            }
        }
        Ok(())
    }

    fn wrap(&mut self, destination: &mut dyn Destination) -> io::Result<()> {
        destination.rewind()?;
        self.since_wrap = 0;
        self.wraps += 1;
        debug!(
            wraps = self.wraps,
            "Ring limit reached, rewinding {}",
            destination.path().display()
        );
        Ok(())
    }
}

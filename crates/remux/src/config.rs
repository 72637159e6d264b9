use std::{fmt::Display, time::Duration};

use ts::TS_PACKET_SIZE;

use crate::{RemuxError, Result};

/// Packets forwarded to the engine per push
pub const DEFAULT_TRANSFER_PACKETS: usize = 176;
/// Packets retained for detection before the first growth (about 5 MB)
pub const DEFAULT_DETECTION_PACKETS: usize = 27_888;
/// Packets retained for detection at the hard cap (about 20 MB)
pub const MAX_DETECTION_PACKETS: usize = 111_550;

#[derive(Debug, Clone)]
pub struct RemuxConfig {
    /// Size of one input packet
    pub packet_size: usize,

    /// Largest chunk forwarded to the engine in a single push
    pub max_transfer: usize,

    /// Initial size of the detection buffer
    pub initial_detection_size: usize,

    /// Hard cap of the detection buffer
    pub max_detection_size: usize,

    /// Initial capacity of the output buffer
    pub write_buffer_size: usize,

    /// Bytes scanned for a cut point before a switch gives up and cuts anyway
    pub switch_scan_limit: u64,

    /// How long `wait_is_switched` blocks before forcing the cut
    pub switch_wait_timeout: Duration,

    /// Bytes after a pack header searched for a program stream entry marker
    pub pack_search_window: usize,
}

impl Default for RemuxConfig {
    fn default() -> Self {
        Self {
            packet_size: TS_PACKET_SIZE,
            max_transfer: DEFAULT_TRANSFER_PACKETS * TS_PACKET_SIZE,
            initial_detection_size: DEFAULT_DETECTION_PACKETS * TS_PACKET_SIZE,
            max_detection_size: MAX_DETECTION_PACKETS * TS_PACKET_SIZE,
            write_buffer_size: 16_384,
            switch_scan_limit: 8 * 1024 * 1024,
            switch_wait_timeout: Duration::from_secs(30),
            pack_search_window: 2048,
        }
    }
}

impl Display for RemuxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RemuxConfig {{ packet_size: {}, max_transfer: {} bytes, detection: {}..{} bytes, write_buffer: {} bytes, switch_scan_limit: {} bytes, switch_wait_timeout: {:.2}s }}",
            self.packet_size,
            self.max_transfer,
            self.initial_detection_size,
            self.max_detection_size,
            self.write_buffer_size,
            self.switch_scan_limit,
            self.switch_wait_timeout.as_secs_f64()
        )
    }
}

impl RemuxConfig {
    pub fn builder() -> RemuxConfigBuilder {
        RemuxConfigBuilder::default()
    }

    /// Check the size relationships the feeder and detection buffer rely on
    pub fn validate(&self) -> Result<()> {
        if self.packet_size == 0 {
            return Err(RemuxError::InvalidConfig(
                "packet_size must be non-zero".to_string(),
            ));
        }
        if self.max_transfer == 0 || self.max_transfer % self.packet_size != 0 {
            return Err(RemuxError::InvalidConfig(format!(
                "max_transfer ({}) must be a non-zero multiple of the packet size ({})",
                self.max_transfer, self.packet_size
            )));
        }
        // The resync scan needs three packets in view to confirm alignment.
        if self.max_transfer < ts::sync::confirmation_span(self.packet_size) {
            return Err(RemuxError::InvalidConfig(format!(
                "max_transfer ({}) must hold at least three packets",
                self.max_transfer
            )));
        }
        for (name, size) in [
            ("initial_detection_size", self.initial_detection_size),
            ("max_detection_size", self.max_detection_size),
        ] {
            if size == 0 || size % self.packet_size != 0 {
                return Err(RemuxError::InvalidConfig(format!(
                    "{name} ({size}) must be a non-zero multiple of the packet size ({})",
                    self.packet_size
                )));
            }
        }
        if self.initial_detection_size > self.max_detection_size {
            return Err(RemuxError::InvalidConfig(format!(
                "initial_detection_size ({}) exceeds max_detection_size ({})",
                self.initial_detection_size, self.max_detection_size
            )));
        }
        if self.write_buffer_size == 0 {
            return Err(RemuxError::InvalidConfig(
                "write_buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemuxConfigBuilder {
    config: RemuxConfig,
}

impl RemuxConfigBuilder {
    pub fn packet_size(mut self, packet_size: usize) -> Self {
        self.config.packet_size = packet_size;
        self
    }

    pub fn max_transfer(mut self, max_transfer: usize) -> Self {
        self.config.max_transfer = max_transfer;
        self
    }

    /// Transfer unit expressed in packets
    pub fn transfer_packets(mut self, packets: usize) -> Self {
        self.config.max_transfer = packets * self.config.packet_size;
        self
    }

    pub fn initial_detection_size(mut self, size: usize) -> Self {
        self.config.initial_detection_size = size;
        self
    }

    pub fn max_detection_size(mut self, size: usize) -> Self {
        self.config.max_detection_size = size;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    pub fn switch_scan_limit(mut self, limit: u64) -> Self {
        self.config.switch_scan_limit = limit;
        self
    }

    pub fn switch_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.switch_wait_timeout = timeout;
        self
    }

    pub fn pack_search_window(mut self, window: usize) -> Self {
        self.config.pack_search_window = window;
        self
    }

    pub fn build(self) -> RemuxConfig {
        self.config
    }
}

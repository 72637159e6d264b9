//! Remux sessions.
//!
//! A [`RemuxSession`] is one recording. The capture producer owns it and feeds
//! it raw capture bytes; other threads reach it through a cloneable
//! [`SessionHandle`] to move the recording to a new destination or to read
//! its progress.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RemuxConfig;
use crate::destination::{Destination, DestinationOpener};
use crate::detection::DetectionBuffer;
use crate::engine::{EngineFactory, EngineParams, RemuxEngine};
use crate::feeder::Feeder;
use crate::format::{
    CaptureKind, ContainerFormat, RemuxFormat, SubFormat, TuneDescriptor, VideoCodec,
};
use crate::output::RingPosition;
use crate::registry::SessionRegistry;
use crate::writer::{OutputShared, SessionSink};
use crate::Result;

/// Detection progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    /// Current detection buffer limit
    pub capacity: usize,
    pub growths: u64,
    /// Times the buffer filled at its cap and analysis restarted
    pub resets: u64,
    pub engine_opens: u64,
    /// Times program stream output was replaced by transport stream output
    pub format_corrections: u64,
}

pub struct SessionBuilder {
    destination: Box<dyn Destination>,
    factory: Arc<dyn EngineFactory>,
    opener: Arc<dyn DestinationOpener>,
    output: RemuxFormat,
    capture: CaptureKind,
    sub_format: SubFormat,
    tune: TuneDescriptor,
    config: RemuxConfig,
    registry: Option<Arc<SessionRegistry>>,
}

impl SessionBuilder {
    pub fn output_format(mut self, output: RemuxFormat) -> Self {
        self.output = output;
        self
    }

    pub fn capture_kind(mut self, capture: CaptureKind) -> Self {
        self.capture = capture;
        self
    }

    pub fn sub_format(mut self, sub_format: SubFormat) -> Self {
        self.sub_format = sub_format;
        self
    }

    /// Explicit tuning; without it the engine picks the program itself
    pub fn tune(mut self, tune: TuneDescriptor) -> Self {
        self.tune = tune;
        self
    }

    pub fn config(mut self, config: RemuxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Open the engine and register the session.
    ///
    /// Fails when the configuration is invalid or the engine cannot be opened.
    pub fn build(self) -> Result<RemuxSession> {
        self.config.validate()?;

        let params = EngineParams {
            sub_format: self.sub_format,
            tune: self.tune,
            ..EngineParams::new(self.output, self.capture)
        };
        let path = self.destination.path().to_path_buf();
        let shared = Arc::new(OutputShared::new(
            &self.config,
            self.destination,
            self.opener,
            self.registry.clone(),
            self.output,
        ));
        let engine = self
            .factory
            .open(&params, Box::new(SessionSink::new(shared.clone())))?;

        if let Some(registry) = &self.registry {
            registry.register(
                path.clone(),
                SessionHandle {
                    shared: shared.clone(),
                },
            );
        }

        info!(
            destination = %path.display(),
            output = %self.output,
            tune = %self.tune,
            "Remux session started"
        );
        debug!("{}", self.config);

        Ok(RemuxSession {
            feeder: Feeder::new(self.config.packet_size, self.config.max_transfer),
            detection: DetectionBuffer::new(
                self.config.initial_detection_size,
                self.config.max_detection_size,
            ),
            factory: self.factory,
            params,
            engine: Some(engine),
            container: None,
            shared,
            stats: DetectionStats {
                engine_opens: 1,
                ..DetectionStats::default()
            },
            retained_drops: 0,
            superseded: 0,
            closed: false,
        })
    }
}

pub struct RemuxSession {
    factory: Arc<dyn EngineFactory>,
    params: EngineParams,
    engine: Option<Box<dyn RemuxEngine>>,
    feeder: Feeder,
    detection: DetectionBuffer,
    container: Option<ContainerFormat>,
    shared: Arc<OutputShared>,
    stats: DetectionStats,
    /// Drop count when the retained bytes started through the feeder
    retained_drops: u64,
    /// Drops of retained bytes counted again by a later replay
    superseded: u64,
    closed: bool,
}

impl RemuxSession {
    pub fn builder(
        destination: Box<dyn Destination>,
        factory: Arc<dyn EngineFactory>,
        opener: Arc<dyn DestinationOpener>,
    ) -> SessionBuilder {
        SessionBuilder {
            destination,
            factory,
            opener,
            output: RemuxFormat::Ts,
            capture: CaptureKind::Other,
            sub_format: SubFormat::Unknown,
            tune: TuneDescriptor::auto(),
            config: RemuxConfig::default(),
            registry: None,
        }
    }

    /// Feed captured bytes.
    ///
    /// Returns the number of bytes consumed, or `None` once the session is
    /// closed or when the engine could not be reopened for this call.
    pub fn feed(&mut self, data: &[u8]) -> Option<usize> {
        if self.closed {
            return None;
        }

        let mut rest = data;
        while !rest.is_empty() {
            if self.container.is_some() {
                self.push_remux(rest);
                break;
            }
            let taken = self.push_init(rest);
            rest = &rest[taken..];
            if !self.poll_detection() {
                return None;
            }
        }
        Some(data.len())
    }

    fn push_init(&mut self, input: &[u8]) -> usize {
        let taken = self.detection.append(input);
        if let Some(engine) = self.engine.as_mut() {
            let fresh = self.detection.tail(taken);
            self.feeder.push(fresh, &mut |chunk| {
                engine.push_init_data(chunk);
            });
        }
        taken
    }

    fn push_remux(&mut self, data: &[u8]) {
        if let Some(engine) = self.engine.as_mut() {
            self.feeder
                .push(data, &mut |chunk| engine.push_remux_data(chunk));
        }
    }

    /// Returns false when the engine had to be reopened and could not be
    fn poll_detection(&mut self) -> bool {
        match self.engine.as_ref().and_then(|e| e.container_format()) {
            Some(format) => self.on_detected(format),
            None => {
                self.on_undetected();
                true
            }
        }
    }

    fn on_undetected(&mut self) {
        if !self.detection.is_full() {
            return;
        }
        if self.detection.grow() {
            self.stats.growths += 1;
            info!(
                capacity = self.detection.capacity(),
                "Container not detected yet, growing detection buffer"
            );
            return;
        }

        self.stats.resets += 1;
        warn!(
            retained = self.detection.len(),
            resets = self.stats.resets,
            "Container not detected at the detection cap, restarting analysis with automatic tuning"
        );
        self.detection.reset();
        self.feeder.reset();
        self.retained_drops = self.feeder.dropped_bytes();
        self.params.tune = TuneDescriptor::auto();
        self.reopen_engine();
    }

    fn on_detected(&mut self, mut format: ContainerFormat) -> bool {
        let codec = format.video_codec();
        if self.params.output == RemuxFormat::Ps
            && codec.is_some_and(|codec| !codec.fits_program_stream())
        {
            info!(
                codec = ?codec,
                "Program stream cannot carry this video codec, remuxing to transport stream"
            );
            self.params.output = RemuxFormat::Ts;
            self.stats.format_corrections += 1;
            if !self.reopen_engine() {
                return false;
            }
            match self.redetect() {
                Some(redetected) => format = redetected,
                None => {
                    debug!("Replay did not redetect the container, waiting for more data");
                    return true;
                }
            }
        }

        self.start_remuxing(format);
        true
    }

    /// Run the retained capture through the analysis path of a fresh engine.
    ///
    /// The feeder keeps the undelivered tail so later calls continue the
    /// analysis where the replay stopped.
    fn redetect(&mut self) -> Option<ContainerFormat> {
        self.restart_retained();
        let engine = self.engine.as_mut()?;
        let mut done = false;
        self.feeder.push(self.detection.retained(), &mut |chunk| {
            if !done {
                done = engine.push_init_data(chunk);
            }
        });
        engine.container_format()
    }

    /// Rewind the feeder to the first retained byte. Drops already counted
    /// for the retained bytes are superseded by the coming pass.
    fn restart_retained(&mut self) {
        self.superseded += self.feeder.dropped_bytes() - self.retained_drops;
        self.feeder.reset();
        self.retained_drops = self.feeder.dropped_bytes();
    }

    fn start_remuxing(&mut self, format: ContainerFormat) {
        let family = format.video_codec().and_then(VideoCodec::family);
        let video_pid = format.video.map(|video| video.pid);
        self.shared
            .set_cut_policy(self.params.output, family, video_pid);

        info!(
            format = %format,
            output = %self.params.output,
            retained = self.detection.len(),
            "Container detected"
        );
        self.container = Some(format);
        self.shared.start_accepting();

        // The recording starts at the first retained byte
        self.restart_retained();
        let retained = self.detection.take();
        self.push_remux(&retained);
    }

    fn reopen_engine(&mut self) -> bool {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
        }
        let sink = Box::new(SessionSink::new(self.shared.clone()));
        match self.factory.open(&self.params, sink) {
            Ok(engine) => {
                self.engine = Some(engine);
                self.stats.engine_opens += 1;
                debug!(output = %self.params.output, "Remux engine reopened");
                true
            }
            Err(e) => {
                error!("Failed to reopen remux engine: {e}");
                false
            }
        }
    }

    /// Wrap the destination after `limit` bytes; 0 disables wrapping
    pub fn set_buffer_limit(&self, limit: u64) {
        self.shared.set_ring_limit(limit);
    }

    pub fn ring_position(&self) -> RingPosition {
        self.shared.ring_position()
    }

    /// Whether the container was detected
    pub fn is_initialized(&self) -> bool {
        self.container.is_some()
    }

    pub fn container_format(&self) -> Option<&ContainerFormat> {
        self.container.as_ref()
    }

    pub fn output_format(&self) -> RemuxFormat {
        self.params.output
    }

    /// Bytes written to the current destination
    pub fn file_size(&self) -> u64 {
        self.shared.counters().current()
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.shared.counters().total()
    }

    /// Capture bytes dropped while realigning packets
    pub fn dropped_bytes(&self) -> u64 {
        self.feeder.dropped_bytes() - self.superseded
    }

    pub fn detection_stats(&self) -> DetectionStats {
        DetectionStats {
            capacity: self.detection.capacity(),
            ..self.stats
        }
    }

    pub fn current_destination(&self) -> PathBuf {
        self.shared.current_path()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn start_switch(&self, name: &str, token: u32) -> bool {
        self.shared.start_switch(name, token)
    }

    pub fn is_switched(&self) -> bool {
        self.shared.is_switched()
    }

    pub fn wait_is_switched(&self) -> bool {
        self.shared.wait_switched()
    }

    pub fn force_switched(&self) {
        self.shared.force_switch()
    }

    /// Drain the engine, resolve any pending switch and close the destination
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut engine) = self.engine.take() {
            if self.container.is_some() {
                self.feeder
                    .finish(&mut |chunk| engine.push_remux_data(chunk));
            }
            engine.close();
        }
        self.shared.finish();

        if let Some(registry) = self.shared.registry() {
            registry.unregister(&self.shared.current_path(), &self.handle());
        }
        info!(
            destination = %self.shared.current_path().display(),
            bytes = self.shared.counters().total(),
            dropped = self.dropped_bytes(),
            switches = self.shared.switch_count(),
            "Remux session closed"
        );
    }
}

impl Drop for RemuxSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cloneable access to a session from threads other than the producer
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<OutputShared>,
}

impl SessionHandle {
    /// Request a move to destination `name`.
    ///
    /// Rejected while another switch is pending, when `name` is the current
    /// destination, or after close. The cut happens on a later flush unless
    /// the buffered output already contains one.
    pub fn start_switch(&self, name: &str, token: u32) -> bool {
        self.shared.start_switch(name, token)
    }

    pub fn is_switched(&self) -> bool {
        self.shared.is_switched()
    }

    /// Wait for the pending switch, forcing it when the wait times out
    pub fn wait_is_switched(&self) -> bool {
        self.shared.wait_switched()
    }

    /// Cut now, preferring a boundary in the buffered output
    pub fn force_switched(&self) {
        self.shared.force_switch()
    }

    pub fn file_size(&self) -> u64 {
        self.shared.counters().current()
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.shared.counters().total()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn current_destination(&self) -> PathBuf {
        self.shared.current_path()
    }

    /// Take the session out of its registry for good
    pub fn disable_registry(&self) {
        if let Some((registry, path)) = self.shared.detach_registry() {
            info!("Session for {} detached from the registry", path.display());
            registry.unregister(&path, self);
        }
    }

    pub(crate) fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("destination", &self.shared.current_path())
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_tracing;
    use crate::test_utils::{MemoryOpener, ScriptedFactory, memory_destination};
    use ts::TS_PACKET_SIZE;

    fn small_config() -> RemuxConfig {
        RemuxConfig::builder()
            .transfer_packets(4)
            .initial_detection_size(10 * TS_PACKET_SIZE)
            .max_detection_size(40 * TS_PACKET_SIZE)
            .build()
    }

    fn aligned(packets: usize) -> Vec<u8> {
        let mut data = vec![0u8; packets * TS_PACKET_SIZE];
        for (i, chunk) in data.chunks_exact_mut(TS_PACKET_SIZE).enumerate() {
            chunk[0] = 0x47;
            chunk[1] = (i >> 8) as u8 & 0x1F;
            chunk[2] = i as u8;
        }
        data
    }

    #[test]
    fn test_feed_after_close_returns_none() {
        init_test_tracing!();
        let (destination, _file) = memory_destination("rec.ts");
        let mut session = RemuxSession::builder(
            destination,
            Arc::new(ScriptedFactory::never()),
            Arc::new(MemoryOpener::default()),
        )
        .config(small_config())
        .build()
        .unwrap();

        assert_eq!(session.feed(&aligned(2)), Some(2 * TS_PACKET_SIZE));
        session.close();
        assert!(session.is_closed());
        assert_eq!(session.feed(&aligned(1)), None);
    }

    #[test]
    fn test_invalid_config_fails_construction() {
        let (destination, _file) = memory_destination("rec.ts");
        let result = RemuxSession::builder(
            destination,
            Arc::new(ScriptedFactory::never()),
            Arc::new(MemoryOpener::default()),
        )
        .config(RemuxConfig::builder().max_transfer(100).build())
        .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_engine_open_failure_is_fatal() {
        let (destination, _file) = memory_destination("rec.ts");
        let result = RemuxSession::builder(
            destination,
            Arc::new(ScriptedFactory::failing()),
            Arc::new(MemoryOpener::default()),
        )
        .build();
        assert!(matches!(result, Err(crate::RemuxError::EngineOpen(_))));
    }

    #[test]
    fn test_detection_replays_from_first_byte() {
        init_test_tracing!();
        let factory = Arc::new(ScriptedFactory::detect_after(6 * TS_PACKET_SIZE));
        let (destination, file) = memory_destination("rec.ts");
        let mut session = RemuxSession::builder(
            destination,
            factory.clone(),
            Arc::new(MemoryOpener::default()),
        )
        .config(small_config())
        .build()
        .unwrap();

        let stream = aligned(30);
        for part in stream.chunks(100) {
            session.feed(part);
        }
        assert!(session.is_initialized());
        session.close();

        assert_eq!(file.contents(), stream);
        assert_eq!(session.total_bytes_written(), stream.len() as u64);
        assert_eq!(session.detection_stats().engine_opens, 1);
    }

    #[test]
    fn test_drops_after_detection_reset_are_counted() {
        init_test_tracing!();
        let factory = Arc::new(ScriptedFactory::never().on_reopen(8 * TS_PACKET_SIZE));
        let (destination, file) = memory_destination("rec.ts");
        let mut session = RemuxSession::builder(
            destination,
            factory,
            Arc::new(MemoryOpener::default()),
        )
        .config(
            RemuxConfig::builder()
                .transfer_packets(4)
                .initial_detection_size(10 * TS_PACKET_SIZE)
                .max_detection_size(10 * TS_PACKET_SIZE)
                .build(),
        )
        .build()
        .unwrap();

        // 50 garbage bytes shift the reset point 50 bytes before the end of
        // packet 9, so the retained capture restarts inside a packet
        let stream = aligned(40);
        let mut capture = vec![0x33; 50];
        capture.extend_from_slice(&stream);
        for part in capture.chunks(100) {
            session.feed(part);
        }
        assert!(session.is_initialized());
        assert_eq!(session.detection_stats().resets, 1);
        session.close();

        assert_eq!(session.dropped_bytes(), 100);
        assert_eq!(file.contents(), &stream[10 * TS_PACKET_SIZE..]);
    }

    #[test]
    fn test_undetected_stream_never_writes() {
        let (destination, file) = memory_destination("rec.ts");
        let mut session = RemuxSession::builder(
            destination,
            Arc::new(ScriptedFactory::never()),
            Arc::new(MemoryOpener::default()),
        )
        .config(small_config())
        .build()
        .unwrap();

        session.feed(&aligned(25));
        session.close();
        assert!(session.container_format().is_none());
        assert_eq!(session.file_size(), 0);
        assert!(file.contents().is_empty());
    }
}

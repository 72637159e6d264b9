//! Output state shared between the producer and switch callers.
//!
//! Everything a switch touches lives behind one lock: the output buffer, the
//! destination, the ring position and the pending request. The engine sink
//! appends to the buffer on the producer's stack; switch callers inspect and
//! resolve the request from their own threads.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};
use ts::CodecFamily;

use crate::config::RemuxConfig;
use crate::destination::{Destination, DestinationOpener};
use crate::engine::RemuxSink;
use crate::format::RemuxFormat;
use crate::output::{ByteCounters, OutputBuffer, RingPosition};
use crate::registry::SessionRegistry;
use crate::switch::{CutPolicy, SwitchRequest};

pub(crate) struct OutputState {
    buffer: OutputBuffer,
    destination: Option<Box<dyn Destination>>,
    /// Identity of the current destination; kept while a failed switch
    /// leaves no destination open
    current_path: PathBuf,
    ring: RingPosition,
    policy: CutPolicy,
    request: Option<SwitchRequest>,
    opener: Arc<dyn DestinationOpener>,
    registry: Option<Arc<SessionRegistry>>,
    scan_limit: u64,
    switches: u64,
}

impl OutputState {
    fn flush_pending(&mut self, counters: &ByteCounters, force: bool) -> bool {
        if self.request.is_some() {
            self.try_cut(counters, force)
        } else {
            self.flush_all(counters);
            false
        }
    }

    fn flush_all(&mut self, counters: &ByteCounters) {
        let data = self.buffer.take();
        self.write_out(&data, counters);
    }

    fn write_out(&mut self, data: &[u8], counters: &ByteCounters) {
        if data.is_empty() {
            return;
        }
        let Some(destination) = self.destination.as_mut() else {
            error!(
                "No destination open after {}, discarding {} bytes",
                self.current_path.display(),
                data.len()
            );
            return;
        };
        if let Err(e) = self.ring.write(destination.as_mut(), data, counters) {
            error!("Failed to write to {}: {e}", self.current_path.display());
        }
    }

    /// Look for a cut point in the buffer and switch destinations on it.
    ///
    /// Returns true when the switch completed. Without a cut point the buffer
    /// goes to the current destination so the same bytes are not scanned
    /// again.
    fn try_cut(&mut self, counters: &ByteCounters, force: bool) -> bool {
        // Nothing to look at until the engine produces output
        if self.buffer.is_empty() && !force {
            return false;
        }
        let found = self.policy.find_cut_point(self.buffer.as_slice());
        let buffered = self.buffer.len() as u64;
        let Some(request) = self.request.as_mut() else {
            return false;
        };
        request.scanned += buffered;
        let scanned = request.scanned;

        let cut = match found {
            Some(offset) => offset,
            None if force => {
                warn!(scanned, "Forcing switch without an access-unit boundary");
                0
            }
            None if scanned > self.scan_limit => {
                warn!(
                    scanned,
                    "No access-unit boundary within the scan limit, cutting at buffer start"
                );
                0
            }
            None => {
                trace!(scanned, "No cut point in {buffered} buffered bytes");
                self.flush_all(counters);
                return false;
            }
        };

        let before = self.buffer.split_to(cut);
        self.write_out(&before, counters);

        if let Some(mut old) = self.destination.take() {
            if let Err(e) = old.close() {
                error!("Failed to close {}: {e}", self.current_path.display());
            }
        }

        let Some(request) = self.request.clone() else {
            return false;
        };
        let destination = match self.opener.open(&request.name, request.token) {
            Ok(destination) => destination,
            Err(e) => {
                error!(
                    "Failed to open switch destination {}: {e}; retrying on the next flush",
                    request.name
                );
                return false;
            }
        };

        let old_path = std::mem::replace(&mut self.current_path, destination.path().to_path_buf());
        self.destination = Some(destination);
        self.request = None;
        self.switches += 1;
        counters.start_destination();
        self.ring.restart();

        let after = self.buffer.take();
        self.write_out(&after, counters);

        if let Some(registry) = &self.registry {
            registry.rename(&old_path, self.current_path.clone());
        }
        info!(
            from = %old_path.display(),
            to = %self.current_path.display(),
            cut,
            scanned,
            "Recording switched to new destination"
        );
        true
    }

    fn close_destination(&mut self) {
        if let Some(mut destination) = self.destination.take() {
            if let Err(e) = destination.close() {
                error!("Failed to close {}: {e}", self.current_path.display());
            }
        }
    }
}

pub(crate) struct OutputShared {
    state: Mutex<OutputState>,
    switched: Condvar,
    counters: ByteCounters,
    /// Engine output is kept only once detection succeeded
    accepting: AtomicBool,
    closed: AtomicBool,
    wait_timeout: Duration,
}

impl OutputShared {
    pub fn new(
        config: &RemuxConfig,
        destination: Box<dyn Destination>,
        opener: Arc<dyn DestinationOpener>,
        registry: Option<Arc<SessionRegistry>>,
        output: RemuxFormat,
    ) -> Self {
        let current_path = destination.path().to_path_buf();
        Self {
            state: Mutex::new(OutputState {
                buffer: OutputBuffer::new(config.write_buffer_size),
                destination: Some(destination),
                current_path,
                ring: RingPosition::default(),
                policy: CutPolicy::new(output, config.pack_search_window),
                request: None,
                opener,
                registry,
                scan_limit: config.switch_scan_limit,
                switches: 0,
            }),
            switched: Condvar::new(),
            counters: ByteCounters::default(),
            accepting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            wait_timeout: config.switch_wait_timeout,
        }
    }

    pub fn counters(&self) -> &ByteCounters {
        &self.counters
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn start_accepting(&self) {
        self.accepting.store(true, Ordering::Release);
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn current_path(&self) -> PathBuf {
        self.state.lock().current_path.clone()
    }

    pub fn switch_count(&self) -> u64 {
        self.state.lock().switches
    }

    pub fn registry(&self) -> Option<Arc<SessionRegistry>> {
        self.state.lock().registry.clone()
    }

    /// Stop following the registry; returns the registry and the path the
    /// session is registered under
    pub fn detach_registry(&self) -> Option<(Arc<SessionRegistry>, PathBuf)> {
        let mut state = self.state.lock();
        let registry = state.registry.take()?;
        Some((registry, state.current_path.clone()))
    }

    pub fn set_ring_limit(&self, limit: u64) {
        let mut state = self.state.lock();
        debug!(limit, "Ring limit set for {}", state.current_path.display());
        state.ring.limit = limit;
    }

    pub fn ring_position(&self) -> RingPosition {
        self.state.lock().ring
    }

    pub fn set_cut_policy(
        &self,
        output: RemuxFormat,
        codec: Option<CodecFamily>,
        video_pid: Option<u16>,
    ) {
        let mut state = self.state.lock();
        state.policy.output = output;
        state.policy.codec = codec;
        state.policy.video_pid = video_pid;
    }

    pub fn append(&self, data: &[u8]) {
        let mut state = self.state.lock();
        let mut switched = false;
        if state.buffer.remaining() < data.len() {
            switched = state.flush_pending(&self.counters, false);
            state.buffer.make_room(data.len());
        }
        state.buffer.extend(data);
        drop(state);
        if switched {
            self.switched.notify_all();
        }
    }

    pub fn flush(&self) {
        let switched = self.state.lock().flush_pending(&self.counters, false);
        if switched {
            self.switched.notify_all();
        }
    }

    pub fn start_switch(&self, name: &str, token: u32) -> bool {
        if self.is_closed() {
            warn!("Ignoring switch to {name} on a closed session");
            return false;
        }
        let mut state = self.state.lock();
        if let Some(pending) = &state.request {
            warn!(
                "Ignoring switch to {name}, a switch to {} is still pending",
                pending.name
            );
            return false;
        }
        if state.current_path.as_os_str() == name {
            warn!("Ignoring switch to {name}, it is already the current destination");
            return false;
        }

        info!(
            from = %state.current_path.display(),
            to = name,
            "Switch requested"
        );
        state.request = Some(SwitchRequest::new(name, token));
        let switched = state.try_cut(&self.counters, false);
        drop(state);
        if switched {
            self.switched.notify_all();
        }
        true
    }

    pub fn is_switched(&self) -> bool {
        self.state.lock().request.is_none()
    }

    /// Block until the pending switch completes, forcing it once the wait
    /// timeout expires
    pub fn wait_switched(&self) -> bool {
        let deadline = Instant::now() + self.wait_timeout;
        let mut state = self.state.lock();
        while state.request.is_some() && !self.is_closed() {
            if self.switched.wait_until(&mut state, deadline).timed_out() {
                if state.request.is_some() {
                    warn!(
                        "No cut point found after {:.1}s, forcing the switch",
                        self.wait_timeout.as_secs_f64()
                    );
                    if state.try_cut(&self.counters, true) {
                        self.switched.notify_all();
                    }
                }
                break;
            }
        }
        state.request.is_none()
    }

    pub fn force_switch(&self) {
        let mut state = self.state.lock();
        if state.request.is_none() {
            return;
        }
        warn!("Forcing the switch point");
        let switched = state.try_cut(&self.counters, true);
        drop(state);
        if switched {
            self.switched.notify_all();
        }
    }

    /// Resolve a pending switch, write out everything and close the destination
    pub fn finish(&self) {
        self.closed.store(true, Ordering::Release);
        let mut state = self.state.lock();
        if state.request.is_some() {
            info!("Closing with a pending switch, forcing the cut");
            state.try_cut(&self.counters, true);
        }
        state.flush_all(&self.counters);
        state.close_destination();
        self.accepting.store(false, Ordering::Release);
        drop(state);
        self.switched.notify_all();
    }
}

/// The sink handed to the engine
pub(crate) struct SessionSink {
    shared: Arc<OutputShared>,
}

impl SessionSink {
    pub fn new(shared: Arc<OutputShared>) -> Self {
        Self { shared }
    }
}

impl RemuxSink for SessionSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.shared.is_accepting() {
            self.shared.append(data);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.shared.is_accepting() {
            self.shared.flush();
        }
        Ok(())
    }
}

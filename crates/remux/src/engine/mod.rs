//! Remux engine abstraction.
//!
//! The engine detects the container layout of the capture and re-containerizes
//! it. It receives aligned transfer units and hands its output back through a
//! [`RemuxSink`] on the caller's stack.

pub mod mpeg;
mod ps_mux;

use std::io;

use crate::Result;
use crate::format::{
    CaptureKind, ContainerFormat, RemuxFormat, StreamFormat, SubFormat, TuneDescriptor,
};

/// Receives engine output synchronously
pub trait RemuxSink: Send {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

/// Parameters an engine is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineParams {
    pub input: RemuxFormat,
    pub output: RemuxFormat,
    pub stream_format: StreamFormat,
    pub sub_format: SubFormat,
    pub tune: TuneDescriptor,
}

impl EngineParams {
    pub fn new(output: RemuxFormat, capture: CaptureKind) -> Self {
        Self {
            input: RemuxFormat::Ts,
            output,
            stream_format: capture.stream_format(),
            sub_format: SubFormat::Unknown,
            tune: TuneDescriptor::auto(),
        }
    }
}

pub trait RemuxEngine: Send {
    /// Feed data for analysis only.
    ///
    /// Returns `true` once analysis needs no more data.
    fn push_init_data(&mut self, data: &[u8]) -> bool;

    /// Feed data to be remuxed; output goes to the sink
    fn push_remux_data(&mut self, data: &[u8]);

    /// Detected layout, once known
    fn container_format(&self) -> Option<ContainerFormat>;

    /// Emit pending output and release resources
    fn close(&mut self);
}

pub trait EngineFactory: Send + Sync {
    fn open(&self, params: &EngineParams, sink: Box<dyn RemuxSink>)
    -> Result<Box<dyn RemuxEngine>>;
}

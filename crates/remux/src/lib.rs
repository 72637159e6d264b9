//! # Remux
//!
//! Live MPEG capture remuxer.
//!
//! A [`RemuxSession`] takes raw capture bytes from a single producer, realigns
//! them to transport stream packets, lets a [`RemuxEngine`] detect the
//! container layout and re-containerize it, and writes the engine output to a
//! destination. While the recording runs, another thread can ask the session
//! (through a [`SessionHandle`]) to move the recording to a new destination;
//! the cut lands on a codec access-unit boundary when one can be found.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use remux::{
//!     FileDestination, FileOpener, MpegEngineFactory, RemuxFormat, RemuxSession, SessionRegistry,
//! };
//!
//! # fn main() -> remux::Result<()> {
//! let registry = Arc::new(SessionRegistry::new());
//! let mut session = RemuxSession::builder(
//!     Box::new(FileDestination::create("recording.ts")?),
//!     Arc::new(MpegEngineFactory),
//!     Arc::new(FileOpener::new()),
//! )
//! .output_format(RemuxFormat::Ts)
//! .registry(registry)
//! .build()?;
//!
//! let handle = session.handle();
//! session.feed(&[0u8; 188]);
//! handle.start_switch("recording-2.ts", 0);
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod destination;
pub mod detection;
pub mod engine;
pub mod error;
pub mod feeder;
pub mod format;
pub mod output;
pub mod registry;
pub mod session;
pub mod switch;
pub mod test_utils;
mod writer;

pub use config::{RemuxConfig, RemuxConfigBuilder};
pub use destination::{Destination, DestinationOpener, FileDestination, FileOpener};
pub use detection::DetectionBuffer;
pub use engine::mpeg::{MpegEngineFactory, MpegRemuxEngine};
pub use engine::{EngineFactory, EngineParams, RemuxEngine, RemuxSink};
pub use error::RemuxError;
pub use feeder::Feeder;
pub use format::{
    AudioStream, CaptureKind, ContainerFormat, RemuxFormat, StreamFormat, SubFormat,
    TuneDescriptor, TuneKind, VideoCodec, VideoFormat,
};
pub use output::OutputBuffer;
pub use registry::SessionRegistry;
pub use session::{DetectionStats, RemuxSession, SessionBuilder, SessionHandle};
pub use switch::CutPolicy;
pub use ts::StreamType;

/// Result type for remux operations
pub type Result<T> = std::result::Result<T, RemuxError>;

//! MPEG transport and program stream primitives
//!
//! This crate provides the container-level building blocks used by the
//! capture remuxer: packet alignment scanning, PAT/PMT probing, PES and pack
//! header handling, and access-unit marker detection for splice points.
//! Nothing here decodes audio or video.

pub mod error;
pub mod marker;
pub mod pack;
pub mod packet;
pub mod pes;
pub mod probe;
pub mod psi;
pub mod stream_type;
pub mod sync;

pub use error::TsError;
pub use marker::CodecFamily;
pub use pack::{PACK_START_CODE, PackHeader};
pub use packet::{PID_NULL, PID_PAT, SYNC_BYTE, TS_PACKET_SIZE, TsPacketRef};
pub use pes::PesHeader;
pub use probe::{ProgramInfo, ProgramProbe, ProgramSelection};
pub use psi::{PatProgram, PatRef, PmtRef, PmtStream};
pub use stream_type::StreamType;
pub use sync::{SyncScan, find_sync, scan_for_sync};

/// Result type for TS parsing operations
pub type Result<T> = std::result::Result<T, TsError>;

use clap::Parser;
use remux::{RemuxFormat, SubFormat};
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "MPEG capture remuxer",
    long_about = "Remux an MPEG-2 transport stream capture into a transport stream or\n\
                  program stream recording.\n\
                  \n\
                  The input is fed to the remuxer in chunks the way a capture device would\n\
                  deliver it. Recordings can be split into several files while running;\n\
                  each split lands on a keyframe when one can be found."
)]
pub struct CliArgs {
    /// Capture file to remux, or "-" for standard input
    #[arg(required = true, help = "Path to the capture file, or \"-\" to read standard input")]
    pub input: String,

    /// First output file
    #[arg(short, long, help = "Path of the first recording file")]
    pub output: PathBuf,

    /// Output container
    #[arg(
        short,
        long,
        value_enum,
        default_value = "ts",
        help = "Output container. H.264 and HEVC captures are always written as ts"
    )]
    pub format: RemuxFormat,

    /// Size of the chunks handed to the remuxer
    #[arg(
        short,
        long,
        default_value = "64KB",
        help = "Size of each read from the input with optional unit (B, KB, MB)"
    )]
    pub chunk_size: String,

    /// Ring recording size
    #[arg(
        long,
        default_value = "0",
        help = "Wrap the recording file after this many bytes (B, KB, MB, GB). Use 0 to disable"
    )]
    pub ring_size: String,

    /// Start a new file after this many bytes
    #[arg(
        short = 's',
        long,
        default_value = "0",
        help = "Switch to a new file once the current one holds this many bytes (B, KB, MB, GB). Use 0 to disable"
    )]
    pub split_size: String,

    /// Token passed along with every switch
    #[arg(long, default_value = "0", help = "Token authorizing switched files")]
    pub switch_token: u32,

    /// Program number to record
    #[arg(short, long, help = "Record this program number instead of the first program found")]
    pub program: Option<u16>,

    /// Channel index to record
    #[arg(long, conflicts_with = "program", help = "Record the n-th program of the PAT (1-based)")]
    pub channel: Option<u16>,

    /// Treat the input as a TV tuner capture
    #[arg(long, help = "Mark the input as a broadcast TV capture")]
    pub tv: bool,

    /// Delivery system of a TV capture
    #[arg(long, value_enum, default_value = "unknown", help = "Delivery system of the TV capture")]
    pub sub_format: SubFormat,

    /// Seconds to wait for a keyframe before forcing a switch
    #[arg(long, default_value = "30", help = "Seconds to wait for a keyframe before forcing a switch")]
    pub switch_timeout: u64,

    /// Log file path
    #[arg(long, default_value = "tsremux.log", help = "File receiving a copy of the log")]
    pub log_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

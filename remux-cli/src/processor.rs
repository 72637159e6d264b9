use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use remux::{
    CaptureKind, FileDestination, FileOpener, MpegEngineFactory, RemuxConfig, RemuxSession,
    SessionHandle, TuneDescriptor,
};
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::error::AppError;
use crate::utils::{format_bytes, parse_size};

const SPLIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Settings resolved from the command line
#[derive(Debug)]
pub struct RemuxJob {
    pub input: String,
    pub output: PathBuf,
    pub chunk_size: usize,
    pub ring_size: u64,
    pub split_size: u64,
    pub switch_token: u32,
    pub tune: TuneDescriptor,
    pub capture: CaptureKind,
    pub args: CliArgs,
}

impl RemuxJob {
    pub fn from_args(args: CliArgs) -> Result<Self, AppError> {
        let chunk_size = usize::try_from(parse_size(&args.chunk_size)?)
            .map_err(|_| AppError::InvalidInput("Chunk size is too large".to_string()))?;
        if chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "Chunk size must be greater than zero".to_string(),
            ));
        }

        let tune = match (args.program, args.channel) {
            (Some(program), _) => TuneDescriptor::program(program),
            (None, Some(channel)) => TuneDescriptor::channel(channel),
            (None, None) => TuneDescriptor::auto(),
        };
        let capture = if args.tv {
            CaptureKind::Tv
        } else {
            CaptureKind::Other
        };

        Ok(Self {
            input: args.input.clone(),
            output: args.output.clone(),
            chunk_size,
            ring_size: parse_size(&args.ring_size)?,
            split_size: parse_size(&args.split_size)?,
            switch_token: args.switch_token,
            tune,
            capture,
            args,
        })
    }
}

/// Totals reported once the input is exhausted
#[derive(Debug, Default)]
pub struct RemuxSummary {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub dropped: u64,
    pub files: Vec<PathBuf>,
}

/// Feed the whole input through a session, splitting the recording on the way
pub fn process(job: &RemuxJob) -> Result<RemuxSummary, AppError> {
    let config = RemuxConfig::builder()
        .switch_wait_timeout(Duration::from_secs(job.args.switch_timeout))
        .build();
    info!("{config}");

    let mut reader = open_input(&job.input)?;
    let mut session = RemuxSession::builder(
        Box::new(FileDestination::create(&job.output)?),
        Arc::new(MpegEngineFactory),
        Arc::new(FileOpener::new()),
    )
    .output_format(job.args.format)
    .capture_kind(job.capture)
    .sub_format(job.args.sub_format)
    .tune(job.tune)
    .config(config)
    .build()?;

    if job.ring_size > 0 {
        info!("Ring recording enabled, wrapping after {}", format_bytes(job.ring_size));
        session.set_buffer_limit(job.ring_size);
    }

    let splitter = (job.split_size > 0).then(|| {
        let handle = session.handle();
        let output = job.output.clone();
        let (split_size, token) = (job.split_size, job.switch_token);
        thread::spawn(move || run_splitter(handle, output, split_size, token))
    });

    let started = Instant::now();
    let mut buffer = vec![0u8; job.chunk_size];
    let mut bytes_read = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                session.close();
                return Err(e.into());
            }
        };
        bytes_read += read as u64;
        if session.feed(&buffer[..read]).is_none() {
            error!("Remux session stopped accepting data after {}", format_bytes(bytes_read));
            break;
        }
    }

    if !session.is_initialized() {
        warn!("No MPEG program was detected in {}", job.input);
    } else if let Some(format) = session.container_format() {
        info!(output = %session.output_format(), "Recorded {format}");
    }
    let stats = session.detection_stats();
    debug!(?stats, "Detection statistics");
    session.close();

    let mut files = vec![job.output.clone()];
    if let Some(splitter) = splitter {
        match splitter.join() {
            Ok(split_files) => files.extend(split_files),
            Err(_) => error!("Split thread panicked"),
        }
    }

    info!(
        elapsed = ?started.elapsed(),
        "Remux finished: read {}, wrote {}",
        format_bytes(bytes_read),
        format_bytes(session.total_bytes_written())
    );
    Ok(RemuxSummary {
        bytes_read,
        bytes_written: session.total_bytes_written(),
        dropped: session.dropped_bytes(),
        files,
    })
}

fn open_input(input: &str) -> Result<Box<dyn Read>, AppError> {
    if input == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let path = Path::new(input);
    if !path.is_file() {
        return Err(AppError::InvalidInput(format!(
            "Input file does not exist: {input}"
        )));
    }
    Ok(Box::new(BufReader::new(File::open(path)?)))
}

/// Switch to the next numbered file every `split_size` bytes until the
/// session closes; returns the files switched to
fn run_splitter(
    handle: SessionHandle,
    output: PathBuf,
    split_size: u64,
    token: u32,
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    loop {
        while handle.file_size() < split_size {
            if handle.is_closed() {
                return files;
            }
            thread::sleep(SPLIT_POLL_INTERVAL);
        }

        let next = numbered_path(&output, files.len() + 1);
        if !handle.start_switch(&next.to_string_lossy(), token) {
            return files;
        }
        if handle.wait_is_switched() {
            info!("Recording continues in {}", next.display());
            files.push(next);
        } else {
            warn!("Switch to {} did not complete", next.display());
            return files;
        }
    }
}

/// `out/rec.ts` -> `out/rec-2.ts`
fn numbered_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(extension) => format!("{stem}-{index}.{}", extension.to_string_lossy()),
        None => format!("{stem}-{index}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use remux::test_utils::TsStreamBuilder;
    use remux::{RemuxFormat, StreamType};
    use tempfile::TempDir;

    fn job(args: &[&str]) -> RemuxJob {
        let mut argv = vec!["tsremux"];
        argv.extend_from_slice(args);
        RemuxJob::from_args(CliArgs::parse_from(argv)).unwrap()
    }

    #[test]
    fn test_numbered_path() {
        assert_eq!(
            numbered_path(Path::new("out/rec.ts"), 2),
            PathBuf::from("out/rec-2.ts")
        );
        assert_eq!(numbered_path(Path::new("capture"), 1), PathBuf::from("capture-1"));
    }

    #[test]
    fn test_job_from_args() {
        let job = job(&["in.ts", "-o", "out.mpg", "-f", "ps", "--program", "3", "-c", "1316"]);
        assert_eq!(job.args.format, RemuxFormat::Ps);
        assert_eq!(job.tune, TuneDescriptor::program(3));
        assert_eq!(job.chunk_size, 1316);
        assert_eq!(job.split_size, 0);
        assert_eq!(job.capture, CaptureKind::Other);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let args = CliArgs::parse_from(["tsremux", "in.ts", "-o", "out.ts", "-c", "0"]);
        assert!(matches!(
            RemuxJob::from_args(args),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_process_copies_transport_stream() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("capture.ts");
        let output = dir.path().join("out").join("rec.ts");
        let stream = TsStreamBuilder::new()
            .psi(StreamType::H264)
            .h264_intra_packet()
            .video_packets(600)
            .build();
        std::fs::write(&input, &stream).unwrap();

        let job = job(&[
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-c",
            "4KB",
        ]);
        let summary = process(&job).unwrap();

        assert_eq!(summary.bytes_read, stream.len() as u64);
        assert_eq!(summary.bytes_written, stream.len() as u64);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.files, vec![output.clone()]);
        assert_eq!(std::fs::read(&output).unwrap(), stream);
    }

    #[test]
    fn test_missing_input_is_reported() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("rec.ts");
        let job = job(&["does-not-exist.ts", "-o", output.to_str().unwrap()]);
        assert!(matches!(process(&job), Err(AppError::InvalidInput(_))));
    }
}

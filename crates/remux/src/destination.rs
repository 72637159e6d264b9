//! Recording destinations.
//!
//! A destination is where the session writes remuxed bytes. The capture
//! manager hands the session its first destination and an opener it can use
//! to open the next one by name when a switch completes.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

/// Writable recording target that can rewind for ring recordings
pub trait Destination: Write + Send {
    /// Identity of the destination, used as the registry key
    fn path(&self) -> &Path;

    /// Move the write position back to the start
    fn rewind(&mut self) -> io::Result<()>;

    /// Flush and release the destination
    fn close(&mut self) -> io::Result<()>;
}

/// Opens the next destination of a switch
pub trait DestinationOpener: Send + Sync {
    /// Open `name`; `token` authorizes the new file with the capture manager
    fn open(&self, name: &str, token: u32) -> io::Result<Box<dyn Destination>>;
}

/// Destination backed by a local file
#[derive(Debug)]
pub struct FileDestination {
    path: PathBuf,
    file: File,
}

impl FileDestination {
    /// Create or truncate the file at `path`
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!("Opened destination {}", path.display());
        Ok(Self { path, file })
    }
}

impl Write for FileDestination {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Destination for FileDestination {
    fn path(&self) -> &Path {
        &self.path
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }
}

/// Opens [`FileDestination`]s, optionally relative to a base directory and
/// restricted to registered tokens.
#[derive(Debug, Default)]
pub struct FileOpener {
    base_dir: Option<PathBuf>,
    /// `None` accepts any token
    tokens: Option<Mutex<HashSet<u32>>>,
}

impl FileOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative names against `base_dir`
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Only open files whose token was registered through [`authorize`](Self::authorize)
    pub fn require_tokens(mut self) -> Self {
        self.tokens = Some(Mutex::new(HashSet::new()));
        self
    }

    pub fn authorize(&self, token: u32) {
        if let Some(tokens) = &self.tokens {
            tokens.lock().insert(token);
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl DestinationOpener for FileOpener {
    fn open(&self, name: &str, token: u32) -> io::Result<Box<dyn Destination>> {
        let authorized = self
            .tokens
            .as_ref()
            .is_none_or(|tokens| tokens.lock().contains(&token));
        if !authorized {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("token {token} is not authorized to open {name}"),
            ));
        }
        let destination = FileDestination::create(self.resolve(name))?;
        Ok(Box::new(destination))
    }
}

//! Live sessions keyed by destination identity.
//!
//! The capture manager owns one registry and hands it to every session it
//! creates. Requests that only know a file name (switching, size queries) use
//! it to find the session recording into that file. Sessions keep their entry
//! current across switches and remove it when they close.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::session::SessionHandle;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<PathBuf, SessionHandle>>,
}

// Sessions lock their state before the registry, so only the keys are shown
impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("paths", &self.paths())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: PathBuf, handle: SessionHandle) {
        debug!("Registering session for {}", path.display());
        if let Some(previous) = self.sessions.lock().insert(path.clone(), handle) {
            if !previous.is_closed() {
                warn!("Replaced a live session registered for {}", path.display());
            }
        }
    }

    /// Session currently recording into `path`
    pub fn get(&self, path: &Path) -> Option<SessionHandle> {
        self.sessions.lock().get(path).cloned()
    }

    /// Remove the entry for `path` if it belongs to `handle`'s session
    pub fn unregister(&self, path: &Path, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(path) {
            Some(registered) if registered.same_session(handle) => {
                sessions.remove(path);
                debug!("Unregistered session for {}", path.display());
                true
            }
            _ => false,
        }
    }

    /// Move the entry of `from` to `to`; no-op when `from` is not registered
    pub fn rename(&self, from: &Path, to: PathBuf) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(handle) = sessions.remove(from) else {
            return false;
        };
        debug!("Session moved from {} to {}", from.display(), to.display());
        sessions.insert(to, handle);
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Ask the session recording into `path` to switch to `name`
    pub fn start_switch(&self, path: &Path, name: &str, token: u32) -> bool {
        match self.get(path) {
            Some(handle) => handle.start_switch(name, token),
            None => {
                warn!("No live session records into {}", path.display());
                false
            }
        }
    }

    /// Bytes written to `path` by the session recording into it
    pub fn file_size(&self, path: &Path) -> Option<u64> {
        self.get(path).map(|handle| handle.file_size())
    }
}

//! Session persistence.
//!
//! The keepalive is written against the `SessionStore` trait so tests can
//! swap in the in-memory store. `FileSessionStore` keeps the session under
//! the user's home directory, guarded by an advisory file lock so two CLI
//! processes cannot interleave a save and a clear, and written atomically
//! via a temp file rename.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::SessionError;
use crate::session::Session;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Where the current session lives between process runs.
pub trait SessionStore: Send + Sync {
    /// Returns the stored session, if any. Unreadable or corrupted state
    /// reads as "no session".
    fn load(&self) -> Option<Session>;
    fn save(&self, session: &Session) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// Volatile store for tests and for `--no-persist` runs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let mut slot = self.session.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut slot = self.session.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
        Ok(())
    }
}

/// File-backed store at `~/.salesdesk/session.json`.
pub struct FileSessionStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileSessionStore {
    pub fn new() -> Self {
        Self::at_path(Self::session_file_path())
    }

    /// Store rooted at an explicit file, mainly for tests.
    pub fn at_path(path: PathBuf) -> Self {
        let lock_path = path.with_extension("json.lock");
        Self { path, lock_path }
    }

    fn session_file_path() -> PathBuf {
        let home = std::env::var("SALESDESK_SESSION_DIR")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".salesdesk")))
            .unwrap_or_else(|_| PathBuf::from("/tmp/.salesdesk"));
        home.join("session.json")
    }

    fn ensure_dir(&self) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SessionError::persistence(
                    "create_dir",
                    std::io::Error::new(
                        e.kind(),
                        format!("failed to create directory '{}': {}", parent.display(), e),
                    ),
                )
            })?;
        }
        Ok(())
    }

    fn acquire_lock(&self) -> Result<File, SessionError> {
        const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

        self.ensure_dir()?;
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| SessionError::persistence("open_lock", e))?;

        #[cfg(unix)]
        {
            let fd = lock_file.as_raw_fd();
            let start = Instant::now();
            let mut backoff = Duration::from_millis(1);

            loop {
                let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
                if result == 0 {
                    break;
                }

                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EWOULDBLOCK)
                    && err.raw_os_error() != Some(libc::EAGAIN)
                {
                    return Err(SessionError::persistence("flock", err));
                }

                if start.elapsed() > LOCK_TIMEOUT {
                    return Err(SessionError::Persistence {
                        operation: "acquire_lock".to_string(),
                        reason: "lock acquisition timed out after 5 seconds".to_string(),
                    });
                }

                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_millis(100));
            }
        }

        Ok(lock_file)
    }

    fn load_unlocked(&self) -> Option<Session> {
        if !self.path.exists() {
            return None;
        }

        match File::open(&self.path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader(reader) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!(
                            path = %self.path.display(),
                            error = %e,
                            "session file corrupted, treating as logged out"
                        );
                        None
                    }
                }
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to open session file"
                );
                None
            }
        }
    }

    fn save_unlocked(&self, session: &Session) -> Result<(), SessionError> {
        let temp_path = self.path.with_extension("json.tmp");

        let file =
            File::create(&temp_path).map_err(|e| SessionError::persistence("create_temp", e))?;

        // Tokens live in this file; keep it private to the user.
        #[cfg(unix)]
        {
            let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
        }

        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, session).map_err(|e| SessionError::Persistence {
            operation: "write_json".to_string(),
            reason: format!("failed to write '{}': {}", temp_path.display(), e),
        })?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| SessionError::persistence("rename", e))?;

        Ok(())
    }

    fn remove_unlocked(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::persistence("remove", e)),
        }
    }
}

impl Default for FileSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<Session> {
        match self.acquire_lock() {
            Ok(_lock) => self.load_unlocked(),
            Err(e) => {
                warn!(error = %e, "failed to acquire lock for loading session");
                self.load_unlocked()
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let _lock = self.acquire_lock()?;
        self.save_unlocked(session)
    }

    fn clear(&self) -> Result<(), SessionError> {
        let _lock = self.acquire_lock()?;
        self.remove_unlocked()
    }
}

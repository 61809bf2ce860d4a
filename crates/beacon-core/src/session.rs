//! Append-only session files.
//!
//! Each monitoring activation owns exactly one [`Session`]: a CSV-like file
//! named after the session start time, with the header written once at
//! open. Rows go straight to the file as they are appended, so closing a
//! session never loses a row that [`Session::append`] already reported as
//! written, and a row that failed is never replayed by a later append.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::{session_file_stem, LogRecord, HEADER};

/// Upper bound on ` (n)` suffixes tried when a file name is taken.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Errors raised by the session log.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The log directory or the session file could not be created.
    #[error("Log storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        /// Path that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A row could not be written.
    #[error("Failed to write to {}: {source}", path.display())]
    WriteFailure {
        /// Session file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The session was already closed.
    #[error("Session {} is closed", path.display())]
    Closed {
        /// Session file.
        path: PathBuf,
    },
}

impl SessionError {
    /// Returns `true` if the session could not be opened at all.
    #[must_use]
    pub const fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Factory for session files inside one logging directory.
#[derive(Debug, Clone)]
pub struct SessionLog {
    directory: PathBuf,
}

impl SessionLog {
    /// Create a session log writing into `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Directory holding the session files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Open a new session started at `started_at`.
    ///
    /// Creates the directory if needed, picks a file name that no earlier
    /// session uses and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StorageUnavailable`] if the directory or the
    /// file cannot be created, or the header cannot be written.
    pub fn open<Tz>(&self, started_at: &DateTime<Tz>) -> SessionResult<Session>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        std::fs::create_dir_all(&self.directory).map_err(|source| {
            SessionError::StorageUnavailable {
                path: self.directory.clone(),
                source,
            }
        })?;

        let stem = session_file_stem(started_at);
        let (path, mut file) = self.create_unique(&stem)?;

        let header = format!("{HEADER}\n");
        file.write_all(header.as_bytes())
            .map_err(|source| SessionError::StorageUnavailable {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "Opened session log");

        Ok(Session {
            path,
            file: Some(file),
            len: header.len() as u64,
            records_written: 0,
        })
    }

    fn create_unique(&self, stem: &str) -> SessionResult<(PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.csv")
            } else {
                format!("{stem} ({attempt}).csv")
            };
            let path = self.directory.join(name);

            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Session file exists, trying next name");
                }
                Err(source) => return Err(SessionError::StorageUnavailable { path, source }),
            }
        }

        Err(SessionError::StorageUnavailable {
            path: self.directory.join(format!("{stem}.csv")),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{MAX_NAME_ATTEMPTS} session files already exist for this minute"),
            ),
        })
    }
}

/// One open session file.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    file: Option<File>,
    /// Bytes of complete rows on disk, header included.
    len: u64,
    records_written: u64,
}

impl Session {
    /// Path of the session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended so far, header excluded.
    #[must_use]
    pub const fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Whether the session still accepts rows.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append one row.
    ///
    /// The row is written in a single unbuffered write. If that fails, the
    /// file is cut back to the end of the last complete row and nothing of
    /// the failed row is kept for later appends.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WriteFailure`] on I/O errors and
    /// [`SessionError::Closed`] after [`close`](Self::close).
    pub fn append(&mut self, record: &LogRecord) -> SessionResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(SessionError::Closed {
                path: self.path.clone(),
            });
        };

        let line = format!("{record}\n");
        if let Err(source) = file.write_all(line.as_bytes()) {
            if let Err(e) = file.set_len(self.len) {
                debug!(path = %self.path.display(), error = %e, "Could not trim partial row");
            }
            return Err(SessionError::WriteFailure {
                path: self.path.clone(),
                source,
            });
        }

        self.len += line.len() as u64;
        self.records_written += 1;
        Ok(())
    }

    /// Sync and release the file. Safe to call any number of times.
    pub fn close(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        if let Err(e) = file.sync_data() {
            warn!(path = %self.path.display(), error = %e, "Failed to sync session log on close");
        }
        info!(
            path = %self.path.display(),
            records = self.records_written,
            "Closed session log"
        );
    }
}

#[cfg(test)]
impl Session {
    /// Swap the underlying file, returning the previous one.
    pub(crate) fn replace_file(&mut self, file: File) -> Option<File> {
        self.file.replace(file)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

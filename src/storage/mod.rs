//! Flat-directory artifact storage.
//!
//! Two directories hold everything the service knows about: incoming uploads
//! and their reversed counterparts. Names are generated, unique per creation,
//! and the filesystem's own name/mtime metadata is the only persisted state.
//! Deletion is idempotent: a missing file is a success for every cleanup
//! trigger, since another trigger may have reclaimed it first.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::common::{MAX_DELETE_ATTEMPTS, REVERSED_ROUTE, UPLOADS_ROUTE};
use crate::config::ServiceConfig;
use crate::utils::{now_millis, sanitize_stem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Incoming,
    Derived,
}

impl ArtifactKind {
    pub fn route_prefix(self) -> &'static str {
        match self {
            ArtifactKind::Incoming => UPLOADS_ROUTE,
            ArtifactKind::Derived => REVERSED_ROUTE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Incoming => "original",
            ArtifactKind::Derived => "reversed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    uploads_dir: PathBuf,
    reversed_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(uploads_dir: impl Into<PathBuf>, reversed_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            reversed_dir: reversed_dir.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.uploads_dir, &config.reversed_dir)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.uploads_dir, &self.reversed_dir] {
            fs::create_dir_all(dir)
                .context(format!("failed to create artifact directory {:?}", dir))?;
        }
        Ok(())
    }

    pub fn dir(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Incoming => &self.uploads_dir,
            ArtifactKind::Derived => &self.reversed_dir,
        }
    }

    /// Identity for an uploaded file: sanitized stem, creation timestamp, and
    /// a random suffix closing the same-millisecond collision window.
    pub fn incoming_identity(stem: &str, ext: &str) -> String {
        format!(
            "{}-original-{}-{}.{}",
            sanitize_stem(stem),
            now_millis(),
            short_suffix(),
            ext
        )
    }

    /// Identity for a reverse-transcode output, allocated before the job runs.
    pub fn derived_identity() -> String {
        format!("reversed-{}-{}.mp4", now_millis(), short_suffix())
    }

    pub fn public_url(&self, kind: ArtifactKind, identity: &str) -> String {
        format!("{}/{}", kind.route_prefix(), identity)
    }

    /// Reduces a client-echoed locator (`/uploads/a.mp4`, a full URL, or a
    /// bare name) to the final path component. Anything without one is
    /// rejected, so echoed identities can never reach outside the store.
    pub fn identity_from_url(url: &str) -> Option<String> {
        Path::new(url.trim())
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
    }

    /// Deletes one artifact by identity. Missing files are not an error;
    /// transient failures are retried with backoff.
    pub fn delete(&self, kind: ArtifactKind, identity: &str) -> Result<()> {
        let Some(name) = Path::new(identity).file_name() else {
            return Ok(());
        };
        remove_file_with_retry(&self.dir(kind).join(name))
    }

    /// Age-sweep pass: removes files at rest longer than `max_age` from both
    /// directories. Returns the number removed.
    pub fn remove_older_than(&self, max_age: Duration) -> usize {
        self.remove_where(|age| age > max_age)
    }

    /// Full-sweep pass: removes every file at rest for at least `min_age`.
    /// `Duration::ZERO` makes the pass unconditional.
    pub fn remove_all(&self, min_age: Duration) -> usize {
        self.remove_where(|age| age >= min_age)
    }

    fn remove_where(&self, should_remove: impl Fn(Duration) -> bool) -> usize {
        let mut removed = 0;
        for dir in [&self.uploads_dir, &self.reversed_dir] {
            removed += scan_and_remove(dir, &should_remove);
        }
        removed
    }
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn remove_file_with_retry(path: &Path) -> Result<()> {
    let mut attempts = 0u64;
    loop {
        attempts += 1;
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Deleted file: {:?}", path);
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // Another trigger got there first; cleanup is idempotent.
                return Ok(());
            }
            Err(err) if attempts < MAX_DELETE_ATTEMPTS => {
                warn!(
                    "Failed deleting {:?} (attempt {}), retrying in {}ms: {}",
                    path,
                    attempts,
                    100 * attempts,
                    err
                );
                thread::sleep(Duration::from_millis(100 * attempts));
            }
            Err(err) => {
                return Err(err).context(format!(
                    "failed deleting {:?} after {} attempts",
                    path, attempts
                ));
            }
        }
    }
}

/// One scan-and-delete pass over a flat directory. Every file is attempted
/// independently; failures are logged and never abort the scan.
fn scan_and_remove(dir: &Path, should_remove: impl Fn(Duration) -> bool) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error reading {:?}: {}", dir, err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let age = match file_age(entry.path()) {
            Ok(age) => age,
            Err(err) => {
                warn!("Error reading metadata of {:?}: {:#}", entry.path(), err);
                continue;
            }
        };
        if !should_remove(age) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                info!("Deleted old file: {:?}", entry.path());
                removed += 1;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("Error deleting {:?}: {}", entry.path(), err),
        }
    }
    removed
}

fn file_age(path: &Path) -> Result<Duration> {
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .context(format!("failed to stat {:?}", path))?;
    // A file stamped in the future counts as age zero.
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default())
}

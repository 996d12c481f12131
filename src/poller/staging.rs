/*!
Stage-then-swap commit of an output directory.

Snapshots are written into a scratch directory created next to the permanent one,
on the same filesystem. On Linux the commit is a single `renameat2` exchange of
the two directories, after which the scratch path holds the old output and is
removed. Readers see either the old or the new directory, never neither.

Where the exchange is unavailable (other platforms, filesystems without
`RENAME_EXCHANGE`), commit falls back to two renames:

1. permanent → `.<name>.previous`
2. scratch → permanent

In that mode a crash between 1 and 2 leaves only `.previous` on disk, with no
permanent directory, until the next run renames it back before staging anything.
*/

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("{0} has no usable directory name")]
    InvalidTarget(PathBuf),
    #[error("{0} exists and is not a directory")]
    NotADirectory(PathBuf),
    #[error("could not {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> StagingError + 'a {
    move |source| StagingError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Deterministic file name for a host's snapshot.
///
/// Bytes outside `[A-Za-z0-9._-]` are percent-encoded, `%` itself included, so
/// two different hostnames never map to the same file.
pub fn snapshot_file_name(host: &str) -> String {
    let mut name = String::with_capacity(host.len() + 5);
    for byte in host.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' | b'_' => name.push(char::from(byte)),
            _ => {
                name.push('%');
                name.push_str(&hex::encode_upper([byte]));
            }
        }
    }
    name.push_str(".json");
    name
}

/// A scratch directory waiting to replace `target`.
///
/// Dropping the area without committing leaves both directories as they are.
#[derive(Debug)]
pub struct StagingArea {
    target: PathBuf,
    previous: PathBuf,
    scratch: PathBuf,
}

impl StagingArea {
    /// Recovers any interrupted swap, then creates a fresh scratch directory.
    pub fn create(target: &Path) -> Result<Self, StagingError> {
        let (parent, name) = split_target(target)?;
        let previous = parent.join(format!(".{name}.previous"));

        fs::create_dir_all(&parent).map_err(io_error("create", &parent))?;
        recover_interrupted(target, &previous)?;
        if target.exists() && !target.is_dir() {
            return Err(StagingError::NotADirectory(target.to_path_buf()));
        }

        let scratch = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging-"))
            .tempdir_in(&parent)
            .map_err(io_error("create scratch directory in", &parent))?
            .keep();
        debug!(scratch = %scratch.display(), "staging directory created");

        Ok(Self {
            target: target.to_path_buf(),
            previous,
            scratch,
        })
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Swaps the scratch directory in as the permanent one.
    pub fn commit(self) -> Result<PathBuf, StagingError> {
        set_readable(&self.scratch)?;

        if self.target.exists() {
            if !self.target.is_dir() {
                return Err(StagingError::NotADirectory(self.target));
            }
            let exchanged = exchange(&self.scratch, &self.target)
                .map_err(io_error("exchange staged output with", &self.target))?;
            if exchanged {
                // The scratch path now holds the old output
                if let Err(e) = fs::remove_dir_all(&self.scratch) {
                    warn!(path = %self.scratch.display(), error = %e, "could not remove previous output");
                }
                info!(path = %self.target.display(), "output committed");
                return Ok(self.target);
            }
            debug!(path = %self.target.display(), "directory exchange unsupported, committing with renames");
            if self.previous.exists() {
                fs::remove_dir_all(&self.previous).map_err(io_error("remove", &self.previous))?;
            }
            fs::rename(&self.target, &self.previous).map_err(io_error("move aside", &self.target))?;
        }

        if let Err(source) = fs::rename(&self.scratch, &self.target) {
            if self.previous.exists() {
                if let Err(e) = fs::rename(&self.previous, &self.target) {
                    warn!(path = %self.previous.display(), error = %e, "could not restore previous output");
                }
            }
            return Err(StagingError::Io {
                action: "move staged output to",
                path: self.target,
                source,
            });
        }

        if self.previous.exists() {
            // A leftover copy is cleaned up by the next run
            if let Err(e) = fs::remove_dir_all(&self.previous) {
                warn!(path = %self.previous.display(), error = %e, "could not remove previous output");
            }
        }
        info!(path = %self.target.display(), "output committed");
        Ok(self.target)
    }
}

/// Atomically swaps two existing directories. `Ok(false)` means the platform or
/// filesystem cannot do it and nothing was changed.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn exchange(a: &Path, b: &Path) -> io::Result<bool> {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    let a = CString::new(a.as_os_str().as_bytes())?;
    let b = CString::new(b.as_os_str().as_bytes())?;
    // SAFETY: both pointers are NUL-terminated strings that outlive the call.
    let rc = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            a.as_ptr(),
            libc::AT_FDCWD,
            b.as_ptr(),
            libc::RENAME_EXCHANGE,
        )
    };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EINVAL | libc::ENOSYS | libc::EOPNOTSUPP) => Ok(false),
        _ => Err(err),
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn exchange(_a: &Path, _b: &Path) -> io::Result<bool> {
    Ok(false)
}

fn split_target(target: &Path) -> Result<(PathBuf, String), StagingError> {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StagingError::InvalidTarget(target.to_path_buf()))?;
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name.to_string()))
}

/// Finishes a swap a previous run did not complete.
fn recover_interrupted(target: &Path, previous: &Path) -> Result<(), StagingError> {
    if !previous.exists() {
        return Ok(());
    }
    if target.exists() {
        // Crashed after the new output went in
        info!(path = %previous.display(), "removing leftover previous output");
        fs::remove_dir_all(previous).map_err(io_error("remove", previous))
    } else {
        warn!(path = %target.display(), "restoring output from interrupted commit");
        fs::rename(previous, target).map_err(io_error("restore", target))
    }
}

#[cfg(unix)]
fn set_readable(path: &Path) -> Result<(), StagingError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(io_error("set permissions on", path))
}

#[cfg(not(unix))]
fn set_readable(_path: &Path) -> Result<(), StagingError> {
    Ok(())
}

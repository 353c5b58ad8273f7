//! Single-instance guard built from a lock file and a pid file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use connd_config::RuntimePaths;

use super::PROCESS_TARGET;
use super::errors::GuardError;

/// Holds the daemon lock for the lifetime of the process.
///
/// The lock file is created exclusively. When one already exists, the pid it
/// records is probed: a live process means another daemon is running, a dead
/// one leaves stale files that are removed before retrying. Both files are
/// removed when the guard drops.
#[derive(Debug)]
pub struct InstanceGuard {
    paths: RuntimePaths,
    _lock: File,
    pid: u32,
}

impl InstanceGuard {
    /// Takes the lock and records the current process id.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::AlreadyRunning`] when a live daemon holds the
    /// lock, or another [`GuardError`] when the runtime files cannot be
    /// managed.
    pub fn acquire(paths: RuntimePaths) -> Result<Self, GuardError> {
        Self::acquire_for(paths, std::process::id())
    }

    pub(crate) fn acquire_for(paths: RuntimePaths, pid: u32) -> Result<Self, GuardError> {
        let lock = acquire_lock(&paths)?;
        write_pid(paths.pid_path(), pid)?;
        Ok(Self {
            paths,
            _lock: lock,
            pid,
        })
    }

    /// Runtime paths the guard owns.
    #[must_use]
    pub const fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    /// Pid written to the pid file.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        for (path, label) in [
            (self.paths.lock_path(), "lock"),
            (self.paths.pid_path(), "pid"),
        ] {
            match fs::remove_file(path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => warn!(
                    target: PROCESS_TARGET,
                    file = %path.display(),
                    error = %error,
                    "failed to remove {label} file"
                ),
                _ => {}
            }
        }
    }
}

fn private_file() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).mode(0o600);
    options
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, GuardError> {
    match private_file().create_new(true).open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path().display(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(GuardError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, GuardError> {
    if let Some(pid) = read_pid(paths.pid_path()) {
        if process_alive(pid)? {
            info!(target: PROCESS_TARGET, pid, "refusing to start: existing daemon alive");
            return Err(GuardError::AlreadyRunning { pid });
        }
        warn!(target: PROCESS_TARGET, pid, "previous daemon is gone; removing stale files");
    }
    remove_file(paths.lock_path())?;
    remove_file(paths.pid_path())?;
    match private_file().create_new(true).open(paths.lock_path()) {
        Ok(file) => Ok(file),
        Err(source) => Err(GuardError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn write_pid(path: &Path, pid: u32) -> Result<(), GuardError> {
    let pid_error = |source| GuardError::PidWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut file = private_file()
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(pid_error)?;
    writeln!(file, "{pid}").map_err(pid_error)?;
    file.sync_all().map_err(pid_error)?;
    info!(target: PROCESS_TARGET, pid, file = %path.display(), "pid file written");
    Ok(())
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_file(path: &Path) -> Result<(), GuardError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GuardError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn process_alive(pid: u32) -> Result<bool, GuardError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(GuardError::CheckProcess { pid, source: errno }),
    }
}

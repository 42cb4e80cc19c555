//! Advisory lock around state-mutating commands

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

use crate::errors::OpsError;

/// How long a freshly created lock may stay without a PID before it counts as stale
const OWNER_READ_ATTEMPTS: u32 = 10;
const OWNER_READ_INTERVAL: Duration = Duration::from_millis(25);

/// Held for the duration of a mutating command; the lock file is removed on drop
#[derive(Debug)]
pub struct CommandLock {
    path: PathBuf,
}

impl CommandLock {
    /// Take the lock at `path`, replacing it if its owner is gone
    pub fn acquire(path: &Path) -> Result<Self, OpsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    debug!("Acquired lock {:?}", path);
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let owner = wait_for_owner(path);
                    match owner {
                        Some(pid) if process_alive(pid) => {
                            return Err(OpsError::Locked {
                                pid,
                                path: path.to_path_buf(),
                            });
                        }
                        _ => {
                            warn!("Removing stale lock {:?} (owner {:?})", path, owner);
                            std::fs::remove_file(path)?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(OpsError::Internal(format!(
            "Unable to acquire lock {}",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CommandLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {:?}: {}", self.path, e);
        }
    }
}

/// Read the owner PID, giving a concurrent acquirer time to write it.
///
/// The creator writes its PID right after `create_new` succeeds, so an empty
/// file usually means the lock is being taken at this moment.
fn wait_for_owner(path: &Path) -> Option<u32> {
    for attempt in 0..OWNER_READ_ATTEMPTS {
        match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => {
                if attempt + 1 < OWNER_READ_ATTEMPTS {
                    thread::sleep(OWNER_READ_INTERVAL);
                }
            }
            Ok(contents) => return contents.trim().parse().ok(),
            // Released while we were looking
            Err(_) => return None,
        }
    }
    read_owner(path)
}

fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

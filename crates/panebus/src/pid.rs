//! PID file management for the daemon process.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

/// Holds the PID file for the lifetime of the daemon. The file is removed
/// on drop, covering every exit path including bind failures.
pub struct PidGuard {
    path: PathBuf,
}

impl PidGuard {
    /// Write the current process id to `path`.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating pid directory {}", parent.display()))?;
        }
        fs::write(path, std::process::id().to_string())
            .with_context(|| format!("writing pid file {}", path.display()))?;
        debug!(path = %path.display(), "pid file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Read the recorded daemon pid, if any.
pub fn read_pid(path: &Path) -> Option<i32> {
    let raw = fs::read_to_string(path).ok()?;
    raw.trim().parse().ok()
}

/// Whether the recorded daemon process is alive. Cleans up stale files.
pub fn is_running(path: &Path) -> bool {
    let Some(pid) = read_pid(path) else {
        return false;
    };
    if process_alive(pid) {
        true
    } else {
        let _ = fs::remove_file(path);
        false
    }
}

/// Signal the recorded daemon to shut down. SIGTERM first, polling up to
/// two seconds, then SIGKILL. Returns false when no daemon was running.
pub fn stop_daemon(path: &Path) -> bool {
    let Some(pid) = read_pid(path) else {
        return false;
    };
    if !process_alive(pid) {
        let _ = fs::remove_file(path);
        return false;
    }

    signal(pid, libc::SIGTERM);
    for _ in 0..20 {
        std::thread::sleep(Duration::from_millis(100));
        if !process_alive(pid) {
            let _ = fs::remove_file(path);
            return true;
        }
    }

    signal(pid, libc::SIGKILL);
    std::thread::sleep(Duration::from_millis(200));
    let _ = fs::remove_file(path);
    true
}

fn process_alive(pid: i32) -> bool {
    // Signal 0 probes for existence without delivering anything. EPERM
    // still means the process exists.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn signal(pid: i32, sig: i32) {
    unsafe {
        libc::kill(pid, sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn guard_writes_and_removes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panebus.pid");

        {
            let _guard = PidGuard::acquire(&path).unwrap();
            assert_eq!(read_pid(&path), Some(std::process::id() as i32));
            // Our own process is alive.
            assert!(is_running(&path));
        }
        assert!(!path.exists());
    }

    #[test]
    fn stale_pid_file_is_cleaned_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panebus.pid");
        // A pid that can't exist: beyond any realistic pid_max.
        fs::write(&path, "999999999").unwrap();

        assert!(!is_running(&path));
        assert!(!path.exists());
    }

    #[test]
    fn stop_without_daemon_is_false() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panebus.pid");
        assert!(!stop_daemon(&path));

        fs::write(&path, "garbage").unwrap();
        assert!(!stop_daemon(&path));
    }
}

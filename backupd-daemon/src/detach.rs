//! Detach from the invoking terminal.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;

use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, fork, setsid, ForkResult, Pid};

use crate::error::{detach_err, DaemonError};

/// Which side of the fork we are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// The launching process; it should exit successfully right away.
    Parent { child: Pid },
    /// The daemon: new session, cleared umask, cwd at `/`.
    Daemon,
}

/// Fork, start a new session, clear the file-creation mask, and move to `/`.
///
/// Must be called before any runtime or extra thread is created.
pub fn daemonize() -> Result<Detached, DaemonError> {
    // SAFETY: the process is still single-threaded at this point, so the
    // child cannot inherit locks held by other threads.
    match unsafe { fork() }.map_err(|e| detach_err("fork", e))? {
        ForkResult::Parent { child } => return Ok(Detached::Parent { child }),
        ForkResult::Child => {}
    }

    umask(Mode::empty());
    setsid().map_err(|e| detach_err("setsid", e))?;
    chdir("/").map_err(|e| detach_err("chdir", e))?;
    Ok(Detached::Daemon)
}

/// Point stdin, stdout, and stderr at `/dev/null`.
///
/// Leaving descriptors 0-2 closed would let the next `open` reuse them.
pub fn redirect_standard_streams() -> Result<(), DaemonError> {
    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| detach_err("open /dev/null", e))?;

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: `null` is a valid open descriptor for the duration of the
        // call and `target` is one of the three standard descriptors.
        if unsafe { libc::dup2(null.as_raw_fd(), target) } < 0 {
            return Err(detach_err("dup2", std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

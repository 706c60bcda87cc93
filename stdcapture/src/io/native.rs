//! Descriptor-level save, retarget, and restore.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::unistd::{close, dup2, pipe};
use tracing::debug;

use crate::error::CaptureError;

/// Original destination of a native descriptor number.
///
/// Holds a close-on-exec duplicate of whatever the target pointed at before
/// the session, plus the target's own descriptor flags.
#[derive(Debug)]
pub struct SavedDescriptor {
    target: RawFd,
    saved: RawFd,
    flags: FdFlag,
}

impl SavedDescriptor {
    /// Duplicate `target` so it can be put back later.
    pub fn save(target: RawFd) -> Result<Self, CaptureError> {
        let flags = fcntl(target, FcntlArg::F_GETFD)
            .map(FdFlag::from_bits_truncate)
            .map_err(|err| CaptureError::resource(format!("inspect descriptor {target}"), err))?;
        let saved = fcntl(target, FcntlArg::F_DUPFD_CLOEXEC(0))
            .map_err(|err| CaptureError::resource(format!("duplicate descriptor {target}"), err))?;
        debug!(target, saved, "saved native descriptor");
        Ok(Self {
            target,
            saved,
            flags,
        })
    }

    pub fn target(&self) -> RawFd {
        self.target
    }

    /// Point the target descriptor number at `source`.
    pub fn retarget(&self, source: &OwnedFd) -> Result<(), CaptureError> {
        dup2(source.as_raw_fd(), self.target).map_err(|err| {
            CaptureError::resource(format!("redirect descriptor {}", self.target), err)
        })?;
        set_flags(self.target, self.flags)
            .map_err(|err| CaptureError::resource(format!("set flags on {}", self.target), err))
    }

    /// Put the original destination back and release the saved duplicate.
    ///
    /// The duplicate is closed even when restoring fails.
    pub fn restore(self) -> Result<(), CaptureError> {
        let restored = dup2(self.saved, self.target)
            .and_then(|_| set_flags(self.target, self.flags))
            .map_err(|err| CaptureError::restore(format!("restore descriptor {}", self.target), err));
        let closed = close(self.saved).map_err(|err| {
            CaptureError::restore(format!("close saved copy of {}", self.target), err)
        });
        restored.and(closed)
    }
}

/// Pipe for one capture group.
#[derive(Debug)]
pub struct GroupPipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

/// Create a pipe whose ends are both close-on-exec.
pub fn group_pipe() -> Result<GroupPipe, CaptureError> {
    let (read, write) = pipe().map_err(|err| CaptureError::resource("create pipe", err))?;
    for end in [&read, &write] {
        set_flags(end.as_raw_fd(), FdFlag::FD_CLOEXEC)
            .map_err(|err| CaptureError::resource("mark pipe close-on-exec", err))?;
    }
    Ok(GroupPipe { read, write })
}

fn set_flags(fd: RawFd, flags: FdFlag) -> nix::Result<()> {
    fcntl(fd, FcntlArg::F_SETFD(flags)).map(drop)
}

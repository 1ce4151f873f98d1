//! Fd plumbing behind a capture: a pipe whose write end replaces the
//! channel's descriptor, with the original saved for restore.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;

use super::Channel;
use crate::error::HarnessError;

pub(super) struct Redirection {
    channel: Channel,
    saved: OwnedFd,
    reader: File,
    restored: bool,
}

impl Redirection {
    pub(super) fn install(channel: Channel) -> Result<Self, HarnessError> {
        let target = channel.fd();

        // Push out anything sitting in the userspace stdout buffer so it
        // lands at the original destination, not in the capture.
        if channel == Channel::Stdout {
            let _ = std::io::stdout().flush();
        }

        let (read_end, write_end) =
            nix::unistd::pipe().map_err(|errno| redirect_err(channel, errno))?;
        set_nonblocking(read_end.as_fd()).map_err(|errno| redirect_err(channel, errno))?;

        // SAFETY: `target` is one of the process's standard descriptors and
        // stays open for the lifetime of the process.
        let saved_raw = unsafe { libc::dup(target) };
        if saved_raw < 0 {
            return Err(last_os_redirect_err(channel));
        }
        // SAFETY: dup() just returned this descriptor and nothing else owns it.
        let saved = unsafe { OwnedFd::from_raw_fd(saved_raw) };

        // SAFETY: both descriptors are valid; dup2 atomically repoints the
        // standard descriptor at the pipe's write end.
        if unsafe { libc::dup2(write_end.as_raw_fd(), target) } < 0 {
            return Err(last_os_redirect_err(channel));
        }
        // The standard descriptor now holds the long-lived write end;
        // dropping ours means restore later closes the last one, so the
        // reader can observe EOF.
        drop(write_end);

        Ok(Self {
            channel,
            saved,
            reader: File::from(read_end),
            restored: false,
        })
    }

    /// Drains whatever is currently readable from the pipe into `buf`
    /// without blocking.
    pub(super) fn read_available(&mut self, buf: &mut Vec<u8>) {
        let mut chunk = [0u8; 4096];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        if self.channel == Channel::Stdout {
            let _ = std::io::stdout().flush();
        }
        // SAFETY: `saved` is the duplicate taken at install time; dup2 puts
        // the original destination back even when the caller is unwinding.
        let _ = unsafe { libc::dup2(self.saved.as_raw_fd(), self.channel.fd()) };
    }
}

impl Drop for Redirection {
    fn drop(&mut self) {
        self.restore();
    }
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> nix::Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?;
    let new_flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(new_flags))?;
    Ok(())
}

fn redirect_err(channel: Channel, errno: nix::errno::Errno) -> HarnessError {
    HarnessError::Redirect {
        channel: channel.name(),
        source: std::io::Error::from(errno),
    }
}

fn last_os_redirect_err(channel: Channel) -> HarnessError {
    HarnessError::Redirect {
        channel: channel.name(),
        source: std::io::Error::last_os_error(),
    }
}

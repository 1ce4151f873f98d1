//! Scoped redirection of the process's standard text channels.
//!
//! Redirection is a genuinely process-wide side effect: every writer to the
//! channel is captured for the scope's duration, including code the harness
//! does not control. A registry hands out at most one capture per channel;
//! a second `acquire` fails with `AlreadyRedirected`.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::HarnessError;

#[cfg(unix)]
mod redirect;

/// A process-wide text output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
        }
    }

    #[cfg(unix)]
    fn fd(self) -> std::os::fd::RawFd {
        match self {
            Channel::Stdout => 1,
            Channel::Stderr => 2,
        }
    }

    fn index(self) -> usize {
        match self {
            Channel::Stdout => 0,
            Channel::Stderr => 1,
        }
    }
}

mod registry {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::Channel;
    use crate::error::HarnessError;

    static CLAIMED: [AtomicBool; 2] = [AtomicBool::new(false), AtomicBool::new(false)];

    pub(super) fn claim(channel: Channel) -> Result<(), HarnessError> {
        if CLAIMED[channel.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HarnessError::AlreadyRedirected {
                channel: channel.name(),
            });
        }
        Ok(())
    }

    pub(super) fn unclaim(channel: Channel) {
        CLAIMED[channel.index()].store(false, Ordering::Release);
    }
}

struct CaptureState {
    buf: Vec<u8>,
    active: bool,
    #[cfg(unix)]
    redirect: Option<redirect::Redirection>,
}

/// One captured channel: buffers everything written to it while the capture
/// is alive, and restores the original destination on release (or Drop).
pub struct StreamCapture {
    channel: Channel,
    inner: Mutex<CaptureState>,
}

impl StreamCapture {
    /// Takes exclusive redirection ownership of `channel`.
    pub fn acquire(channel: Channel) -> Result<Arc<Self>, HarnessError> {
        registry::claim(channel)?;

        #[cfg(unix)]
        {
            let redirect = match redirect::Redirection::install(channel) {
                Ok(r) => r,
                Err(err) => {
                    registry::unclaim(channel);
                    return Err(err);
                }
            };
            Ok(Arc::new(Self {
                channel,
                inner: Mutex::new(CaptureState {
                    buf: Vec::new(),
                    active: true,
                    redirect: Some(redirect),
                }),
            }))
        }

        #[cfg(not(unix))]
        {
            registry::unclaim(channel);
            Err(HarnessError::Redirect {
                channel: channel.name(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "stream redirection requires a unix host",
                ),
            })
        }
    }

    /// Moves any bytes currently sitting in the redirection pipe into the
    /// buffer. Non-blocking; safe to call at any rate.
    pub fn pump(&self) {
        #[cfg(unix)]
        {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            if let Some(redirect) = state.redirect.as_mut() {
                redirect.read_available(&mut state.buf);
            }
        }
    }

    /// Splits the buffered text on line boundaries and returns the complete
    /// lines in order. A trailing partial line stays in the buffer for the
    /// next drain. Pure: no I/O, never blocks.
    pub fn drain_lines(&self) -> Vec<String> {
        let mut state = self.lock_state();
        split_complete_lines(&mut state.buf)
    }

    /// Restores the original channel destination. Idempotent.
    pub fn release(&self) {
        let mut state = self.lock_state();
        if !state.active {
            return;
        }
        state.active = false;
        #[cfg(unix)]
        {
            state.redirect.take();
        }
        registry::unclaim(self.channel);
    }

    #[cfg(test)]
    pub(crate) fn ingest(&self, bytes: &[u8]) {
        self.lock_state().buf.extend_from_slice(bytes);
    }

    /// Buffer-only capture for tests: no registry claim, no redirection.
    #[cfg(test)]
    pub(crate) fn detached(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            inner: Mutex::new(CaptureState {
                buf: Vec::new(),
                active: false,
                #[cfg(unix)]
                redirect: None,
            }),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        self.release();
    }
}

fn split_complete_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let complete: Vec<u8> = buf.drain(..=last_newline).collect();

    let mut parts: Vec<&[u8]> = complete.split(|&b| b == b'\n').collect();
    // The remainder after the final newline is always empty here.
    parts.pop();

    parts
        .into_iter()
        .map(|raw| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            String::from_utf8_lossy(raw).into_owned()
        })
        .collect()
}

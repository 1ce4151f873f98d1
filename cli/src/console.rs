//! Terminal mirror for captured suite output.
//!
//! The harness redirects both standard streams for the duration of the run,
//! so a plain `eprintln!` from the UI callback would feed the capture its
//! own lines. The mirror instead writes through a duplicate of the real
//! stderr taken before the redirection happens.

use std::sync::Arc;

use testwatch_core::LineCallback;

#[cfg(unix)]
pub fn mirror_target() -> Result<Arc<LineCallback>, anyhow::Error> {
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::{FromRawFd, OwnedFd};
    use std::sync::Mutex;

    use nix::libc;

    // SAFETY: fd 2 is the process's stderr, open for the process lifetime;
    // dup() hands back a new descriptor that we own exclusively.
    let fd = unsafe { libc::dup(2) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    // SAFETY: dup() just returned this descriptor and nothing else owns it.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    let terminal = Mutex::new(File::from(owned));

    Ok(Arc::new(move |line: &str| {
        if let Ok(mut term) = terminal.lock() {
            let _ = writeln!(term, "{line}");
        }
    }))
}

#[cfg(not(unix))]
pub fn mirror_target() -> Result<Arc<LineCallback>, anyhow::Error> {
    // Without fd redirection there is no feedback loop to avoid.
    Ok(Arc::new(|line: &str| eprintln!("{line}")))
}

//! SIGINT/SIGTERM handling.
//!
//! The manager converts terminal interrupts into a controlled unwind: the
//! handler only records the signal, blocking reads return with EINTR, and
//! the cleanup stack runs before the process exits nonzero. External
//! helpers share the process group, so a tty interrupt reaches the
//! launcher directly and its `wait` returns on its own.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Installs the SIGINT and SIGTERM handlers.
///
/// Deliberately installed without `SA_RESTART` so that blocking reads
/// (the control-pipe rendezvous in particular) are interrupted instead
/// of resumed.
pub fn install() {
    // SAFETY: sigaction with a handler that only stores to an atomic is
    // async-signal-safe; the sigaction struct is zero-initialised and
    // fully written before use.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_signal as extern "C" fn(libc::c_int) as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = 0;

        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
    }
}

/// Returns true once a SIGINT or SIGTERM has been received.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

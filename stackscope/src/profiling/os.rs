//! Thread identity of the calling thread

use crate::domain::Tid;

/// Kernel thread id of the calling thread
#[cfg(target_os = "linux")]
#[allow(unsafe_code, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn current_tid() -> Tid {
    // SAFETY: gettid takes no arguments and cannot fail
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    Tid(tid as u32)
}

/// Process-unique id of the calling thread, assigned on first use
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_tid() -> Tid {
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT: AtomicU32 = AtomicU32::new(1);
    thread_local! {
        static TID: u32 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    Tid(TID.with(|tid| *tid))
}

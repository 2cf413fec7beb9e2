//! Cooperative cancellation for collection rounds.
//!
//! A [`CancelToken`] is a shared flag checked by the collector between line
//! reads. On Unix, an [`InterruptGuard`] routes SIGINT into a token while a
//! round is in progress and restores the previous handler afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for the next round.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(unix)]
pub use unix::InterruptGuard;

#[cfg(unix)]
mod unix {
    use super::CancelToken;
    use std::io;
    use std::ptr;
    use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
    use std::sync::{Mutex, MutexGuard};

    /// Flag of the token currently receiving SIGINT, or null.
    static ACTIVE_FLAG: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

    /// Only one guard may be installed at a time.
    static GUARD_LOCK: Mutex<()> = Mutex::new(());

    extern "C" fn on_sigint(_signum: libc::c_int) {
        let flag = ACTIVE_FLAG.load(Ordering::SeqCst);
        if !flag.is_null() {
            // SAFETY: the pointer targets the flag of a token owned by the
            // installed guard, which clears it before releasing the token.
            unsafe { (*flag).store(true, Ordering::SeqCst) };
        }
    }

    /// Routes SIGINT into a [`CancelToken`] until dropped.
    ///
    /// The handler is installed without `SA_RESTART` so that a blocking read
    /// on the serial device returns `EINTR` and the collector can observe the
    /// cancellation immediately.
    pub struct InterruptGuard {
        token: CancelToken,
        previous: libc::sigaction,
        _lock: MutexGuard<'static, ()>,
    }

    impl InterruptGuard {
        pub fn install(token: CancelToken) -> io::Result<Self> {
            let lock = GUARD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            ACTIVE_FLAG.store(
                std::sync::Arc::as_ptr(&token.flag) as *mut AtomicBool,
                Ordering::SeqCst,
            );

            // SAFETY: sigaction structs are plain data; the handler only
            // touches an atomic.
            let previous = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
                action.sa_flags = 0;
                libc::sigemptyset(&mut action.sa_mask);

                let mut previous: libc::sigaction = std::mem::zeroed();
                if libc::sigaction(libc::SIGINT, &action, &mut previous) != 0 {
                    ACTIVE_FLAG.store(ptr::null_mut(), Ordering::SeqCst);
                    return Err(io::Error::last_os_error());
                }
                previous
            };

            Ok(InterruptGuard {
                token,
                previous,
                _lock: lock,
            })
        }

        pub fn token(&self) -> &CancelToken {
            &self.token
        }
    }

    impl Drop for InterruptGuard {
        fn drop(&mut self) {
            // SAFETY: restoring the disposition saved in `install`.
            unsafe {
                libc::sigaction(libc::SIGINT, &self.previous, ptr::null_mut());
            }
            ACTIVE_FLAG.store(ptr::null_mut(), Ordering::SeqCst);
        }
    }
}

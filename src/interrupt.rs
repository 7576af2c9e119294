//! Cooperative interruption of blocked threads.
//!
//! Every thread carries an interrupt flag. Another thread holding the
//! [`InterruptHandle`] of a thread may raise the flag, which also wakes the
//! thread if it is parked in one of the waits of this module. Blocking
//! operations observe the flag through [`check`], which clears it and reports
//! [`Interrupted`], so an interruption is consumed by exactly one operation.
//!
//! ```
//! use orderly::interrupt;
//! use std::sync::mpsc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let (tx, rx) = mpsc::channel();
//! let sleeper = thread::spawn(move || {
//!     tx.send(interrupt::current()).unwrap();
//!     interrupt::sleep(Duration::from_secs(60))
//! });
//!
//! rx.recv().unwrap().interrupt();
//! assert!(sleeper.join().unwrap().is_err());
//! ```

use crate::error::Interrupted;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

thread_local! {
    static FLAG: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Means of interrupting one particular thread.
#[derive(Clone, Debug)]
pub struct InterruptHandle {
    thread: Thread,
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Raises the interrupt flag of the thread and wakes it if it is parked.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.thread.unpark();
    }

    /// Whether the flag is raised, without clearing it.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }
}

/// Returns the handle for interrupting the calling thread.
pub fn current() -> InterruptHandle {
    InterruptHandle {
        thread: thread::current(),
        flag: FLAG.with(Arc::clone),
    }
}

/// Whether the calling thread has a pending interruption, without clearing it.
pub fn is_interrupted() -> bool {
    FLAG.with(|flag| flag.load(Ordering::SeqCst))
}

/// Consumes a pending interruption of the calling thread.
pub fn check() -> Result<(), Interrupted> {
    if FLAG.with(|flag| flag.swap(false, Ordering::SeqCst)) {
        Err(Interrupted)
    } else {
        Ok(())
    }
}

/// Sleeps for `duration` unless the calling thread gets interrupted first.
pub fn sleep(duration: Duration) -> Result<(), Interrupted> {
    wait_until(duration, duration, || false).map(drop)
}

/// Parks the calling thread until `ready` returns true, `timeout` elapses or
/// the thread is interrupted, re-evaluating `ready` at least every `poll`.
///
/// A zero `timeout` evaluates `ready` once without blocking.
pub(crate) fn wait_until(
    timeout: Duration,
    poll: Duration,
    mut ready: impl FnMut() -> bool,
) -> Result<bool, Interrupted> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        check()?;
        if ready() {
            return Ok(true);
        }
        let park = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                (deadline - now).min(poll)
            }
            None => poll,
        };
        // Spurious wakeups only cost an extra iteration.
        thread::park_timeout(park);
    }
}

use crate::error::Interrupted;
use crate::interrupt;
use std::convert::TryFrom;
use std::fmt::{self, Debug};
use std::thread::JoinHandle;
use std::time::Duration;

/// Smallest timeout handed to an operation once the shared deadline has
/// passed or the run was interrupted.
///
/// It is non-zero because many blocking primitives read a zero timeout as
/// "wait forever".
pub const MIN_TIMEOUT: Duration = Duration::from_nanos(1);

/// How often the thread-join adapter re-examines the joined thread.
const JOIN_POLL: Duration = Duration::from_millis(1);

/// Timed blocking operation, such as joining a thread or awaiting the
/// termination of a pool of workers.
pub trait Awaitable {
    /// Blocks for at most `timeout`.
    ///
    /// Returns whether the operation completed in time. Returns
    /// [`Interrupted`] if the calling thread was interrupted while waiting.
    fn await_timeout(&mut self, timeout: Duration) -> Result<bool, Interrupted>;
}

impl<A: Awaitable + ?Sized> Awaitable for Box<A> {
    fn await_timeout(&mut self, timeout: Duration) -> Result<bool, Interrupted> {
        (**self).await_timeout(timeout)
    }
}

/// Awaitable backed by a closure, made by [`from_fn`].
pub struct FromFn<F> {
    operation: F,
}

/// Makes an awaitable out of a closure receiving the timeout.
///
/// ```
/// use orderly::{awaitable, interrupt, Awaitable};
/// use std::time::Duration;
///
/// let mut nap = awaitable::from_fn(|timeout| {
///     interrupt::sleep(timeout)?;
///     Ok(true)
/// });
/// assert_eq!(nap.await_timeout(Duration::from_millis(1)), Ok(true));
/// ```
pub fn from_fn<F>(operation: F) -> FromFn<F>
where
    F: FnMut(Duration) -> Result<bool, Interrupted>,
{
    FromFn { operation }
}

impl<F> Awaitable for FromFn<F>
where
    F: FnMut(Duration) -> Result<bool, Interrupted>,
{
    fn await_timeout(&mut self, timeout: Duration) -> Result<bool, Interrupted> {
        (self.operation)(timeout)
    }
}

/// Awaitable of millisecond granularity, made by [`in_millis`].
pub struct InMillis<F> {
    operation: F,
}

/// Adapts an operation that takes its timeout in whole milliseconds.
///
/// A non-zero timeout shorter than 1ms is rounded up to 1ms, so that it does
/// not turn into a zero one. A zero timeout is passed on as zero.
///
/// ```
/// use orderly::{awaitable, Awaitable};
/// use std::time::Duration;
///
/// let mut seen = Vec::new();
/// let mut operation = awaitable::in_millis(|millis| {
///     seen.push(millis);
///     Ok(true)
/// });
/// operation.await_timeout(Duration::from_micros(1500)).unwrap();
/// operation.await_timeout(Duration::from_nanos(1)).unwrap();
/// operation.await_timeout(Duration::ZERO).unwrap();
/// drop(operation);
/// assert_eq!(seen, [1, 1, 0]);
/// ```
pub fn in_millis<F>(operation: F) -> InMillis<F>
where
    F: FnMut(u64) -> Result<bool, Interrupted>,
{
    InMillis { operation }
}

impl<F> Awaitable for InMillis<F>
where
    F: FnMut(u64) -> Result<bool, Interrupted>,
{
    fn await_timeout(&mut self, timeout: Duration) -> Result<bool, Interrupted> {
        (self.operation)(to_millis(timeout))
    }
}

fn to_millis(timeout: Duration) -> u64 {
    if timeout.is_zero() {
        return 0;
    }
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Awaitable of the termination of a thread.
///
/// Completes once the thread has finished. Unlike a plain join, a zero
/// timeout only polls the thread, and waiting is [interruptible].
///
/// [interruptible]: crate::interrupt
pub fn join<T>(thread: &JoinHandle<T>) -> impl Awaitable + '_ {
    from_fn(move |timeout| interrupt::wait_until(timeout, JOIN_POLL, || thread.is_finished()))
}

/// Pool of workers that can be shut down and awaited, the subject of the
/// [`termination`] and [`enforced_termination`] adapters.
pub trait Terminate {
    /// Stops accepting new work. Already submitted work still runs.
    fn shutdown(&self);

    /// Blocks until all work has completed after a shutdown, `timeout`
    /// elapses, or the calling thread is interrupted. Returns whether the
    /// pool terminated.
    fn await_termination(&self, timeout: Duration) -> Result<bool, Interrupted>;

    fn is_terminated(&self) -> bool;

    /// Abandons queued work and asks running work to stop.
    fn shutdown_now(&self);
}

/// Awaitable of the termination of `pool`, which is shut down first.
pub fn termination<E>(pool: &E) -> impl Awaitable + '_
where
    E: Terminate + ?Sized,
{
    from_fn(move |timeout| {
        pool.shutdown();
        pool.await_termination(timeout)
    })
}

/// Like [`termination`], but if `pool` has not terminated by the end of the
/// wait, including an interrupted one, it is shut down forcefully with
/// [`Terminate::shutdown_now`].
pub fn enforced_termination<E>(pool: &E) -> impl Awaitable + '_
where
    E: Terminate + ?Sized,
{
    from_fn(move |timeout| {
        pool.shutdown();
        let terminated = pool.await_termination(timeout);
        if !pool.is_terminated() {
            pool.shutdown_now();
        }
        terminated
    })
}

/// Operation to await, paired with the subject it is reported under.
///
/// Subjects are what [`await_multiple`](crate::await_multiple) reports back
/// in its failed, interrupted and unexecuted lists.
pub struct Entry<'a, T> {
    subject: T,
    operation: Box<dyn Awaitable + 'a>,
}

impl<'a, T> Entry<'a, T> {
    pub fn new(subject: T, operation: impl Awaitable + 'a) -> Self {
        Entry {
            subject,
            operation: Box::new(operation),
        }
    }

    pub fn subject(&self) -> &T {
        &self.subject
    }

    pub fn into_parts(self) -> (T, Box<dyn Awaitable + 'a>) {
        (self.subject, self.operation)
    }
}

/// Shorthand for [`Entry::new`].
pub fn entry<'a, T>(subject: T, operation: impl Awaitable + 'a) -> Entry<'a, T> {
    Entry::new(subject, operation)
}

impl<T: Debug> Debug for Entry<'_, T> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Entry")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_rounding() {
        assert_eq!(to_millis(Duration::ZERO), 0);
        assert_eq!(to_millis(MIN_TIMEOUT), 1);
        assert_eq!(to_millis(Duration::from_micros(999)), 1);
        assert_eq!(to_millis(Duration::from_micros(2999)), 2);
        assert_eq!(to_millis(Duration::from_secs(3)), 3000);
        assert_eq!(to_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn entry_keeps_subject() {
        let entry = entry("worker-1", from_fn(|_| Ok(true)));
        assert_eq!(format!("{:?}", entry), "Entry { subject: \"worker-1\", .. }");
        let (subject, mut operation) = entry.into_parts();
        assert_eq!(subject, "worker-1");
        assert_eq!(operation.await_timeout(Duration::ZERO), Ok(true));
    }
}

use crate::awaitable::{Awaitable, Entry, MIN_TIMEOUT};
use crate::error::Interrupted;
use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::time::{Duration, Instant};
use std::vec;
use tracing::{debug, trace};

/// Performs the operations of `entries` one after another within one shared
/// `timeout`.
///
/// Each operation receives whatever is left of `timeout` after the ones before
/// it. Once the time is up, the remaining operations are still performed, each
/// with [`MIN_TIMEOUT`], so they get to report completion if they already
/// completed. A zero `timeout` is handed to every operation unchanged.
///
/// Returns the subjects whose operations did not complete in time, in input
/// order.
///
/// If an operation reports [`Interrupted`], its subject is recorded as
/// interrupted. With `continue_on_interrupt`, all later operations are still
/// performed with [`MIN_TIMEOUT`] and the run ends with [`AwaitInterrupted`]
/// carrying every outcome. Without it, the run stops there and the entries not
/// performed are handed back in [`AwaitInterrupted::into_unexecuted`].
///
/// ```
/// use orderly::awaitable::{self, entry};
/// use orderly::await_multiple;
/// use std::thread;
/// use std::time::Duration;
///
/// let quick = thread::spawn(|| {});
/// let stuck = thread::spawn(|| thread::sleep(Duration::from_secs(1)));
///
/// let failed = await_multiple(
///     Duration::from_millis(100),
///     false,
///     vec![
///         entry("quick", awaitable::join(&quick)),
///         entry("stuck", awaitable::join(&stuck)),
///     ],
/// )
/// .unwrap();
/// assert_eq!(failed, ["stuck"]);
/// ```
pub fn await_multiple<'a, T, I>(
    timeout: Duration,
    continue_on_interrupt: bool,
    entries: I,
) -> Result<Vec<T>, AwaitInterrupted<'a, T>>
where
    I: IntoIterator<Item = Entry<'a, T>>,
{
    let start = Instant::now();
    let mut remaining = timeout;
    let mut failed = Vec::new();
    let mut interrupted = Vec::new();

    let mut entries = entries.into_iter();
    let mut position = 0;
    while let Some(entry) = entries.next() {
        let (subject, mut operation) = entry.into_parts();
        trace!(position, ?remaining, "awaiting operation");
        match operation.await_timeout(remaining) {
            Ok(completed) => {
                if !completed {
                    debug!(position, "operation did not complete in time");
                    failed.push(subject);
                }
                // Zero stays zero, and the floor is final.
                if remaining > MIN_TIMEOUT {
                    remaining = timeout.saturating_sub(start.elapsed()).max(MIN_TIMEOUT);
                }
            }
            Err(Interrupted) => {
                debug!(position, continue_on_interrupt, "operation interrupted");
                interrupted.push(subject);
                if !continue_on_interrupt {
                    return Err(AwaitInterrupted {
                        failed,
                        interrupted,
                        unexecuted: entries.collect(),
                    });
                }
                remaining = MIN_TIMEOUT;
            }
        }
        position += 1;
    }

    if interrupted.is_empty() {
        Ok(failed)
    } else {
        Err(AwaitInterrupted {
            failed,
            interrupted,
            unexecuted: Vec::new(),
        })
    }
}

/// Like [`await_multiple`], with the operation for each subject produced by
/// `adapter`.
///
/// ```
/// use orderly::{awaitable, await_multiple_of};
/// use std::thread;
/// use std::time::Duration;
///
/// let workers: Vec<_> = (0..4).map(|_| thread::spawn(|| {})).collect();
/// let failed = await_multiple_of(Duration::from_secs(1), true, &workers, |worker| {
///     awaitable::join(*worker)
/// })
/// .unwrap();
/// assert!(failed.is_empty());
/// ```
pub fn await_multiple_of<'a, T, A, S, F>(
    timeout: Duration,
    continue_on_interrupt: bool,
    subjects: S,
    mut adapter: F,
) -> Result<Vec<T>, AwaitInterrupted<'a, T>>
where
    S: IntoIterator<Item = T>,
    F: FnMut(&T) -> A,
    A: Awaitable + 'a,
{
    let entries = subjects.into_iter().map(|subject| {
        let operation = adapter(&subject);
        Entry::new(subject, operation)
    });
    await_multiple(timeout, continue_on_interrupt, entries)
}

/// Like [`await_multiple`] for bare operations, subjects being their positions.
///
/// Returns whether all of them completed in time.
pub fn await_all<'a, I, A>(
    timeout: Duration,
    continue_on_interrupt: bool,
    operations: I,
) -> Result<bool, AwaitInterrupted<'a, usize>>
where
    I: IntoIterator<Item = A>,
    A: Awaitable + 'a,
{
    let entries = operations
        .into_iter()
        .enumerate()
        .map(|(position, operation)| Entry::new(position, operation));
    let failed = await_multiple(timeout, continue_on_interrupt, entries)?;
    Ok(failed.is_empty())
}

/// Outcome of an [`await_multiple`] run during which some operation was
/// interrupted.
///
/// Subjects are kept in input order and each appears in at most one of the
/// lists. Those in none of them completed in time.
pub struct AwaitInterrupted<'a, T> {
    failed: Vec<T>,
    interrupted: Vec<T>,
    unexecuted: Vec<Entry<'a, T>>,
}

impl<'a, T> AwaitInterrupted<'a, T> {
    /// Subjects whose operations ran but did not complete in time.
    pub fn failed(&self) -> &[T] {
        &self.failed
    }

    /// Subjects whose operations were interrupted.
    pub fn interrupted(&self) -> &[T] {
        &self.interrupted
    }

    /// Subjects whose operations were never started.
    pub fn unexecuted(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        self.unexecuted.iter().map(Entry::subject)
    }

    /// The entries that were never started, for example to perform them
    /// again.
    pub fn into_unexecuted(self) -> vec::IntoIter<Entry<'a, T>> {
        self.unexecuted.into_iter()
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<T>, Vec<Entry<'a, T>>) {
        (self.failed, self.interrupted, self.unexecuted)
    }
}

impl<T: Debug> Debug for AwaitInterrupted<'_, T> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("AwaitInterrupted")
            .field("failed", &self.failed)
            .field("interrupted", &self.interrupted)
            .field("unexecuted", &self.unexecuted)
            .finish()
    }
}

impl<T> Display for AwaitInterrupted<'_, T> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "awaiting was interrupted: {} interrupted, {} failed, {} not executed",
            self.interrupted.len(),
            self.failed.len(),
            self.unexecuted.len(),
        )
    }
}

impl<T: Debug> Error for AwaitInterrupted<'_, T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&Interrupted)
    }
}

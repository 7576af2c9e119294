#[path = "bucket.rs"]
mod bucket;

use crate::error::{BufferError, Result};
use crate::sink::{ConsoleSink, Sink};
use crate::sync::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use termcolor::Buffer;
use tracing::{debug, trace};

pub use self::bucket::Bucket;

/// Reorders messages produced concurrently into a single output stream.
///
/// The buffer is a sequence of buckets. Each bucket is written to by its own
/// producer, possibly on its own thread, and all messages of a bucket reach
/// the sink before any message of a later bucket. Output is forwarded as soon
/// as ordering allows: the oldest unfinished bucket (the *head*) writes
/// straight through to the sink while later buckets are held in memory until
/// every bucket before them has been closed.
///
/// The sink is closed exactly once, after [`signal_last_bucket`] was called
/// and every bucket has been closed and flushed.
///
/// [`signal_last_bucket`]: OrderedBuffer::signal_last_bucket
///
/// # One bucket per thread
///
/// ```
/// use orderly::OrderedBuffer;
/// use std::thread;
///
/// let buffer = OrderedBuffer::<String, _>::new(Vec::new());
///
/// let workers: Vec<_> = (0..8)
///     .map(|i| {
///         let bucket = buffer.add_bucket().unwrap();
///         thread::spawn(move || {
///             for line in 0..3 {
///                 write!(bucket, "worker {} line {}", i, line).unwrap();
///             }
///             bucket.close().unwrap();
///         })
///     })
///     .collect();
///
/// buffer.signal_last_bucket().unwrap();
/// for worker in workers {
///     worker.join().unwrap();
/// }
///
/// let output: Vec<String> = buffer.try_into_sink().ok().unwrap();
/// assert_eq!(output.len(), 24);
/// assert_eq!(output[0], "worker 0 line 0");
/// assert_eq!(output[23], "worker 7 line 2");
/// ```
///
/// # Preconditions
///
/// [`add_bucket`] and [`signal_last_bucket`] must not be called concurrently
/// with each other; the natural arrangement is a single dispatching thread
/// that creates the buckets, hands them out, and finally signals the last
/// one. Both may run concurrently with any bucket's `write` or `close`.
///
/// [`add_bucket`]: OrderedBuffer::add_bucket
pub struct OrderedBuffer<M, S: Sink<M>> {
    shared: Arc<Shared<M, S>>,
}

#[cfg(test)]
struct _Test
where
    OrderedBuffer<String, Vec<String>>: Send + Sync,
    Bucket<String, Vec<String>>: Send + Sync;

pub(crate) struct Shared<M, S> {
    chain: Mutex<Chain<M>>,
    sink: Mutex<S>,
}

struct Chain<M> {
    /// Number of buckets flushed and popped from the front of `pending`.
    finished: usize,
    /// Buckets not yet flushed, in creation order. The front one is the head.
    pending: VecDeque<Arc<Slot<M>>>,
    last_signaled: bool,
    sink_closed: bool,
}

pub(crate) struct Slot<M> {
    state: Mutex<SlotState<M>>,
}

struct SlotState<M> {
    /// Messages held back until this bucket becomes the head. `None` once the
    /// bucket is the head and its backlog has been flushed: from then on
    /// writes go straight to the sink.
    queue: Option<Vec<M>>,
    closed: bool,
}

impl<M, S: Sink<M>> OrderedBuffer<M, S> {
    /// Makes an empty buffer writing to `sink`.
    pub fn new(sink: S) -> Self {
        OrderedBuffer {
            shared: Arc::new(Shared {
                chain: Mutex::new(Chain {
                    finished: 0,
                    pending: VecDeque::new(),
                    last_signaled: false,
                    sink_closed: false,
                }),
                sink: Mutex::new(sink),
            }),
        }
    }

    /// Appends a new empty bucket after all existing ones.
    ///
    /// Fails with [`BufferError::Finalized`] once the last bucket has been
    /// signaled.
    pub fn add_bucket(&self) -> Result<Bucket<M, S>> {
        let (index, slot) = self.shared.add()?;
        Ok(Bucket::new(index, slot, self.shared.clone()))
    }

    /// Indicates that no more buckets will be added.
    ///
    /// If every bucket is already closed and flushed, the sink is closed
    /// right away. Otherwise it is closed later by whichever
    /// [`Bucket::close`] flushes the final bucket.
    pub fn signal_last_bucket(&self) -> Result<()> {
        let mut chain = self.shared.chain.lock();
        chain.last_signaled = true;
        debug!(
            buckets = chain.finished + chain.pending.len(),
            unflushed = chain.pending.len(),
            "last bucket signaled",
        );
        if chain.pending.is_empty() {
            self.shared.close_sink(&mut chain)?;
        }
        Ok(())
    }

    /// Whether the sink has been closed.
    pub fn is_sink_closed(&self) -> bool {
        self.shared.chain.lock().sink_closed
    }

    /// Recovers the sink once no bucket handle refers to this buffer anymore.
    ///
    /// Gives the buffer back if some bucket is still alive.
    pub fn try_into_sink(self) -> std::result::Result<S, Self> {
        match Arc::try_unwrap(self.shared) {
            Ok(shared) => Ok(shared.sink.into_inner()),
            Err(shared) => Err(OrderedBuffer { shared }),
        }
    }
}

impl OrderedBuffer<Buffer, ConsoleSink> {
    /// Makes a buffer whose output goes to stdout.
    pub fn stdout() -> Self {
        Self::new(ConsoleSink::stdout())
    }

    /// Makes a buffer whose output goes to stderr.
    pub fn stderr() -> Self {
        Self::new(ConsoleSink::stderr())
    }

    /// Creates an empty message that can be colored and written to a bucket
    /// of this buffer.
    pub fn message(&self) -> Buffer {
        self.shared.sink.lock().buffer()
    }
}

impl<M> Slot<M> {
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl<M, S: Sink<M>> Shared<M, S> {
    fn add(&self) -> Result<(usize, Arc<Slot<M>>)> {
        let mut chain = self.chain.lock();
        if chain.last_signaled {
            return Err(BufferError::Finalized);
        }

        let index = chain.finished + chain.pending.len();
        // With everything before it flushed, a new bucket is the head from
        // the start and never queues anything.
        let head = chain.pending.is_empty();
        let queue = if head { None } else { Some(Vec::new()) };
        let slot = Arc::new(Slot {
            state: Mutex::new(SlotState {
                queue,
                closed: false,
            }),
        });
        chain.pending.push_back(slot.clone());
        trace!(bucket = index, head, "bucket added");
        Ok((index, slot))
    }

    pub(crate) fn write(&self, index: usize, slot: &Slot<M>, message: M) -> Result<()> {
        let mut state = slot.state.lock();
        if state.closed {
            return Err(BufferError::BucketClosed { index });
        }
        match &mut state.queue {
            Some(queue) => queue.push(message),
            None => self.sink.lock().write(message)?,
        }
        Ok(())
    }

    pub(crate) fn close(&self, index: usize, slot: &Slot<M>) -> Result<()> {
        let is_head = {
            let mut state = slot.state.lock();
            if state.closed {
                return Err(BufferError::AlreadyClosed { index });
            }
            state.closed = true;
            state.queue.is_none()
        };

        // A bucket that is not the head will be flushed by the cascade that
        // eventually reaches it, which sees `closed` under the same lock.
        if is_head {
            self.cascade(index)
        } else {
            trace!(bucket = index, "bucket closed, waiting for predecessors");
            Ok(())
        }
    }

    /// Retires the closed head bucket `index` and flushes every closed bucket
    /// after it, stopping at the first open one, which becomes the new head.
    fn cascade(&self, index: usize) -> Result<()> {
        let mut chain = self.chain.lock();
        debug_assert_eq!(chain.finished, index);
        chain.pending.pop_front();
        chain.finished += 1;

        while let Some(slot) = chain.pending.front() {
            let mut state = slot.state.lock();
            if let Some(queue) = state.queue.take() {
                let mut sink = self.sink.lock();
                for message in queue {
                    sink.write(message)?;
                }
            }
            if !state.closed {
                debug!(
                    from = index,
                    head = chain.finished,
                    "head handed over to open bucket",
                );
                return Ok(());
            }
            drop(state);
            chain.pending.pop_front();
            chain.finished += 1;
        }

        debug!(from = index, flushed = chain.finished, "all buckets flushed");
        if chain.last_signaled {
            self.close_sink(&mut chain)?;
        }
        Ok(())
    }

    fn close_sink(&self, chain: &mut Chain<M>) -> Result<()> {
        if chain.sink_closed {
            return Ok(());
        }
        chain.sink_closed = true;
        debug!(buckets = chain.finished, "closing sink");
        self.sink.lock().close()?;
        Ok(())
    }
}

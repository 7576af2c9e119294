use super::{Shared, Slot};
use crate::error::Result;
use crate::sink::Sink;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::warn;

/// Contiguous slice of the output of an [`OrderedBuffer`], owned by one
/// producer.
///
/// Messages written to a bucket appear in the output in the order they were
/// written, after everything written to earlier buckets and before anything
/// written to later ones. Buckets are meant to be written to by a single
/// thread at a time; distinct buckets may be used from distinct threads
/// freely.
///
/// A bucket must be [closed](Bucket::close) exactly once. If the last clone of
/// a bucket is dropped while it is still open, it is closed implicitly so
/// that later buckets are not held back forever.
///
/// [`OrderedBuffer`]: crate::OrderedBuffer
///
/// ```
/// use orderly::OrderedBuffer;
///
/// let buffer = OrderedBuffer::<String, _>::new(Vec::new());
/// let first = buffer.add_bucket().unwrap();
/// let second = buffer.add_bucket().unwrap();
///
/// write!(second, "world").unwrap();
/// write!(first, "hello").unwrap();
/// second.close().unwrap();
/// assert!(second.write("again".to_owned()).is_err());
/// first.close().unwrap();
///
/// drop((first, second));
/// let output = buffer.try_into_sink().ok().unwrap();
/// assert_eq!(output, ["hello", "world"]);
/// ```
#[readonly::make]
pub struct Bucket<M, S: Sink<M>> {
    handle: Arc<Handle<M, S>>,

    /// Position of this bucket in the buffer. The first bucket has index 0
    /// and each subsequently added bucket increments it by 1.
    ///
    /// This field is read-only; writing to its value will not compile.
    #[readonly]
    pub index: usize,
}

pub(super) struct Handle<M, S: Sink<M>> {
    shared: Arc<Shared<M, S>>,
    slot: Arc<Slot<M>>,
    index: usize,
}

impl<M, S: Sink<M>> Clone for Bucket<M, S> {
    fn clone(&self) -> Self {
        Bucket {
            handle: self.handle.clone(),
            index: self.index,
        }
    }
}

impl<M, S: Sink<M>> Debug for Bucket<M, S> {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_tuple("Bucket")
            .field(&self.handle.index)
            .finish()
    }
}

impl<M, S: Sink<M>> Bucket<M, S> {
    pub(super) fn new(index: usize, slot: Arc<Slot<M>>, shared: Arc<Shared<M, S>>) -> Self {
        Bucket {
            handle: Arc::new(Handle {
                shared,
                slot,
                index,
            }),
            index,
        }
    }

    /// Appends a message to this bucket.
    ///
    /// If every earlier bucket has been flushed, the message goes straight to
    /// the sink. Otherwise it is held until then. Fails with
    /// [`BufferError::BucketClosed`](crate::BufferError::BucketClosed) if this
    /// bucket was closed.
    pub fn write(&self, message: M) -> Result<()> {
        let handle = &*self.handle;
        handle.shared.write(handle.index, &handle.slot, message)
    }

    /// Marks this bucket as complete.
    ///
    /// If this bucket is the head, its successors that are already closed are
    /// flushed in order, and if it turns out to be the final bucket after
    /// [`signal_last_bucket`](crate::OrderedBuffer::signal_last_bucket), the
    /// sink is closed. Any sink failure along the way is returned here.
    ///
    /// Closing is not idempotent: a second call fails with
    /// [`BufferError::AlreadyClosed`](crate::BufferError::AlreadyClosed).
    pub fn close(&self) -> Result<()> {
        let handle = &*self.handle;
        handle.shared.close(handle.index, &handle.slot)
    }

    #[cfg(test)]
    pub(super) fn slot(&self) -> &Slot<M> {
        &self.handle.slot
    }

    /// Whether this bucket has been closed.
    pub fn is_closed(&self) -> bool {
        self.handle.slot.is_closed()
    }
}

impl<M: From<String>, S: Sink<M>> Bucket<M, S> {
    #[doc(hidden)]
    pub fn write_fmt(&self, args: fmt::Arguments) -> Result<()> {
        self.write(M::from(args.to_string()))
    }
}

impl<M, S: Sink<M>> Drop for Handle<M, S> {
    fn drop(&mut self) {
        if self.slot.is_closed() {
            return;
        }

        warn!(bucket = self.index, "bucket dropped without being closed");
        if let Err(err) = self.shared.close(self.index, &self.slot) {
            warn!(bucket = self.index, error = %err, "implicit close failed");
        }
    }
}

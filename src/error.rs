use std::io;
use thiserror::Error;

/// Failure of an [`OrderedBuffer`](crate::OrderedBuffer) or [`Bucket`](crate::Bucket)
/// operation.
///
/// The first three variants are usage errors: they are reported to the
/// offending caller only and leave every other bucket untouched.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("bucket #{index} has already been closed")]
    BucketClosed { index: usize },

    #[error("bucket #{index} cannot be closed twice")]
    AlreadyClosed { index: usize },

    #[error("no more buckets can be added after the last one was signaled")]
    Finalized,

    #[error("output sink failed")]
    Sink(#[from] io::Error),
}

impl BufferError {
    /// Whether this is a programming error rather than a sink failure.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, BufferError::Sink(_))
    }
}

/// Signal raised by an [`Awaitable`](crate::Awaitable) whose wait was cut
/// short by [interruption](crate::interrupt) of the awaiting thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("operation was interrupted")]
pub struct Interrupted;

pub type Result<T, E = BufferError> = std::result::Result<T, E>;

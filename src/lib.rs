//! Coordination primitives for output and waiting that must respect an order
//! or a deadline while other threads keep working.
//!
//! # Ordered output
//!
//! Suppose a stream of requests is processed concurrently, one task per
//! request, and each task produces some messages in response. The responses
//! must go out in the order of the requests, without messages of different
//! requests interleaving. Holding everything until the end makes the output
//! lurch; serializing the tasks forfeits the concurrency.
//!
//! [`OrderedBuffer`] hands each task its own [`Bucket`]:
//!
//!   - Buckets are ordered by creation. All messages of a bucket reach the
//!     sink before any message of a later bucket, in the order they were
//!     written.
//!
//!   - The oldest unfinished bucket writes through to the sink in real time;
//!     later ones are held in memory only until everything before them is
//!     done.
//!
//!   - The sink is closed exactly once, after the last bucket is signaled
//!     and flushed.
//!
//! # Awaiting several things at once
//!
//! Shutting down usually means waiting for several things, such as worker
//! threads to finish or pools to terminate, each of which offers a timed
//! wait, under one overall deadline. [`await_multiple`] performs such
//! [`Awaitable`] operations in sequence, giving each whatever time the
//! previous ones left over, and reports which of them failed to complete, were
//! [interrupted](interrupt), or were never started.

pub mod awaitable;
mod buffer;
mod error;
pub mod interrupt;
mod multi;
mod sink;
mod sync;

pub use crate::awaitable::{Awaitable, Entry, Terminate, MIN_TIMEOUT};
pub use crate::buffer::{Bucket, OrderedBuffer};
pub use crate::error::{BufferError, Interrupted};
pub use crate::multi::{await_all, await_multiple, await_multiple_of, AwaitInterrupted};
pub use crate::sink::{ConsoleSink, Sink};

#[doc(no_inline)]
pub use termcolor::{Color, ColorSpec, WriteColor};

use std::io;
use termcolor::ColorChoice::Auto;
use termcolor::{Buffer, BufferWriter};

/// Destination of the messages written to an
/// [`OrderedBuffer`](crate::OrderedBuffer).
///
/// The buffer owns its sink for its whole lifetime. It guarantees that
/// messages arrive in bucket order and that `close` is called at most once,
/// after which `write` is never called again.
pub trait Sink<M> {
    fn write(&mut self, message: M) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

impl<M, S: Sink<M> + ?Sized> Sink<M> for Box<S> {
    fn write(&mut self, message: M) -> io::Result<()> {
        (**self).write(message)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Collects messages in memory. Closing is a no-op.
impl<M> Sink<M> for Vec<M> {
    fn write(&mut self, message: M) -> io::Result<()> {
        self.push(message);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink printing colored terminal output to stdout or stderr.
///
/// Messages are `termcolor` buffers, obtained from [`ConsoleSink::buffer`] or
/// [`OrderedBuffer::message`](crate::OrderedBuffer::message), so that each one
/// may carry its own colors.
pub struct ConsoleSink {
    writer: BufferWriter,
}

impl ConsoleSink {
    /// Makes a sink whose output goes to stdout.
    pub fn stdout() -> Self {
        ConsoleSink {
            writer: BufferWriter::stdout(Auto),
        }
    }

    /// Makes a sink whose output goes to stderr.
    pub fn stderr() -> Self {
        ConsoleSink {
            writer: BufferWriter::stderr(Auto),
        }
    }

    /// Creates an empty message with the color support of this sink's stream.
    pub fn buffer(&self) -> Buffer {
        self.writer.buffer()
    }
}

impl Sink<Buffer> for ConsoleSink {
    fn write(&mut self, message: Buffer) -> io::Result<()> {
        self.writer.print(&message)
    }

    fn close(&mut self) -> io::Result<()> {
        // Leave the terminal uncolored for whoever prints next.
        let mut reset = self.writer.buffer();
        termcolor::WriteColor::reset(&mut reset)?;
        self.writer.print(&reset)
    }
}

use orderly::awaitable;
use orderly::{await_multiple_of, Color::Red, ColorSpec, ConsoleSink, OrderedBuffer, WriteColor};
use rayon::ThreadPoolBuilder;
use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;
use termcolor::Buffer;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn main() -> Result<()> {
    // Come up with some work that needs to be performed. Let's pretend to
    // perform work on each file in the current directory.
    let mut files = Vec::new();
    for entry in fs::read_dir(".")? {
        files.push(entry?.path());
    }
    files.sort();

    // Build a thread pool with one thread per cpu.
    let cpus = num_cpus::get();
    let pool = ThreadPoolBuilder::new().num_threads(cpus).build()?;

    // One bucket per file, created up front in file order. Output goes to
    // stderr in that order no matter which file finishes first.
    let output = OrderedBuffer::stderr();
    let mut buckets = Vec::new();
    for _ in &files {
        buckets.push(output.add_bucket()?);
    }
    output.signal_last_bucket()?;

    pool.scope(|scope| {
        for (bucket, path) in buckets.into_iter().zip(&files) {
            let output = &output;
            scope.spawn(move |_| {
                for message in work(output, path) {
                    let _ = bucket.write(message);
                }
                let _ = bucket.close();
            });
        }
    });

    // Some cleanup threads that must be waited for, but not forever.
    let cleanup: Vec<_> = (0..cpus as u64)
        .map(|i| thread::spawn(move || thread::sleep(Duration::from_millis(100 * i))))
        .collect();
    let lingering = await_multiple_of(Duration::from_millis(250), true, &cleanup, |thread| {
        awaitable::join(*thread)
    })
    .map_err(|err| err.to_string())?;
    eprintln!("{} cleanup thread(s) still running", lingering.len());

    Ok(())
}

fn work(output: &OrderedBuffer<Buffer, ConsoleSink>, path: &Path) -> Vec<Buffer> {
    let mut messages = Vec::new();

    // Produce output as separate messages.
    let mut heading = output.message();
    let _ = write!(heading, "evaluating ");
    let _ = heading.set_color(ColorSpec::new().set_bold(true));
    let _ = writeln!(heading, "{}", path.display());
    let _ = heading.reset();
    messages.push(heading);

    // Do some expensive work...
    let string = path.to_string_lossy();
    thread::sleep(Duration::from_millis(150 * string.len() as u64));

    // ... which may fail or succeed.
    if string.contains('c') {
        let mut error = output.message();
        let _ = error.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Red)));
        let _ = write!(error, "  ERROR");
        let _ = error.reset();
        let _ = writeln!(error, ": path contains the letter 'c'");
        messages.push(error);
    }

    messages
}

use orderly::{Bucket, BufferError, OrderedBuffer, Sink};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Message {
    bucket: usize,
    number: usize,
}

/// Records everything it receives and how many times it was closed.
#[derive(Clone, Default)]
struct Recorder {
    output: Arc<Mutex<Vec<Message>>>,
    closes: Arc<AtomicUsize>,
}

impl Sink<Message> for Recorder {
    fn write(&mut self, message: Message) -> io::Result<()> {
        if self.closes.load(Ordering::SeqCst) > 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "output already closed"));
        }
        self.output.lock().unwrap().push(message);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Recorder {
    fn output(&self) -> Vec<Message> {
        self.output.lock().unwrap().clone()
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    #[track_caller]
    fn assert_complete(&self, expected_messages: usize) {
        let output = self.output();
        assert_eq!(output.len(), expected_messages, "all messages should be written");
        assert!(
            output.windows(2).all(|pair| pair[0] < pair[1]),
            "messages should be written in order: {:?}",
            output,
        );
        assert_eq!(self.closes(), 1, "output should be closed 1 time");
    }
}

type Buffer = OrderedBuffer<Message, Recorder>;

fn setup() -> (Buffer, Recorder) {
    let recorder = Recorder::default();
    (OrderedBuffer::new(recorder.clone()), recorder)
}

/// Writes messages numbered consecutively for one bucket.
struct Producer {
    bucket: Bucket<Message, Recorder>,
    written: usize,
}

impl Producer {
    fn new(bucket: Bucket<Message, Recorder>) -> Self {
        Producer { bucket, written: 0 }
    }

    fn write(&mut self) {
        self.written += 1;
        let message = Message {
            bucket: self.bucket.index,
            number: self.written,
        };
        self.bucket.write(message).unwrap();
    }

    fn close(&self) {
        self.bucket.close().unwrap();
    }
}

#[test]
fn single_thread() {
    let (buffer, recorder) = setup();
    let mut bucket1 = Producer::new(buffer.add_bucket().unwrap());
    let mut bucket2 = Producer::new(buffer.add_bucket().unwrap());
    bucket2.write();
    bucket2.write();
    bucket1.write();
    bucket2.write();
    bucket1.write();
    bucket2.write();
    let mut bucket3 = Producer::new(buffer.add_bucket().unwrap());
    bucket2.write();
    bucket3.write();
    bucket1.write();
    bucket3.write();
    bucket2.write();
    bucket3.write();
    bucket2.close();
    bucket1.write();
    bucket1.write();
    bucket3.write();
    bucket1.write();
    let bucket4 = Producer::new(buffer.add_bucket().unwrap());
    bucket1.close();
    bucket3.close();
    let mut bucket5 = Producer::new(buffer.add_bucket().unwrap());
    bucket5.write();
    bucket5.close();
    buffer.signal_last_bucket().unwrap();
    assert_eq!(recorder.closes(), 0, "bucket 4 is still open");
    bucket4.close();

    let written = bucket1.written + bucket2.written + bucket3.written + bucket5.written;
    assert_eq!(written, 17);
    recorder.assert_complete(written);
}

#[test]
fn buckets_closed_out_of_order() {
    let (buffer, recorder) = setup();
    let mut bucket1 = Producer::new(buffer.add_bucket().unwrap());
    let mut bucket2 = Producer::new(buffer.add_bucket().unwrap());
    let mut bucket3 = Producer::new(buffer.add_bucket().unwrap());
    bucket2.write();
    bucket1.write();
    bucket3.write();
    bucket2.write();
    bucket1.write();
    bucket3.write();

    bucket2.close();
    assert_eq!(recorder.output().len(), 2, "only bucket 1 is forwarded");
    bucket1.close();
    assert_eq!(recorder.output().len(), 6, "bucket 2 and the backlog of bucket 3 are flushed");
    bucket3.write();
    assert_eq!(recorder.output().len(), 7, "bucket 3 is now the head");
    bucket3.close();
    buffer.signal_last_bucket().unwrap();

    recorder.assert_complete(7);
    let output = recorder.output();
    assert!(output[..2].iter().all(|m| m.bucket == 0));
    assert!(output[2..4].iter().all(|m| m.bucket == 1));
    assert!(output[4..].iter().all(|m| m.bucket == 2));
}

#[test]
fn head_writes_go_straight_to_sink() {
    let (buffer, recorder) = setup();
    let mut head = Producer::new(buffer.add_bucket().unwrap());
    let mut next = Producer::new(buffer.add_bucket().unwrap());
    head.write();
    next.write();
    assert_eq!(recorder.output().len(), 1);
    head.write();
    assert_eq!(recorder.output().len(), 2);
}

fn several_threads(number_of_buckets: usize, messages_per_bucket: &[usize]) {
    let (buffer, recorder) = setup();
    let dispatch = Mutex::new(());
    let expected: usize = (0..number_of_buckets)
        .map(|i| messages_per_bucket[i % messages_per_bucket.len()])
        .sum();

    thread::scope(|scope| {
        for _ in 0..number_of_buckets {
            scope.spawn(|| {
                let bucket = {
                    let _dispatch = dispatch.lock().unwrap();
                    buffer.add_bucket().unwrap()
                };
                let mut producer = Producer::new(bucket);
                if producer.bucket.index % 17 == 0 {
                    // Make some producers a bit slower to start.
                    thread::sleep(Duration::from_millis(100));
                }
                let count = messages_per_bucket[producer.bucket.index % messages_per_bucket.len()];
                for _ in 0..count {
                    producer.write();
                }
                producer.close();
            });
        }
    });
    buffer.signal_last_bucket().unwrap();

    recorder.assert_complete(expected);
}

#[test]
fn thousand_threads_one_message_each() {
    several_threads(1000, &[1, 1, 1, 1, 0]);
}

#[test]
fn thousand_threads_thousand_messages_each() {
    several_threads(1000, &[1000, 1000, 1000, 0, 0, 1000, 1000, 10]);
}

#[test]
fn rayon_workers_with_shared_dispatch() {
    let (buffer, recorder) = setup();
    let threads = num_cpus::get().max(2);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap();

    let buckets: Vec<_> = (0..200).map(|_| buffer.add_bucket().unwrap()).collect();
    buffer.signal_last_bucket().unwrap();

    pool.scope(|scope| {
        // Reverse order so that the later buckets tend to finish first.
        for bucket in buckets.into_iter().rev() {
            scope.spawn(move |_| {
                let mut producer = Producer::new(bucket);
                for _ in 0..50 {
                    producer.write();
                }
                producer.close();
            });
        }
    });

    recorder.assert_complete(200 * 50);
}

#[test]
fn signal_concurrently_with_flushing_last_bucket() {
    for _ in 0..5000 {
        let (buffer, recorder) = setup();
        let bucket = buffer.add_bucket().unwrap();
        thread::scope(|scope| {
            scope.spawn(|| bucket.close().unwrap());
            scope.spawn(|| buffer.signal_last_bucket().unwrap());
        });

        assert_eq!(recorder.closes(), 1, "output should be closed 1 time");
    }
}

#[test]
fn concurrent_close_of_subsequent_buckets_followed_by_closed_buckets() {
    for _ in 0..5000 {
        let (buffer, recorder) = setup();
        let bucket1 = buffer.add_bucket().unwrap();
        let bucket2 = buffer.add_bucket().unwrap();
        let mut bucket3 = Producer::new(buffer.add_bucket().unwrap());
        bucket3.write();
        bucket3.close();
        let mut bucket4 = Producer::new(buffer.add_bucket().unwrap());
        bucket4.write();
        bucket4.close();
        buffer.signal_last_bucket().unwrap();
        thread::scope(|scope| {
            scope.spawn(|| bucket1.close().unwrap());
            scope.spawn(|| bucket2.close().unwrap());
        });

        recorder.assert_complete(2);
    }
}

#[test]
fn add_bucket_and_signal_while_closing_tail() {
    for _ in 0..100 {
        let (buffer, recorder) = setup();
        let mut bucket1 = Producer::new(buffer.add_bucket().unwrap());
        bucket1.write();
        thread::scope(|scope| {
            scope.spawn(|| bucket1.close());
            scope.spawn(|| {
                let mut bucket2 = Producer::new(buffer.add_bucket().unwrap());
                buffer.signal_last_bucket().unwrap();
                thread::sleep(Duration::from_millis(3));
                bucket2.write();
                bucket2.close();
            });
        });

        recorder.assert_complete(2);
    }
}

#[test]
fn add_bucket_and_signal_while_flushing_tail() {
    for _ in 0..100 {
        let (buffer, recorder) = setup();
        let mut bucket1 = Producer::new(buffer.add_bucket().unwrap());
        bucket1.write();
        buffer.add_bucket().unwrap().close().unwrap();
        thread::scope(|scope| {
            scope.spawn(|| bucket1.close());
            scope.spawn(|| {
                let mut bucket3 = Producer::new(buffer.add_bucket().unwrap());
                buffer.signal_last_bucket().unwrap();
                thread::sleep(Duration::from_millis(3));
                bucket3.write();
                bucket3.close();
            });
        });

        recorder.assert_complete(2);
    }
}

#[test]
fn write_to_closed_bucket() {
    let (buffer, recorder) = setup();
    let bucket = buffer.add_bucket().unwrap();
    bucket.close().unwrap();
    let err = bucket
        .write(Message {
            bucket: 666,
            number: 666,
        })
        .unwrap_err();
    assert!(matches!(err, BufferError::BucketClosed { index: 0 }));
    assert!(err.is_usage_error());
    assert!(recorder.output().is_empty());
}

#[test]
fn close_twice() {
    let (buffer, recorder) = setup();
    let first = buffer.add_bucket().unwrap();
    let second = buffer.add_bucket().unwrap();
    second.close().unwrap();
    let err = second.close().unwrap_err();
    assert!(matches!(err, BufferError::AlreadyClosed { index: 1 }));
    assert_eq!(err.to_string(), "bucket #1 cannot be closed twice");

    // The misuse leaves the rest of the buffer working.
    let mut first = Producer::new(first);
    first.write();
    first.close();
    assert!(matches!(first.bucket.close(), Err(BufferError::AlreadyClosed { index: 0 })));
    buffer.signal_last_bucket().unwrap();
    recorder.assert_complete(1);
}

#[test]
fn add_bucket_after_last_bucket_signaled() {
    let (buffer, _recorder) = setup();
    let _bucket = buffer.add_bucket().unwrap();
    buffer.signal_last_bucket().unwrap();
    assert!(matches!(buffer.add_bucket(), Err(BufferError::Finalized)));
}

#[test]
fn signal_without_buckets_closes_immediately() {
    let (buffer, recorder) = setup();
    assert!(!buffer.is_sink_closed());
    buffer.signal_last_bucket().unwrap();
    assert!(buffer.is_sink_closed());
    buffer.signal_last_bucket().unwrap();
    assert_eq!(recorder.closes(), 1);
}

#[test]
fn dropped_bucket_is_closed_implicitly() {
    let (buffer, recorder) = setup();
    let first = buffer.add_bucket().unwrap();
    let clone = first.clone();
    let mut second = Producer::new(buffer.add_bucket().unwrap());
    second.write();
    second.close();
    buffer.signal_last_bucket().unwrap();

    drop(first);
    assert!(!clone.is_closed(), "a clone is still alive");
    assert_eq!(recorder.closes(), 0);
    drop(clone);
    recorder.assert_complete(1);
}

#[test]
fn sink_is_handed_back() {
    let buffer = OrderedBuffer::<&str, _>::new(Vec::new());
    let bucket = buffer.add_bucket().unwrap();
    bucket.write("only").unwrap();
    let buffer = buffer.try_into_sink().err().unwrap();
    bucket.close().unwrap();
    drop(bucket);
    assert_eq!(buffer.try_into_sink().ok().unwrap(), ["only"]);
}

#[test]
fn formatted_messages() {
    let buffer = OrderedBuffer::<String, _>::new(Vec::new());
    let bucket = buffer.add_bucket().unwrap();
    assert_eq!(format!("{:?}", bucket), "Bucket(0)");
    write!(bucket, "{}-{}", "a", 1).unwrap();
    bucket.close().unwrap();
    drop(bucket);
    assert_eq!(buffer.try_into_sink().ok().unwrap(), ["a-1"]);
}

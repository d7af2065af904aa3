//! A lock-free concurrent logger.
//!
//! The kernel never writes to the UART directly from arbitrary call sites
//! (doing so from an interrupt handler, or while another core holds the
//! UART's lock, would deadlock). Instead every `log` record is formatted
//! into a chunk of a lock-free ring buffer and later drained to a
//! [`LogSink`] by whichever core next manages to acquire it.
use core::cell::UnsafeCell;
use core::fmt::Write;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Returns the ANSI color code for a given log level.
fn color_for_level(lvl: Level) -> &'static str {
    match lvl {
        Level::Error => "31",
        Level::Warn => "33",
        Level::Info => "32",
        Level::Debug => "34",
        Level::Trace => "35",
    }
}

/// Reads values that should be sampled fresh for every record: which core
/// emitted it and what the free-running cycle counter read at that moment.
pub trait GlobalValueReader {
    /// Read the current global values.
    fn read() -> GlobalValues;
}

/// Values sampled from the running core at log time.
#[derive(Default)]
pub struct GlobalValues {
    /// The id of the core that produced this record.
    pub core_id: usize,
    /// The current value of the system's free-running cycle counter.
    pub timer_counter: u64,
}

/// A sink that accepts drained log chunks, e.g. a UART writer.
pub trait LogSink {
    /// Accepts a log chunk.
    fn accept(&mut self, chunk: &[u8]);
}

const MAX_LOG_CHUNK_SIZE: usize = 120;

/// A guard that provides safe access to the chunk's buffer during writing.
pub struct ChunkWriteGuard<'a> {
    chunk: &'a LogChunk,
    buffer: &'a mut [u8],
}

impl ChunkWriteGuard<'_> {
    /// Marks the chunk as full with the given size and consumes the guard.
    pub fn finish(self, actual_size: usize) {
        let status_and_size = STATUS_FULL | (actual_size << SIZE_SHIFT);
        self.chunk
            .status_and_size
            .store(status_and_size, Ordering::Release);
    }
}

impl core::ops::Deref for ChunkWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buffer
    }
}

impl core::ops::DerefMut for ChunkWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer
    }
}

/// One chunk of the ring buffer.
struct LogChunk {
    data: UnsafeCell<[u8; MAX_LOG_CHUNK_SIZE]>,
    status_and_size: AtomicUsize,
}

unsafe impl Sync for LogChunk {}

impl LogChunk {
    /// Creates a new, empty `LogChunk`.
    const fn new() -> Self {
        Self {
            data: UnsafeCell::new([0; MAX_LOG_CHUNK_SIZE]),
            status_and_size: AtomicUsize::new(STATUS_EMPTY),
        }
    }

    /// Attempts to acquire the chunk for writing.
    fn try_acquire_for_write(&self) -> Option<ChunkWriteGuard<'_>> {
        self.status_and_size
            .compare_exchange(
                STATUS_EMPTY,
                STATUS_WRITING,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()
            .and_then(|_| unsafe {
                // SAFETY: the CAS above gives us exclusive access to the data
                // buffer until `finish` is called on the returned guard.
                self.data.get().as_mut()
            })
            .map(|a| ChunkWriteGuard {
                chunk: self,
                buffer: &mut a[..],
            })
    }

    /// Attempts to read data from the chunk, handing it to `f` if full.
    fn try_read<F>(&self, f: F) -> bool
    where
        F: FnOnce(&[u8]),
    {
        let status_and_size = self.status_and_size.load(Ordering::Acquire);
        if (status_and_size & STATUS_MASK) == STATUS_FULL {
            let size = (status_and_size & SIZE_MASK) >> SIZE_SHIFT;
            let data = unsafe {
                // SAFETY: status is STATUS_FULL, so no writer holds the guard.
                &*self.data.get()
            };
            f(&data[..size]);
            self.status_and_size.store(STATUS_EMPTY, Ordering::Release);
            true
        } else {
            false
        }
    }
}

const STATUS_EMPTY: usize = 0;
const STATUS_WRITING: usize = 1;
const STATUS_FULL: usize = 2;
const STATUS_MASK: usize = 0b11;
const SIZE_SHIFT: usize = 2;
const SIZE_MASK: usize = !STATUS_MASK;

/// A lock-free concurrent logger backed by a fixed-size ring buffer.
///
/// `NUM_CHUNKS_IN_BUFFER` defaults to 128, a 16 KiB buffer at
/// [`MAX_LOG_CHUNK_SIZE`] bytes per chunk.
pub struct Logger<S, G, const NUM_CHUNKS_IN_BUFFER: usize = 128> {
    _global_value_reader: PhantomData<G>,
    buffer: [LogChunk; NUM_CHUNKS_IN_BUFFER],
    write_index: AtomicUsize,
    read_index: AtomicUsize,
    overflow_count: AtomicUsize,
    sink: Mutex<S>,
    level_filter: LevelFilter,
}

impl<S: LogSink, G: GlobalValueReader, const NUM_CHUNKS_IN_BUFFER: usize>
    Logger<S, G, NUM_CHUNKS_IN_BUFFER>
{
    /// Creates a new `Logger` with the given sink and level filter.
    pub fn new(sink: S, level_filter: LevelFilter) -> Self {
        Self {
            buffer: [const { LogChunk::new() }; NUM_CHUNKS_IN_BUFFER],
            write_index: AtomicUsize::new(0),
            read_index: AtomicUsize::new(0),
            overflow_count: AtomicUsize::new(0),
            sink: Mutex::new(sink),
            level_filter,
            _global_value_reader: PhantomData,
        }
    }

    /// Formats one record into the ring buffer.
    fn write_record(&self, record: &Record) {
        let mut writer = RingBufferWriter::new(self);

        let module_path = record.module_path().unwrap_or("unknown module");
        let line = record.line().unwrap_or(0);
        let global_values = G::read();

        let _ = writeln!(
            &mut writer,
            "\x1b[{}m{:<5}\x1b[0m {}@{}| core={} cycle={} | {}",
            color_for_level(record.level()),
            record.level(),
            module_path,
            line,
            global_values.core_id,
            global_values.timer_counter,
            record.args()
        );
    }

    /// Drains up to `limit` chunks into `sink`, once it's been acquired.
    fn flush_internal(&self, sink: &mut S, limit: usize) {
        let overflow_count = self.overflow_count.swap(0, Ordering::Acquire);
        if overflow_count > 0 {
            sink.accept(b"\x1b[31mlog overflow!\x1b[0m");
        }

        for _ in 0..limit {
            let read_index = self.read_index.load(Ordering::Acquire);
            let write_index = self.write_index.load(Ordering::Acquire);

            if read_index == write_index {
                break;
            }

            let wrapped_index = read_index % NUM_CHUNKS_IN_BUFFER;
            let chunk = &self.buffer[wrapped_index];

            let read_success = chunk.try_read(|data| sink.accept(data));

            if read_success {
                self.read_index.fetch_add(1, Ordering::Release);
            } else {
                break;
            }
        }
    }
}

impl<S: LogSink + Send, G: GlobalValueReader, const NUM_CHUNKS_IN_BUFFER: usize> Log
    for Logger<S, G, NUM_CHUNKS_IN_BUFFER>
{
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        self.write_record(record);

        if let Some(mut sink_guard) = self.sink.try_lock() {
            self.flush_internal(&mut sink_guard, NUM_CHUNKS_IN_BUFFER / 3);
        }
    }

    fn flush(&self) {
        let mut sink_guard = self.sink.lock();
        self.flush_internal(&mut sink_guard, NUM_CHUNKS_IN_BUFFER);
    }
}

/// Writes directly into a logger's ring buffer, rolling over to a new chunk
/// when the current one fills up.
struct RingBufferWriter<'a, S: LogSink, G: GlobalValueReader, const N: usize> {
    logger: &'a Logger<S, G, N>,
    current_chunk: Option<ChunkWriteGuard<'a>>,
    current_chunk_offset: usize,
}

impl<'a, S: LogSink, G: GlobalValueReader, const N: usize> RingBufferWriter<'a, S, G, N> {
    fn new(logger: &'a Logger<S, G, N>) -> Self {
        Self {
            logger,
            current_chunk: None,
            current_chunk_offset: 0,
        }
    }

    fn acquire_new_chunk(&mut self) -> Result<(), ()> {
        let index = self.logger.write_index.fetch_add(1, Ordering::AcqRel);

        let read_index = self.logger.read_index.load(Ordering::Acquire);
        let distance = index.wrapping_sub(read_index);

        if distance >= N {
            self.logger.overflow_count.fetch_add(1, Ordering::Relaxed);
            return Err(());
        }

        let wrapped_index = index % N;
        let chunk = &self.logger.buffer[wrapped_index];

        if let Some(wg) = chunk.try_acquire_for_write() {
            self.current_chunk = Some(wg);
            self.current_chunk_offset = 0;
            Ok(())
        } else {
            Err(())
        }
    }

    fn finish_chunk(&mut self) {
        if let Some(chunk) = self.current_chunk.take() {
            chunk.finish(self.current_chunk_offset);
        }
    }
}

impl<S: LogSink, G: GlobalValueReader, const N: usize> core::fmt::Write
    for RingBufferWriter<'_, S, G, N>
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let mut s = s.as_bytes();
        while !s.is_empty() {
            if self.current_chunk.is_none() || self.current_chunk_offset >= MAX_LOG_CHUNK_SIZE {
                self.finish_chunk();

                if self.acquire_new_chunk().is_err() {
                    self.logger.overflow_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            }

            let chunk = self.current_chunk.as_mut().unwrap();
            let remaining_space = MAX_LOG_CHUNK_SIZE - self.current_chunk_offset;
            let bytes_to_copy = core::cmp::min(remaining_space, s.len());

            let dest =
                &mut chunk[self.current_chunk_offset..self.current_chunk_offset + bytes_to_copy];
            dest.copy_from_slice(&s[..bytes_to_copy]);

            self.current_chunk_offset += bytes_to_copy;
            s = &s[bytes_to_copy..];
        }

        Ok(())
    }
}

impl<S: LogSink, G: GlobalValueReader, const N: usize> Drop for RingBufferWriter<'_, S, G, N> {
    fn drop(&mut self) {
        self.finish_chunk();
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;
    use std::{string::String, sync::Arc, thread, time::Duration, vec::Vec};

    #[derive(Default)]
    struct TestSink {
        messages: Vec<Vec<u8>>,
    }

    impl LogSink for TestSink {
        fn accept(&mut self, chunk: &[u8]) {
            self.messages.push(chunk.to_vec());
        }
    }

    impl TestSink {
        fn get_messages_as_string(&self) -> Vec<String> {
            self.messages
                .iter()
                .map(|msg| String::from_utf8_lossy(msg).into_owned())
                .collect()
        }
    }

    struct NoGlobals;
    impl GlobalValueReader for NoGlobals {
        fn read() -> GlobalValues {
            GlobalValues::default()
        }
    }

    #[test]
    fn test_basic_logging() {
        let logger =
            Logger::<TestSink, NoGlobals, 16>::new(TestSink::default(), LevelFilter::Info);

        let record = Record::builder()
            .args(format_args!("test message"))
            .level(Level::Info)
            .target("test")
            .module_path(Some("test_module"))
            .file(Some("test.rs"))
            .line(Some(42))
            .build();

        logger.log(&record);

        let messages = logger.sink.lock().get_messages_as_string();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("test message"));
        assert!(messages[0].contains("test_module@42"));
    }

    #[test]
    fn test_log_level_filtering() {
        let logger =
            Logger::<TestSink, NoGlobals, 16>::new(TestSink::default(), LevelFilter::Warn);

        let warn_record = Record::builder()
            .args(format_args!("warning"))
            .level(Level::Warn)
            .target("test")
            .build();

        let info_record = Record::builder()
            .args(format_args!("info"))
            .level(Level::Info)
            .target("test")
            .build();

        logger.log(&warn_record);
        logger.log(&info_record);
        logger.flush();

        let messages = logger.sink.lock().get_messages_as_string();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("warning"));
    }

    #[test]
    fn test_buffer_overflow() {
        let logger = Logger::<TestSink, NoGlobals, 2>::new(TestSink::default(), LevelFilter::Info);

        let sink = logger.sink.lock();

        for _ in 0..5 {
            logger.log(
                &Record::builder()
                    .args(format_args!("message"))
                    .level(Level::Info)
                    .target("test")
                    .build(),
            );
            thread::sleep(Duration::from_millis(1));
        }

        drop(sink);
        logger.flush();

        let messages = logger.sink.lock().get_messages_as_string();
        assert!(messages.iter().any(|msg| msg.contains("overflow")));
    }

    #[test]
    fn test_concurrent_logging() {
        let logger = Arc::new(Logger::<TestSink, NoGlobals, 32>::new(
            TestSink::default(),
            LevelFilter::Info,
        ));
        let thread_count = 8;
        let messages_per_thread = 50;

        thread::scope(|scope| {
            let mut handles = Vec::new();
            for thread_id in 0..thread_count {
                let logger = Arc::clone(&logger);
                handles.push(scope.spawn(move || {
                    for msg_id in 0..messages_per_thread {
                        logger.log(
                            &Record::builder()
                                .args(format_args!("Thread {thread_id} Message {msg_id}"))
                                .level(Level::Info)
                                .target("test")
                                .build(),
                        );
                    }
                }));
            }
            for handle in handles {
                handle.join().unwrap();
            }
        });

        logger.flush();
        let messages = logger.sink.lock().get_messages_as_string();
        let actual_messages: Vec<_> = messages
            .iter()
            .filter(|msg| !msg.contains("overflow"))
            .collect();
        assert!(!actual_messages.is_empty());
        for msg in actual_messages {
            assert!(msg.contains("Thread") && msg.contains("Message"));
        }
    }

    #[test]
    fn test_large_message_chunking() {
        let logger =
            Logger::<TestSink, NoGlobals, 16>::new(TestSink::default(), LevelFilter::Info);

        let large_message = "A".repeat(MAX_LOG_CHUNK_SIZE * 2);

        logger.log(
            &Record::builder()
                .args(format_args!("{large_message}"))
                .level(Level::Info)
                .target("test")
                .build(),
        );
        logger.flush();

        let messages = logger.sink.lock().get_messages_as_string();
        assert!(messages.len() > 1);

        let full_message: String = messages.iter().cloned().collect();
        assert!(full_message.contains(&large_message));
    }

    #[test]
    fn test_all_log_levels() {
        let logger =
            Logger::<TestSink, NoGlobals, 16>::new(TestSink::default(), LevelFilter::Trace);

        for level in &[
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ] {
            logger.log(
                &Record::builder()
                    .args(format_args!("{level} message"))
                    .level(*level)
                    .target("test")
                    .build(),
            );
        }

        logger.flush();
        let messages = logger.sink.lock().get_messages_as_string();

        assert_eq!(messages.len(), 5);
        assert!(messages.iter().any(|msg| msg.contains("ERROR")));
        assert!(messages.iter().any(|msg| msg.contains("WARN")));
        assert!(messages.iter().any(|msg| msg.contains("INFO")));
        assert!(messages.iter().any(|msg| msg.contains("DEBUG")));
        assert!(messages.iter().any(|msg| msg.contains("TRACE")));
    }
}

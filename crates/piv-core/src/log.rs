//! Asynchronous structured logging with pluggable sinks.
//!
//! [`Logger`] accepts entries from any thread without blocking on I/O:
//! argument values are captured at the call site, but the formatting work
//! and sink delivery happen on a dedicated logging thread. Entries queue
//! in a bounded buffer (default 100) that drops the oldest entry on
//! overflow.
//!
//! Sinks are `(level, formatted line) -> bool` callbacks registered and
//! removed dynamically; entries are held until at least one sink exists.
//!
//! # Lifecycle
//!
//! The logger moves through `accepting -> draining -> stopped`. While
//! draining no new entries are accepted; pending entries are delivered if
//! sinks exist, otherwise discarded. The process-global instance is
//! started lazily by [`global`] and shut down explicitly with
//! [`Logger::shutdown`], after any loader or pipeline that may still
//! log.
//!
//! # Example
//!
//! ```
//! use piv_core::log::{self, Level};
//!
//! let logger = log::global();
//! let id = logger.add_sink(|_level, line| {
//!     eprintln!("{line}");
//!     true
//! });
//!
//! let entry = piv_core::log_info!("loaded {} pairs", 12);
//! logger.wait_until_written(entry);
//! logger.remove_sink(id);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a log entry.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// No logging.
    None = 0,
    /// Unrecoverable failures.
    Fatal = 1,
    /// Recoverable failures.
    Error = 2,
    /// Suspicious conditions.
    Warn = 3,
    /// Progress information.
    Info = 4,
    /// Diagnostic detail.
    Debug = 5,
    /// Test-only entries, always delivered.
    Test = u8::MAX,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Level::None => "NONE",
            Level::Fatal => "FATAL",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Test => "TEST",
        };
        f.write_str(s)
    }
}

/// Monotonic id of a submitted entry; 0 means the entry was rejected.
pub type EntryId = u64;

/// Id of a registered sink.
pub type SinkId = u64;

type Sink = Arc<dyn Fn(Level, &str) -> bool + Send + Sync>;
type EntryFn = Box<dyn FnOnce() -> String + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Accepting,
    Draining,
    Stopped,
}

struct State {
    phase: Phase,
    entries: VecDeque<(Level, EntryFn)>,
    sinks: HashMap<SinkId, Sink>,
    next_sink_id: SinkId,
    max_entries: usize,
}

struct Inner {
    state: Mutex<State>,
    wakeup: Condvar,
    written: Mutex<u64>,
    written_cond: Condvar,
    entries_logged: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Inner {
    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::Accepting,
                entries: VecDeque::new(),
                sinks: HashMap::new(),
                next_sink_id: 0,
                max_entries: 100,
            }),
            wakeup: Condvar::new(),
            written: Mutex::new(0),
            written_cond: Condvar::new(),
            entries_logged: AtomicU64::new(0),
        }
    }

    fn advance_written(&self, n: u64) {
        let mut w = lock(&self.written);
        *w += n;
        self.written_cond.notify_all();
    }

    fn run(&self) {
        loop {
            let (batch, sinks, phase) = {
                let mut st = lock(&self.state);
                loop {
                    let ready = st.phase != Phase::Accepting
                        || (!st.sinks.is_empty() && !st.entries.is_empty());
                    if ready {
                        break;
                    }
                    st = self
                        .wakeup
                        .wait(st)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }

                let phase = st.phase;
                let batch: Vec<_> = if st.sinks.is_empty() {
                    Vec::new()
                } else {
                    st.entries.drain(..).collect()
                };
                // snapshot so sinks run without the state lock held
                let sinks: Vec<Sink> = st.sinks.values().cloned().collect();
                (batch, sinks, phase)
            };

            let delivered = batch.len() as u64;
            for (level, entry) in batch {
                let line = entry();
                for sink in &sinks {
                    let _ = sink(level, &line);
                }
            }
            if delivered > 0 {
                self.advance_written(delivered);
            }

            if phase != Phase::Accepting {
                // draining with no sinks: discard what is left
                let leftover = {
                    let mut st = lock(&self.state);
                    let n = st.entries.len() as u64;
                    st.entries.clear();
                    n
                };
                if leftover > 0 {
                    self.advance_written(leftover);
                }
                return;
            }
        }
    }
}

/// The asynchronous logger; see the [module docs](self) for the contract.
pub struct Logger {
    inner: Arc<Inner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Logger {
    fn start() -> Self {
        let inner = Arc::new(Inner::new());
        let worker = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("piv-log".into())
                .spawn(move || inner.run())
        };

        let thread = match worker {
            Ok(handle) => Some(handle),
            Err(_) => {
                // no worker: refuse entries instead of queueing forever
                lock(&inner.state).phase = Phase::Stopped;
                None
            }
        };

        Self {
            inner,
            thread: Mutex::new(thread),
        }
    }

    /// Submits an entry. `entry` is invoked later, on the logging thread;
    /// capture argument values by move. Returns the entry's monotonic id,
    /// or 0 when the logger is not accepting.
    pub fn add<F>(&self, level: Level, entry: F) -> EntryId
    where
        F: FnOnce() -> String + Send + 'static,
    {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let tid = std::thread::current().id();

        let dropped;
        let id;
        {
            let mut st = lock(&self.inner.state);
            if st.phase != Phase::Accepting {
                return 0;
            }
            id = self.inner.entries_logged.fetch_add(1, Ordering::Relaxed) + 1;

            let line: EntryFn =
                Box::new(move || format!("[{micros}] ({tid:?}) {level}: {}", entry()));
            st.entries.push_back((level, line));

            let mut n = 0;
            while st.entries.len() > st.max_entries {
                st.entries.pop_front();
                n += 1;
            }
            dropped = n;
        }

        if dropped > 0 {
            // overflowed entries count as written so waiters cannot hang
            self.inner.advance_written(dropped);
        }
        self.inner.wakeup.notify_all();
        id
    }

    /// Registers a sink and returns its id. Entries queued while no sink
    /// existed are delivered once the first sink arrives.
    pub fn add_sink<F>(&self, sink: F) -> SinkId
    where
        F: Fn(Level, &str) -> bool + Send + Sync + 'static,
    {
        let id = {
            let mut st = lock(&self.inner.state);
            let id = st.next_sink_id;
            st.next_sink_id += 1;
            st.sinks.insert(id, Arc::new(sink));
            id
        };
        self.inner.wakeup.notify_all();
        id
    }

    /// Removes a sink; returns `false` if the id was unknown.
    pub fn remove_sink(&self, id: SinkId) -> bool {
        lock(&self.inner.state).sinks.remove(&id).is_some()
    }

    /// Changes the bounded queue capacity.
    pub fn set_max_entries(&self, n: usize) {
        lock(&self.inner.state).max_entries = n;
    }

    /// Blocks until entry `id` has been delivered to every sink that was
    /// registered at delivery time (or discarded by overflow/shutdown).
    pub fn wait_until_written(&self, id: EntryId) {
        let mut w = lock(&self.inner.written);
        while *w < id {
            w = self
                .inner
                .written_cond
                .wait(w)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Stops accepting entries, flushes what can be flushed and joins the
    /// logging thread. Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut st = lock(&self.inner.state);
            if st.phase != Phase::Accepting {
                return;
            }
            st.phase = Phase::Draining;
        }
        self.inner.wakeup.notify_all();

        if let Some(handle) = lock(&self.thread).take() {
            let _ = handle.join();
        }
        lock(&self.inner.state).phase = Phase::Stopped;
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// The process-global logger, started on first use.
pub fn global() -> &'static Logger {
    LOGGER.get_or_init(Logger::start)
}

/// Submits a `FATAL` entry to the global logger.
#[macro_export]
macro_rules! log_fatal {
    ($($arg:tt)*) => {
        $crate::log::global().add($crate::log::Level::Fatal, move || format!($($arg)*))
    };
}

/// Submits an `ERROR` entry to the global logger.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log::global().add($crate::log::Level::Error, move || format!($($arg)*))
    };
}

/// Submits a `WARN` entry to the global logger.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log::global().add($crate::log::Level::Warn, move || format!($($arg)*))
    };
}

/// Submits an `INFO` entry to the global logger.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log::global().add($crate::log::Level::Info, move || format!($($arg)*))
    };
}

/// Submits a `DEBUG` entry to the global logger.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log::global().add($crate::log::Level::Debug, move || format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // the global logger is shared by the whole test binary, so these
    // tests use private sinks and ids rather than asserting on totals

    #[test]
    fn test_entries_reach_sink_in_order() {
        let logger = global();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink_seen = Arc::clone(&seen);
        let sink = logger.add_sink(move |level, line: &str| {
            if line.contains("order-test") {
                lock(&sink_seen).push((level, line.to_string()));
            }
            true
        });

        let mut last = 0;
        for i in 0..5 {
            last = logger.add(Level::Info, move || format!("order-test {i}"));
            assert!(last > 0);
        }
        logger.wait_until_written(last);

        let seen = lock(&seen);
        assert_eq!(seen.len(), 5);
        for (i, (level, line)) in seen.iter().enumerate() {
            assert_eq!(*level, Level::Info);
            assert!(line.contains(&format!("order-test {i}")));
            assert!(line.contains("INFO"));
        }
        drop(seen);
        assert!(logger.remove_sink(sink));
        assert!(!logger.remove_sink(sink));
    }

    #[test]
    fn test_entry_ids_are_monotonic() {
        let logger = global();
        let a = logger.add(Level::Debug, || String::from("a"));
        let b = logger.add(Level::Debug, || String::from("b"));
        assert!(b > a);
    }

    #[test]
    fn test_deferred_formatting_captures_values() {
        let logger = global();
        let captured = Arc::new(Mutex::new(String::new()));

        let sink_captured = Arc::clone(&captured);
        let sink = logger.add_sink(move |_, line: &str| {
            if line.contains("capture-test") {
                *lock(&sink_captured) = line.to_string();
            }
            true
        });

        let mut value = 41;
        value += 1;
        let id = logger.add(Level::Warn, move || format!("capture-test {value}"));
        logger.wait_until_written(id);

        assert!(lock(&captured).contains("capture-test 42"));
        logger.remove_sink(sink);
    }

    #[test]
    fn test_level_display() {
        assert_eq!(Level::Fatal.to_string(), "FATAL");
        assert_eq!(Level::Test.to_string(), "TEST");
        assert!(Level::Fatal < Level::Debug);
    }
}

//! Replaceable, process-global output streams.
//!
//! Code that writes through a [`RuntimeStream`] instead of a raw descriptor can
//! be captured independently of fd 1 / fd 2. The stream handle is cheap to
//! clone; every clone shares the same slot, so replacing the writer affects
//! all of them at once.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

/// Writer currently installed in a stream slot.
pub type BoxedWriter = Box<dyn Write + Send>;

struct Slot {
    name: String,
    writer: Mutex<BoxedWriter>,
}

/// Shared handle to a replaceable output stream.
#[derive(Clone)]
pub struct RuntimeStream {
    slot: Arc<Slot>,
}

static STDOUT: LazyLock<RuntimeStream> =
    LazyLock::new(|| RuntimeStream::new("stdout", Box::new(io::stdout())));
static STDERR: LazyLock<RuntimeStream> =
    LazyLock::new(|| RuntimeStream::new("stderr", Box::new(io::stderr())));

/// The process-wide runtime stdout stream. Initially writes to `std::io::stdout()`.
pub fn stdout() -> RuntimeStream {
    STDOUT.clone()
}

/// The process-wide runtime stderr stream. Initially writes to `std::io::stderr()`.
pub fn stderr() -> RuntimeStream {
    STDERR.clone()
}

impl RuntimeStream {
    pub fn new(name: impl Into<String>, writer: BoxedWriter) -> Self {
        Self {
            slot: Arc::new(Slot {
                name: name.into(),
                writer: Mutex::new(writer),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Install `writer` and hand back the one it displaced.
    pub fn replace(&self, writer: BoxedWriter) -> BoxedWriter {
        std::mem::replace(&mut *self.lock(), writer)
    }

    /// True when both handles refer to the same slot.
    pub fn same_stream(&self, other: &RuntimeStream) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Stable identity of the slot, used to claim it for a session.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.slot) as usize
    }

    fn lock(&self) -> MutexGuard<'_, BoxedWriter> {
        // A writer that panicked mid-write leaves the slot usable.
        self.slot
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for RuntimeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.lock().write_all(buf)
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        self.lock().write_fmt(args)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

impl fmt::Debug for RuntimeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeStream")
            .field("name", &self.slot.name)
            .finish_non_exhaustive()
    }
}

/// Write a line to the runtime stdout stream, ignoring write errors.
#[macro_export]
macro_rules! outln {
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        let _ = ::std::writeln!($crate::io::runtime::stdout(), $($arg)*);
    }};
}

/// Write a line to the runtime stderr stream, ignoring write errors.
#[macro_export]
macro_rules! errln {
    ($($arg:tt)*) => {{
        use ::std::io::Write as _;
        let _ = ::std::writeln!($crate::io::runtime::stderr(), $($arg)*);
    }};
}

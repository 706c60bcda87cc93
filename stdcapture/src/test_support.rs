//! Test-only helpers for capture sessions.
//!
//! Tests capture file-backed descriptors and private runtime streams rather
//! than fd 1 / fd 2, so they can run in parallel without stepping on each
//! other or on the test harness.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex};

use crate::io::runtime::RuntimeStream;
use crate::session::Redirect;

/// In-memory writer whose clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runtime stream writing into a fresh [`SharedBuffer`].
pub fn buffer_stream(name: &str) -> (RuntimeStream, SharedBuffer) {
    let buffer = SharedBuffer::default();
    (RuntimeStream::new(name, Box::new(buffer.clone())), buffer)
}

/// Anonymous temp file standing in for a native output descriptor.
#[derive(Debug)]
pub struct FdTarget {
    file: File,
}

impl FdTarget {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Write through the descriptor number, wherever it currently points.
    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        (&self.file).write_all(bytes)
    }

    /// Everything that reached the file itself.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Four private targets: two temp-file descriptors and two buffer streams.
#[derive(Debug)]
pub struct Targets {
    pub native_out: FdTarget,
    pub native_err: FdTarget,
    pub runtime_out: RuntimeStream,
    pub runtime_out_sink: SharedBuffer,
    pub runtime_err: RuntimeStream,
    pub runtime_err_sink: SharedBuffer,
}

impl Targets {
    pub fn new() -> io::Result<Self> {
        let (runtime_out, runtime_out_sink) = buffer_stream("test-out");
        let (runtime_err, runtime_err_sink) = buffer_stream("test-err");
        Ok(Self {
            native_out: FdTarget::new()?,
            native_err: FdTarget::new()?,
            runtime_out,
            runtime_out_sink,
            runtime_err,
            runtime_err_sink,
        })
    }

    /// A redirect over these targets instead of the process defaults.
    pub fn redirect(&self) -> Redirect {
        Redirect::new()
            .native_out(Some(self.native_out.fd()))
            .native_err(Some(self.native_err.fd()))
            .runtime_out(Some(self.runtime_out.clone()))
            .runtime_err(Some(self.runtime_err.clone()))
    }
}

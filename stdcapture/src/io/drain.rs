//! Drain workers: one thread per capture group emptying its pipe into memory.
//!
//! Workers never log. While they run, the runtime streams may point at the
//! very pipes they drain; diagnostics are emitted from [`DrainWorker::join`]
//! once destinations are restored.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::OwnedFd;
use std::thread;

use tracing::debug;

use crate::error::CaptureError;

/// Default size of a single pipe read.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Handle to a running drain thread.
#[derive(Debug)]
pub struct DrainWorker {
    group: usize,
    handle: thread::JoinHandle<io::Result<Drained>>,
}

impl DrainWorker {
    /// Start draining `read` on a dedicated thread.
    ///
    /// The thread owns the read end and closes it once every write end is gone.
    pub fn spawn(group: usize, read: OwnedFd, chunk_size: usize) -> Result<Self, CaptureError> {
        let handle = thread::Builder::new()
            .name(format!("stdcapture-drain-{group}"))
            .spawn(move || drain(File::from(read), chunk_size))
            .map_err(|err| CaptureError::resource(format!("spawn drain worker {group}"), err))?;
        Ok(Self { group, handle })
    }

    pub fn group(&self) -> usize {
        self.group
    }

    /// Wait for end-of-stream and take the accumulated bytes.
    pub fn join(self) -> Result<Vec<u8>, CaptureError> {
        let group = self.group;
        match self.handle.join() {
            Ok(Ok(drained)) => {
                debug!(
                    group,
                    chunks = drained.chunks,
                    bytes = drained.bytes.len(),
                    "drain worker finished"
                );
                Ok(drained.bytes)
            }
            Ok(Err(err)) => Err(CaptureError::restore(
                format!("drain pipe for group {group}"),
                err,
            )),
            Err(_) => Err(CaptureError::restore(
                format!("join drain worker {group}"),
                io::Error::other("drain worker panicked"),
            )),
        }
    }
}

/// Bytes read by one worker and the number of reads that produced them.
#[derive(Debug, Default)]
struct Drained {
    bytes: Vec<u8>,
    chunks: usize,
}

fn drain<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Drained> {
    let mut drained = Drained::default();
    let mut chunk = vec![0u8; chunk_size];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        drained.chunks += 1;
        drained.bytes.extend_from_slice(&chunk[..n]);
    }

    Ok(drained)
}

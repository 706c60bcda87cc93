//! Capture sessions: configuration, entry, and exit.
//!
//! A [`Redirect`] is a reusable description of which channels to capture and
//! how to group them. Each call to [`Redirect::enter`] builds a fresh
//! [`ActiveCapture`] with its own pipes and drain workers; finishing or
//! dropping it puts every destination back.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{OwnedFd, RawFd};

use tracing::{debug, error, instrument, warn};

use crate::core::demux::{CaptureOutput, demultiplex};
use crate::core::topology::{Topology, resolve};
use crate::core::types::{JoinFlags, LogicalChannel};
use crate::error::CaptureError;
use crate::io::claims::{Claim, Target};
use crate::io::drain::{DEFAULT_CHUNK_SIZE, DrainWorker};
use crate::io::native::{GroupPipe, SavedDescriptor, group_pipe};
use crate::io::runtime::{self, BoxedWriter, RuntimeStream};

/// Capture configuration.
///
/// Defaults redirect fd 1, fd 2, [`runtime::stdout`] and [`runtime::stderr`]
/// into a single group.
#[derive(Debug, Clone)]
pub struct Redirect {
    native_out: Option<RawFd>,
    native_err: Option<RawFd>,
    runtime_out: Option<RuntimeStream>,
    runtime_err: Option<RuntimeStream>,
    topology: Topology,
    chunk_size: usize,
    #[cfg(any(test, feature = "test-support"))]
    fail_entry_after: Option<usize>,
}

enum ChannelTarget<'a> {
    Native(RawFd),
    Runtime(&'a RuntimeStream),
}

impl Default for Redirect {
    fn default() -> Self {
        Self::new()
    }
}

impl Redirect {
    pub fn new() -> Self {
        Self {
            native_out: Some(1),
            native_err: Some(2),
            runtime_out: Some(runtime::stdout()),
            runtime_err: Some(runtime::stderr()),
            topology: resolve(JoinFlags::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            #[cfg(any(test, feature = "test-support"))]
            fail_entry_after: None,
        }
    }

    /// Descriptor to capture as native-out; `None` leaves it alone.
    pub fn native_out(mut self, fd: Option<RawFd>) -> Self {
        self.native_out = fd;
        self
    }

    pub fn native_err(mut self, fd: Option<RawFd>) -> Self {
        self.native_err = fd;
        self
    }

    /// Stream to capture as runtime-out; `None` leaves it alone.
    pub fn runtime_out(mut self, stream: Option<RuntimeStream>) -> Self {
        self.runtime_out = stream;
        self
    }

    pub fn runtime_err(mut self, stream: Option<RuntimeStream>) -> Self {
        self.runtime_err = stream;
        self
    }

    /// Group channels according to `flags`.
    pub fn join(mut self, flags: JoinFlags) -> Self {
        self.topology = resolve(flags);
        self
    }

    /// Use an explicit grouping instead of join flags.
    pub fn groups(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Size of each pipe read performed by the drain workers.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Make entry fail once `groups` capture groups are fully redirected.
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_entry_after(mut self, groups: usize) -> Self {
        self.fail_entry_after = Some(groups);
        self
    }

    #[cfg(any(test, feature = "test-support"))]
    fn check_entry_failure(&self, redirected: usize) -> Result<(), CaptureError> {
        if self.fail_entry_after == Some(redirected) {
            return Err(CaptureError::resource(
                format!("redirect group {}", redirected - 1),
                io::Error::other("entry failure requested"),
            ));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "test-support")))]
    fn check_entry_failure(&self, _redirected: usize) -> Result<(), CaptureError> {
        Ok(())
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Whether `channel` will be redirected.
    pub fn is_active(&self, channel: LogicalChannel) -> bool {
        self.target(channel).is_some()
    }

    fn target(&self, channel: LogicalChannel) -> Option<ChannelTarget<'_>> {
        match channel {
            LogicalChannel::NativeOut => self.native_out.map(ChannelTarget::Native),
            LogicalChannel::NativeErr => self.native_err.map(ChannelTarget::Native),
            LogicalChannel::RuntimeOut => self.runtime_out.as_ref().map(ChannelTarget::Runtime),
            LogicalChannel::RuntimeErr => self.runtime_err.as_ref().map(ChannelTarget::Runtime),
        }
    }

    fn active(&self) -> [bool; 4] {
        LogicalChannel::ALL.map(|channel| self.is_active(channel))
    }

    fn claim_target(&self, channel: LogicalChannel) -> Option<Target> {
        match self.target(channel)? {
            ChannelTarget::Native(fd) => Some(Target::Descriptor(fd)),
            ChannelTarget::Runtime(stream) => Some(Target::Stream(stream.id())),
        }
    }

    fn runtime_streams(&self) -> Vec<RuntimeStream> {
        let mut streams: Vec<RuntimeStream> = Vec::new();
        for stream in [&self.runtime_out, &self.runtime_err].into_iter().flatten() {
            if !streams.iter().any(|known| known.same_stream(stream)) {
                streams.push(stream.clone());
            }
        }
        streams
    }

    /// Reject configurations that cannot be redirected consistently.
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.topology.validate()?;
        if self.chunk_size == 0 {
            return Err(CaptureError::Configuration(
                "chunk size must be > 0".to_string(),
            ));
        }
        for (channel, fd) in [
            (LogicalChannel::NativeOut, self.native_out),
            (LogicalChannel::NativeErr, self.native_err),
        ] {
            if let Some(fd) = fd
                && fd < 0
            {
                return Err(CaptureError::Configuration(format!(
                    "{channel} descriptor {fd} is negative"
                )));
            }
        }

        // Two channels writing to one target can only feed one pipe.
        for (i, a) in LogicalChannel::ALL.iter().enumerate() {
            for b in &LogicalChannel::ALL[i + 1..] {
                let (Some(ta), Some(tb)) = (self.claim_target(*a), self.claim_target(*b)) else {
                    continue;
                };
                if ta == tb && self.topology.group_of(*a) != self.topology.group_of(*b) {
                    return Err(CaptureError::Configuration(format!(
                        "{a} and {b} share a target but are in different groups"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Flush Rust's std handles and every configured runtime stream.
    pub fn flush(&self) -> io::Result<()> {
        flush_all(&self.runtime_streams())
    }

    /// Redirect every active channel and start the drain workers.
    ///
    /// On error nothing stays redirected and no target stays claimed.
    #[instrument(skip_all, fields(groups = self.topology.len()))]
    pub fn enter(&self) -> Result<ActiveCapture, CaptureError> {
        self.validate()?;
        let requests: Vec<(LogicalChannel, Target)> = LogicalChannel::ALL
            .iter()
            .filter_map(|channel| Some((*channel, self.claim_target(*channel)?)))
            .collect();
        let claim = Claim::acquire(&requests)?;

        let streams = self.runtime_streams();
        if let Err(err) = flush_all(&streams) {
            warn!(err = %err, "flush before capture failed");
        }
        debug!(active = ?self.active(), "entering capture session");

        let mut state = SessionState {
            topology: self.topology.clone(),
            active: self.active(),
            streams,
            write_ends: Vec::new(),
            workers: Vec::new(),
            saved_native: Vec::new(),
            saved_runtime: Vec::new(),
            _claim: claim,
        };

        if let Err(err) = self.redirect(&mut state) {
            if let Err(cleanup) = state.unwind() {
                error!(err = %cleanup, "cleanup after failed entry also failed");
            }
            warn!(err = %err, "capture entry failed");
            return Err(err);
        }

        Ok(ActiveCapture { state: Some(state) })
    }

    fn redirect(&self, state: &mut SessionState) -> Result<(), CaptureError> {
        let natives: BTreeSet<RawFd> = [self.native_out, self.native_err]
            .into_iter()
            .flatten()
            .collect();
        for fd in natives {
            state.saved_native.push(SavedDescriptor::save(fd)?);
        }

        for (index, group) in self.topology.groups().iter().enumerate() {
            let GroupPipe { read, write } = group_pipe()?;
            state
                .workers
                .push(DrainWorker::spawn(index, read, self.chunk_size)?);

            for channel in group.channels() {
                match self.target(*channel) {
                    None => {}
                    Some(ChannelTarget::Native(fd)) => {
                        let saved = state
                            .saved_native
                            .iter()
                            .find(|saved| saved.target() == fd)
                            .ok_or_else(|| {
                                CaptureError::Configuration(format!(
                                    "{channel} descriptor {fd} was not saved"
                                ))
                            })?;
                        saved.retarget(&write)?;
                    }
                    Some(ChannelTarget::Runtime(stream)) => {
                        if state
                            .saved_runtime
                            .iter()
                            .any(|(known, _)| known.same_stream(stream))
                        {
                            continue;
                        }
                        let handle = pipe_writer(&write, *channel)?;
                        let previous = stream.replace(handle);
                        state.saved_runtime.push((stream.clone(), previous));
                    }
                }
            }
            state.write_ends.push(write);
            self.check_entry_failure(index + 1)?;
        }
        Ok(())
    }

    /// Run `f` inside a session and return its value with the captured output.
    ///
    /// If `f` panics, destinations are restored before the panic continues.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> Result<(T, CaptureOutput), CaptureError> {
        let session = self.enter()?;
        let value = f();
        let output = session.finish()?;
        Ok((value, output))
    }
}

fn pipe_writer(write: &OwnedFd, channel: LogicalChannel) -> Result<BoxedWriter, CaptureError> {
    let handle = write
        .try_clone()
        .map_err(|err| CaptureError::resource(format!("duplicate pipe for {channel}"), err))?;
    Ok(Box::new(File::from(handle)))
}

fn flush_all(streams: &[RuntimeStream]) -> io::Result<()> {
    let mut result = io::stdout().flush().and(io::stderr().flush());
    for stream in streams {
        let mut stream = stream.clone();
        result = result.and(stream.flush());
    }
    result
}

/// A live capture session.
///
/// Call [`ActiveCapture::finish`] to restore destinations and collect the
/// output. Dropping the session without finishing restores destinations and
/// discards the output.
#[derive(Debug)]
pub struct ActiveCapture {
    state: Option<SessionState>,
}

impl ActiveCapture {
    #[instrument(skip_all)]
    pub fn finish(mut self) -> Result<CaptureOutput, CaptureError> {
        let state = self.state.take().ok_or_else(|| {
            CaptureError::Configuration("capture session already finished".to_string())
        })?;
        let topology = state.topology.clone();
        let active = state.active;
        let buffers = state.unwind()?;
        Ok(demultiplex(&topology, active, buffers))
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        if let Some(state) = self.state.take()
            && let Err(err) = state.unwind()
        {
            error!(err = %err, "capture session cleanup failed");
        }
    }
}

struct SessionState {
    topology: Topology,
    active: [bool; 4],
    streams: Vec<RuntimeStream>,
    write_ends: Vec<OwnedFd>,
    workers: Vec<DrainWorker>,
    saved_native: Vec<SavedDescriptor>,
    saved_runtime: Vec<(RuntimeStream, BoxedWriter)>,
    _claim: Claim,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("topology", &self.topology)
            .field("active", &self.active)
            .field("workers", &self.workers.len())
            .field("saved_native", &self.saved_native)
            .finish_non_exhaustive()
    }
}

impl SessionState {
    /// Undo every redirection and join the workers.
    ///
    /// Every step runs even if an earlier one failed. Returns one buffer per
    /// spawned worker, or the first failure.
    fn unwind(mut self) -> Result<Vec<Vec<u8>>, CaptureError> {
        let flushed = flush_all(&self.streams);

        self.write_ends.clear();

        for (stream, previous) in self.saved_runtime.drain(..).rev() {
            drop(stream.replace(previous));
        }

        let mut failures = Vec::new();
        for saved in self.saved_native.drain(..) {
            if let Err(err) = saved.restore() {
                failures.push(err);
            }
        }

        // Destinations are back; logging from here on reaches them.
        if let Err(err) = flushed {
            warn!(err = %err, "flush before restore failed");
        }

        let mut buffers = Vec::with_capacity(self.workers.len());
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(bytes) => buffers.push(bytes),
                Err(err) => {
                    failures.push(err);
                    buffers.push(Vec::new());
                }
            }
        }

        let total: usize = buffers.iter().map(Vec::len).sum();
        debug!(groups = buffers.len(), bytes = total, "capture session closed");

        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(buffers),
            Some(first) => {
                for err in failures {
                    error!(err = %err, "additional capture cleanup failure");
                }
                Err(first)
            }
        }
    }
}

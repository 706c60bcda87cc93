//! Reassembly of per-group buffers into per-channel results.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::topology::Topology;
use crate::core::types::{LogicalChannel, Side};

/// Bytes captured by one finished session.
///
/// Only channels that were actually redirected have an entry. Channels that
/// shared a group hold identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureOutput {
    channels: BTreeMap<LogicalChannel, Vec<u8>>,
    out: Option<Vec<u8>>,
    err: Option<Vec<u8>>,
}

impl CaptureOutput {
    pub fn get(&self, channel: LogicalChannel) -> Option<&[u8]> {
        self.channels.get(&channel).map(Vec::as_slice)
    }

    pub fn get_lossy(&self, channel: LogicalChannel) -> Option<Cow<'_, str>> {
        self.get(channel).map(String::from_utf8_lossy)
    }

    /// Combined out-side capture, present when native-out and runtime-out were
    /// both captured into the same group.
    pub fn out(&self) -> Option<&[u8]> {
        self.out.as_deref()
    }

    /// Combined err-side capture; see [`CaptureOutput::out`].
    pub fn err(&self) -> Option<&[u8]> {
        self.err.as_deref()
    }

    pub fn channels(&self) -> impl Iterator<Item = (LogicalChannel, &[u8])> {
        self.channels
            .iter()
            .map(|(channel, bytes)| (*channel, bytes.as_slice()))
    }
}

/// Copy each group's buffer into a slot for every active channel of the group.
///
/// `buffers[i]` holds the bytes drained for `topology.groups()[i]`. `active`
/// is indexed by [`LogicalChannel::index`].
pub fn demultiplex(topology: &Topology, active: [bool; 4], buffers: Vec<Vec<u8>>) -> CaptureOutput {
    let mut output = CaptureOutput::default();

    for (group, buffer) in topology.groups().iter().zip(buffers) {
        for channel in group.channels() {
            if active[channel.index()] {
                output.channels.insert(*channel, buffer.clone());
            }
        }
    }

    output.out = side_alias(topology, active, Side::Out, &output.channels);
    output.err = side_alias(topology, active, Side::Err, &output.channels);
    output
}

fn side_alias(
    topology: &Topology,
    active: [bool; 4],
    side: Side,
    channels: &BTreeMap<LogicalChannel, Vec<u8>>,
) -> Option<Vec<u8>> {
    let (native, runtime) = match side {
        Side::Out => (LogicalChannel::NativeOut, LogicalChannel::RuntimeOut),
        Side::Err => (LogicalChannel::NativeErr, LogicalChannel::RuntimeErr),
    };
    if !active[native.index()] || !active[runtime.index()] {
        return None;
    }
    let group = topology.group_of(native)?;
    if topology.group_of(runtime) != Some(group) {
        return None;
    }
    channels.get(&native).cloned()
}

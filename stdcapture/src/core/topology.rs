//! Resolution of join flags into capture groups.

use serde::Serialize;

use crate::core::invariants::partition_violations;
use crate::core::types::{CaptureGroup, JoinFlags, LogicalChannel};
use crate::error::CaptureError;

/// Ordered partition of the four channels. Group index doubles as the buffer
/// index for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Topology {
    groups: Vec<CaptureGroup>,
}

impl Topology {
    /// Build an explicit grouping, rejecting anything that is not a partition
    /// of the four channels.
    pub fn from_groups(groups: Vec<Vec<LogicalChannel>>) -> Result<Self, CaptureError> {
        let topology = Self {
            groups: groups.into_iter().map(CaptureGroup::new).collect(),
        };
        topology.validate()?;
        Ok(topology)
    }

    pub fn groups(&self) -> &[CaptureGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Index of the group holding `channel`.
    pub fn group_of(&self, channel: LogicalChannel) -> Option<usize> {
        self.groups.iter().position(|group| group.contains(channel))
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        let errors = partition_violations(&self.groups);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CaptureError::Configuration(errors.join("; ")))
        }
    }
}

/// Map join flags to capture groups.
///
/// Once `out_err` is combined with either pair join, all four channels share
/// one group; there is no partial grouping in between.
pub fn resolve(flags: JoinFlags) -> Topology {
    use LogicalChannel::{NativeErr, NativeOut, RuntimeErr, RuntimeOut};

    let flags = flags.effective();
    let mut groups = Vec::with_capacity(4);

    if flags.out_err && (flags.out || flags.err) {
        groups.push(CaptureGroup::new(vec![
            NativeOut, NativeErr, RuntimeOut, RuntimeErr,
        ]));
        return Topology { groups };
    }

    if flags.out {
        groups.push(CaptureGroup::new(vec![NativeOut, RuntimeOut]));
    } else {
        groups.push(CaptureGroup::new(vec![NativeOut]));
        groups.push(CaptureGroup::new(vec![RuntimeOut]));
    }

    if flags.err {
        groups.push(CaptureGroup::new(vec![NativeErr, RuntimeErr]));
    } else {
        groups.push(CaptureGroup::new(vec![NativeErr]));
        groups.push(CaptureGroup::new(vec![RuntimeErr]));
    }

    Topology { groups }
}

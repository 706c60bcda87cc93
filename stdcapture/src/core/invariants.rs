//! Invariant checks for capture groupings.

use crate::core::types::{CaptureGroup, LogicalChannel};

/// Return every way `groups` fails to partition the four channels.
///
/// An empty result means each channel appears in exactly one non-empty group.
pub fn partition_violations(groups: &[CaptureGroup]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = [0usize; 4];

    for (index, group) in groups.iter().enumerate() {
        if group.channels().is_empty() {
            errors.push(format!("group {index} is empty"));
        }
        for channel in group.channels() {
            seen[channel.index()] += 1;
        }
    }

    for channel in LogicalChannel::ALL {
        match seen[channel.index()] {
            0 => errors.push(format!("{channel} is not assigned to any group")),
            1 => {}
            count => errors.push(format!("{channel} appears in {count} groups")),
        }
    }

    errors
}

//! Process-wide registry of redirected targets.
//!
//! Descriptor numbers and runtime stream slots are global state. A live session
//! claims every target it redirects; a second session asking for any of them
//! is rejected until the first releases its claim.

use std::collections::HashSet;
use std::os::fd::RawFd;
use std::sync::{LazyLock, Mutex, MutexGuard};

use tracing::debug;

use crate::core::types::LogicalChannel;
use crate::error::CaptureError;

/// A redirectable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Descriptor(RawFd),
    Stream(usize),
}

impl Target {
    fn describe(self) -> String {
        match self {
            Target::Descriptor(fd) => format!("fd {fd}"),
            Target::Stream(id) => format!("runtime stream {id:#x}"),
        }
    }
}

static CLAIMED: LazyLock<Mutex<HashSet<Target>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

fn claimed() -> MutexGuard<'static, HashSet<Target>> {
    CLAIMED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Targets owned by one session; released on drop.
#[derive(Debug)]
pub struct Claim {
    targets: Vec<Target>,
}

impl Claim {
    /// Claim every target in `requests` or none of them.
    ///
    /// Several channels of the same session may name one target; it is
    /// claimed once.
    pub fn acquire(requests: &[(LogicalChannel, Target)]) -> Result<Self, CaptureError> {
        let mut registry = claimed();
        if let Some((channel, target)) = requests
            .iter()
            .find(|(_, target)| registry.contains(target))
        {
            return Err(CaptureError::ChannelBusy {
                channel: *channel,
                target: target.describe(),
            });
        }

        let mut targets = Vec::with_capacity(requests.len());
        for (_, target) in requests {
            if registry.insert(*target) {
                targets.push(*target);
            }
        }
        debug!(?targets, "claimed capture targets");
        Ok(Self { targets })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut registry = claimed();
        for target in &self.targets {
            registry.remove(target);
        }
    }
}

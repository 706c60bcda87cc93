//! Shared deterministic types for the capture engine.
//!
//! These types define the vocabulary between the pure topology logic and the
//! side-effecting redirector. They carry no OS state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which stream a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Out,
    Err,
}

/// Which surface a channel is written through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// File-descriptor level output.
    Native,
    /// Output written through a replaceable [`RuntimeStream`](crate::io::runtime::RuntimeStream).
    Runtime,
}

/// One of the four independently redirectable output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalChannel {
    NativeOut,
    NativeErr,
    RuntimeOut,
    RuntimeErr,
}

impl LogicalChannel {
    /// Every channel, in canonical order.
    pub const ALL: [LogicalChannel; 4] = [
        LogicalChannel::NativeOut,
        LogicalChannel::NativeErr,
        LogicalChannel::RuntimeOut,
        LogicalChannel::RuntimeErr,
    ];

    pub fn side(self) -> Side {
        match self {
            LogicalChannel::NativeOut | LogicalChannel::RuntimeOut => Side::Out,
            LogicalChannel::NativeErr | LogicalChannel::RuntimeErr => Side::Err,
        }
    }

    pub fn layer(self) -> Layer {
        match self {
            LogicalChannel::NativeOut | LogicalChannel::NativeErr => Layer::Native,
            LogicalChannel::RuntimeOut | LogicalChannel::RuntimeErr => Layer::Runtime,
        }
    }

    /// Position in [`LogicalChannel::ALL`].
    pub fn index(self) -> usize {
        match self {
            LogicalChannel::NativeOut => 0,
            LogicalChannel::NativeErr => 1,
            LogicalChannel::RuntimeOut => 2,
            LogicalChannel::RuntimeErr => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogicalChannel::NativeOut => "native-out",
            LogicalChannel::NativeErr => "native-err",
            LogicalChannel::RuntimeOut => "runtime-out",
            LogicalChannel::RuntimeErr => "runtime-err",
        }
    }
}

impl fmt::Display for LogicalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping flags fed to the topology resolver.
///
/// `all = false` disables every other join. Defaults join everything into a
/// single group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinFlags {
    /// Master switch; when false the three joins below are ignored.
    pub all: bool,
    /// Join the out side with the err side.
    pub out_err: bool,
    /// Join native-out with runtime-out.
    pub out: bool,
    /// Join native-err with runtime-err.
    pub err: bool,
}

impl Default for JoinFlags {
    fn default() -> Self {
        Self {
            all: true,
            out_err: true,
            out: true,
            err: true,
        }
    }
}

impl JoinFlags {
    /// No channels joined: four independent groups.
    pub fn separate() -> Self {
        Self {
            all: false,
            ..Self::default()
        }
    }

    /// Flags after applying the `all` master switch.
    pub fn effective(self) -> Self {
        if self.all {
            self
        } else {
            Self {
                all: false,
                out_err: false,
                out: false,
                err: false,
            }
        }
    }
}

/// An ordered set of channels sharing one pipe and one buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CaptureGroup {
    channels: Vec<LogicalChannel>,
}

impl CaptureGroup {
    pub fn new(channels: Vec<LogicalChannel>) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &[LogicalChannel] {
        &self.channels
    }

    pub fn contains(&self, channel: LogicalChannel) -> bool {
        self.channels.contains(&channel)
    }
}

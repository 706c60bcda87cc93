//! Error type for capture sessions.

use std::io;

use crate::core::types::LogicalChannel;

/// Errors surfaced by [`Redirect`](crate::session::Redirect) and
/// [`ActiveCapture`](crate::session::ActiveCapture).
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// A descriptor, pipe, or worker could not be created while entering a
    /// session. Everything done by that entry attempt has been undone.
    #[error("failed to {context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A destination could not be restored, or a drain worker failed, while
    /// leaving a session. Remaining cleanup still ran.
    #[error("failed to {context}: {source}")]
    Restore {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The channel/group mapping or another option is contradictory.
    #[error("invalid capture configuration: {0}")]
    Configuration(String),

    /// The target is owned by another live session.
    #[error("{channel} target {target} is already captured by another session")]
    ChannelBusy {
        channel: LogicalChannel,
        target: String,
    },
}

impl CaptureError {
    pub(crate) fn resource(context: impl Into<String>, source: impl Into<io::Error>) -> Self {
        CaptureError::Resource {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn restore(context: impl Into<String>, source: impl Into<io::Error>) -> Self {
        CaptureError::Restore {
            context: context.into(),
            source: source.into(),
        }
    }
}

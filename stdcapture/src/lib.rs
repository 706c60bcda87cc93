//! In-process capture of native and runtime output streams.
//!
//! A process writes output through two surfaces per stream: raw file
//! descriptors (fd 1 / fd 2, used by `std::io::stdout()` and foreign code) and
//! replaceable [`RuntimeStream`](io::runtime::RuntimeStream) handles used by
//! higher-level code. This crate captures any combination of the four
//! channels into memory for the duration of a session:
//!
//! ```no_run
//! use stdcapture::{JoinFlags, LogicalChannel, Redirect, outln};
//!
//! let redirect = Redirect::new().join(JoinFlags::separate());
//! let ((), output) = redirect
//!     .capture(|| {
//!         println!("native");
//!         outln!("runtime");
//!     })
//!     .expect("capture");
//! assert_eq!(output.get(LogicalChannel::RuntimeOut), Some(&b"runtime\n"[..]));
//! ```
//!
//! - **[`core`]**: Pure grouping and reassembly logic.
//! - **[`io`]**: Descriptor duplication, runtime stream slots, pipes, drain threads.
//! - **[`session`]**: Entry/exit orchestration tying both together.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::demux::CaptureOutput;
pub use crate::core::topology::{Topology, resolve};
pub use crate::core::types::{JoinFlags, LogicalChannel};
pub use crate::error::CaptureError;
pub use crate::io::runtime::RuntimeStream;
pub use crate::session::{ActiveCapture, Redirect};

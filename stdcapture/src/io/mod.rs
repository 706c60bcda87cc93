//! Side-effecting pieces of the capture engine: descriptors, runtime streams,
//! pipes, and the drain threads that empty them.

pub mod claims;
pub mod config;
pub mod drain;
pub mod native;
pub mod runtime;

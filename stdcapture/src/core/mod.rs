//! Deterministic, pure logic for the capture engine.
//!
//! Core modules must be free of I/O side effects. They decide how channels are
//! grouped and how drained bytes are handed back, and are tested in isolation.

pub mod demux;
pub mod invariants;
pub mod topology;
pub mod types;

//! Integration tests that need several cores stepping together and are
//! awkward to express as a single `Cpu`-level `#[cfg(test)]` case: enclave
//! lifecycle end-to-end, LLC partitioning isolation, and the round-robin
//! driver's halt/dispatch behavior.
//!
//! Unit-level coverage (single-instruction execution, tag-check faults,
//! mailbox source-stamping) lives alongside the code it tests in `src/`, per
//! the crate's usual convention; this crate is reserved for scenarios that
//! span the driver loop.

/// Hand-encoded instruction builders and a minimal multi-core stepper that
/// mirrors `Simulator`'s own effect application, for scripting scenarios one
/// instruction at a time.
pub mod common;

/// Driver-level scenarios: enclave create/donate/switch, LLC isolation under
/// each partitioning mode, and round-robin determinism.
mod driver;

//! Small, explicit error types for the recoverable allocation boundaries.
//!
//! Contract violations and programmer misuse are not represented here; those
//! are `debug_assert!`/`assert!` failures at the call site, matching how the
//! command recorder treats a draw without an active pipeline.

/// A persistent or transient allocation could not be satisfied.
#[derive(Debug)]
pub struct OutOfMemoryError {}

/// A handle's generation did not match the slot's current generation.
#[derive(Debug)]
pub struct StaleHandleError {}

/// An `ActiveResourceRange` operation was attempted on incompatible variants.
#[derive(Debug)]
pub struct IncompatibleRangeError {}

/// The transient registry's fixed capacity was exceeded mid-frame.
#[derive(Debug)]
pub struct TransientExhaustedError {}

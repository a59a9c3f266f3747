//! Stable exit codes for harness binaries.

/// Every spec that ran passed.
pub const OK: u8 = 0;
/// At least one spec or suite reported a failure.
pub const FAILED: u8 = 1;
/// Arguments or options file were invalid; nothing ran.
pub const INVALID: u8 = 2;

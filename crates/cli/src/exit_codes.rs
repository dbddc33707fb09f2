//! Exit code registry - single source of truth for CLI exit codes.

/// Bad arguments or an unsupported file format.
pub const EXIT_USAGE: u8 = 2;
/// Config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 10;
/// Runtime failure: unreadable input, store error.
pub const EXIT_RUNTIME: u8 = 11;
/// Unrecoverable import decode failure.
pub const EXIT_IMPORT: u8 = 12;

//! Utility modules.

/// Date parsing helpers shared by adapters.
pub mod datetime;

/// Log sanitization utilities to prevent sensitive data exposure.
pub mod log_sanitizer;

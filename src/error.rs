//! Custom error types for the crate.
//!
//! Two kinds of failure live here and they are deliberately separate:
//!
//! - [`FieldError`]: fallible crate operations (configuration loading and
//!   validation, I/O, channel plumbing). These propagate with `?` in the
//!   usual way.
//! - [`FieldFault`]: the controller's visible error state. Faults never
//!   propagate as errors past the controller boundary - they are held as a
//!   `(flag, message)` pair on the field, block commits, and are overwritten
//!   by whichever event writes last.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, FieldError>;

/// Errors from fallible crate operations.
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown process variable: {0}")]
    UnknownPv(String),

    #[error("Subscription channel closed for process variable: {0}")]
    ChannelClosed(String),
}

/// The controller's visible error state.
///
/// One pair of flag and message, last-writer-wins: a later event of any kind
/// may overwrite an earlier unrelated fault. The `Display` text is exactly
/// what the field renders as its helper text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldFault {
    /// The live-value feed reported a failure.
    #[error("failed to get data")]
    Fetch,

    /// A set request could not be dispatched or no verdict was obtained.
    #[error("failed to set value")]
    Dispatch,

    /// The device rejected a set request with its own message.
    #[error("{0}")]
    Rejected(String),

    /// The edit buffer parses below the lower limit.
    #[error("too low")]
    TooLow,

    /// The edit buffer parses above the upper limit.
    #[error("too high")]
    TooHigh,
}

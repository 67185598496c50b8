//! # Ophyd Field
//!
//! This crate implements the value-reconciliation controller behind a
//! beamline device text field: a controlled numeric/string input that keeps
//! three asynchronous flows consistent - the live value pushed by the device
//! layer, the operator's in-progress edit, and the set request/response
//! exchange - while handling unit conversion, significant-figure rounding,
//! and range validation against dynamically supplied limits.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct
//! responsibility:
//!
//! - **`field`**: The core. [`field::TextFieldController`] owns the edit
//!   state, merges it with live updates and limits, derives the display
//!   text and label, and decides when a commit is dispatched.
//! - **`numfmt`**: Pure rounding/flooring/ceiling utilities with a
//!   soft-fail-to-blank policy for malformed input.
//! - **`pv`**: The process-variable data model and the collaborator
//!   contracts ([`pv::PvMonitor`], [`pv::PvEndpoint`]) the controller is
//!   driven through.
//! - **`mock`**: [`mock::MockIoc`], a simulated device server for tests and
//!   the demo binary.
//! - **`config`**: Figment-based configuration (TOML file + `OPHYD_FIELD_`
//!   environment overrides), including the global significant-figures
//!   default.
//! - **`telemetry`**: `tracing` subscriber setup.
//! - **`error`**: The crate error type and the controller's visible fault
//!   state.

pub mod config;
pub mod error;
pub mod field;
pub mod mock;
pub mod numfmt;
pub mod pv;
pub mod telemetry;

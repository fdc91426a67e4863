//! Structured logging facility for dcadmin
//!
//! This module provides a canonical logging facility with:
//! - Single initialization point via `init(profile)`
//! - Structured logging macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! All log output goes to stderr; stdout is reserved for command results and
//! the interactive restore prompt.
//!
//! # Usage
//!
//! ```rust
//! use dcadmin_core::logging_facility::{init, Profile};
//!
//! init(Profile::from_env());
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};

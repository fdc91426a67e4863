//! dcadmin Engine - Orchestration layer
//!
//! Drives the external tools (`kubectl`, `psql`, `pg_dump`, Redis) that the
//! snapshot and update commands are built from:
//! - [`exec`]: shell command execution with captured stderr
//! - [`cluster`]: pod lookup by label selector
//! - [`tunnel`]: scoped `kubectl port-forward`
//! - [`relational`] and [`kv`]: the two snapshot engines
//! - [`commands`]: the create/restore workflow and self-update

pub mod cluster;
pub mod commands;
pub mod exec;
pub mod kv;
pub mod preflight;
pub mod relational;
pub mod tunnel;

pub use exec::{BackgroundProcess, Executor, ShellExecutor};

//! Engine commands invoked by the CLI
//!
//! - [`snapshot`]: create/restore across the relational and key-value
//!   subsystems
//! - [`update`]: self-update of the running binary

pub mod snapshot;
pub mod update;

pub mod snapshot;
pub mod update;
pub mod version;

//! In-memory job registry
//!
//! Single-owner actor holding every job record for the life of the process.

mod manager;
mod messages;

pub use manager::{JobRegistry, JobWriter};
pub use messages::{JobUpdate, RegistryError, RegistryResponse};

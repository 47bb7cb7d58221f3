//! Pipewright Registry
//!
//! Resolves `uses:` references to the definitions they point at: reusable
//! workflows for job slots and composite actions for step slots.

mod error;
mod fs_registry;
mod memory;
mod registry;

pub use error::RegistryError;
pub use fs_registry::FsRegistry;
pub use memory::MemoryRegistry;
pub use registry::{Callable, Registry};

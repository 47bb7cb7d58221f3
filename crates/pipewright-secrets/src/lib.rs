//! Pipewright Secrets
//!
//! The [`SecretVault`] trait is the boundary through which the runtime
//! resolves named secrets at execution time. Resolution is scoped: a
//! [`SecretScope`] names the job asking and the deployment environment it
//! targets, so vaults can hand out environment-specific values.
//!
//! Values travel as [`SecretValue`], whose `Debug` output is redacted, and
//! every resolved value is registered with a [`Redactor`] so logs and
//! results can be scrubbed before they leave the engine.

mod env;
mod error;
mod layered;
mod memory;
mod redact;
mod vault;

pub use env::{DEFAULT_PREFIX, EnvVault};
pub use error::SecretError;
pub use layered::LayeredVault;
pub use memory::MemoryVault;
pub use redact::{MASK, Redactor};
pub use vault::{SecretScope, SecretValue, SecretVault};

//! Pipewright Config
//!
//! This crate contains the serializable definition types for pipewright:
//! workflows, jobs, steps and composite actions as they are written by users,
//! before they are validated and locked by `pipewright-workflow`.
//!
//! Definitions can be loaded from:
//! - JSON files (`.json`)
//! - YAML files (`.yml` / `.yaml`)
//!
//! A document is classified by its shape: documents with a `jobs` table are
//! workflows, documents with a `steps` list are composite actions.

mod action;
mod declaration;
mod document;
mod enums;
mod error;
mod input;
mod job;
mod scalar;
mod step;
mod uses;
mod workflow;

pub use action::ActionDef;
pub use declaration::{InputDecl, InputType, OutputDecl, SecretDecl};
pub use document::{Document, Format};
pub use enums::RetryBackoff;
pub use error::ConfigError;
pub use input::{InputValue, scalar_to_string};
pub use job::JobDef;
pub use step::StepDef;
pub use uses::UsesRef;
pub use workflow::{WORKFLOW_CALL_EVENT, WorkflowDef};

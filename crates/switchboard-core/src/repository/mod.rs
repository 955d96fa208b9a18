//! Collaborator trait definitions (ports).
//!
//! These traits define the configuration-store and audit-sink interfaces
//! that the infrastructure layer (switchboard-infra) implements. The core
//! crate never depends on any specific storage technology.

pub mod audit;
pub mod config_store;

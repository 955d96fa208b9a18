//! Services composed from the orchestration building blocks.

pub mod generation;

//! Model Runtime
//!
//! Turns symbolic models into burn modules that can be called on real
//! tensors.

pub mod network;

pub use network::{CompiledModel, FunctionalNet, Step};

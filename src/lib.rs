pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod runtime;

pub use config::{AppConfig, LayerSpec, ModelConfig};
pub use error::{FuncNetError, Result};
pub use graph::{
    Activation, DType, DenseConfig, FlattenConfig, Input, Layer, Model, ModelLayer, Shape,
    SymbolicTensor,
};
pub use models::reference_classifier;
pub use runtime::{CompiledModel, FunctionalNet};

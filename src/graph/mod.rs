//! Symbolic Layer Graph
//!
//! Functional-style model construction: declare an input, call layers on
//! symbolic handles, then assemble a [`Model`] from inputs and outputs.
//!
//! ```ignore
//! let input = Input::new([28, 28]).build()?;
//! let x = FlattenConfig::new().call(&input)?;
//! let x = DenseConfig::new(128).with_activation(Activation::Relu).call(&x)?;
//! let out = DenseConfig::new(10).with_activation(Activation::Softmax).call(&x)?;
//! let model = Model::new([input], [out])?;
//! println!("{model}");
//! ```

pub mod activation;
pub mod layers;
pub mod model;
pub mod shape;
pub mod summary;
pub mod tensor;

pub use activation::Activation;
pub use layers::{DenseConfig, FlattenConfig, Layer};
pub use model::{Model, ModelLayer, DEFAULT_MODEL_NAME};
pub use shape::{DType, Shape};
pub use summary::{LayerDescription, ModelDescription};
pub use tensor::{Input, SymbolicTensor};

//! Layer Definitions
//!
//! Symbolic layers. Calling a layer config on a handle checks the input
//! shape, infers the output shape and returns a new handle; no weights exist
//! until the assembled model is materialized.

use burn::prelude::*;
use tracing::debug;

use super::activation::Activation;
use super::shape::Shape;
use super::tensor::SymbolicTensor;
use crate::error::{self, FuncNetError};

/// Flatten configuration
///
/// Collapses every per-sample dimension into one; the batch dimension is
/// preserved.
#[derive(Config, Debug, PartialEq)]
pub struct FlattenConfig {
    /// Explicit layer name
    pub name: Option<String>,
}

impl FlattenConfig {
    /// Call the layer on a symbolic handle
    pub fn call(&self, input: &SymbolicTensor) -> error::Result<SymbolicTensor> {
        Layer::Flatten(self.clone()).call(input)
    }
}

/// Dense (fully-connected) layer configuration
#[derive(Config, Debug, PartialEq)]
pub struct DenseConfig {
    /// Output width
    pub units: usize,
    /// Activation applied after the affine transform
    #[config(default = "Activation::Linear")]
    pub activation: Activation,
    /// Whether the layer carries a bias vector
    #[config(default = "true")]
    pub use_bias: bool,
    /// Explicit layer name
    pub name: Option<String>,
}

impl DenseConfig {
    /// Call the layer on a symbolic handle
    pub fn call(&self, input: &SymbolicTensor) -> error::Result<SymbolicTensor> {
        Layer::Dense(self.clone()).call(input)
    }
}

/// A symbolic layer recorded in the graph
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Flatten(FlattenConfig),
    Dense(DenseConfig),
}

impl Layer {
    /// Type name shown in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Flatten(_) => "Flatten",
            Layer::Dense(_) => "Dense",
        }
    }

    /// Prefix used for generated layer names
    pub fn base_name(&self) -> &'static str {
        match self {
            Layer::Flatten(_) => "flatten",
            Layer::Dense(_) => "dense",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Layer::Flatten(config) => config.name.as_deref(),
            Layer::Dense(config) => config.name.as_deref(),
        }
    }

    pub fn activation(&self) -> Option<Activation> {
        match self {
            Layer::Flatten(_) => None,
            Layer::Dense(config) => Some(config.activation),
        }
    }

    /// Width of the layer output, for dense layers
    pub fn units(&self) -> Option<usize> {
        match self {
            Layer::Flatten(_) => None,
            Layer::Dense(config) => Some(config.units),
        }
    }

    /// Infer the output shape for a given input shape
    pub fn output_shape(&self, input: &Shape) -> error::Result<Shape> {
        let label = self.name().unwrap_or(self.base_name());
        match self {
            Layer::Flatten(_) => Shape::new(input.batch(), vec![input.features()]),
            Layer::Dense(config) => {
                if config.units == 0 {
                    return Err(FuncNetError::InvalidUnits {
                        layer: label.to_string(),
                        units: config.units,
                    });
                }
                let mut dims = input.dims().to_vec();
                match dims.last_mut() {
                    Some(last) => *last = config.units,
                    None => {
                        return Err(FuncNetError::incompatible(
                            label,
                            format!("expected at least one feature axis, got {}", input),
                        ))
                    }
                }
                Shape::new(input.batch(), dims)
            }
        }
    }

    /// Number of weights the layer owns for a given input shape
    pub fn param_count(&self, input: &Shape) -> error::Result<usize> {
        match self {
            Layer::Flatten(_) => Ok(0),
            Layer::Dense(config) => {
                let weights = input.last_dim().checked_mul(config.units);
                let total = if config.use_bias {
                    weights.and_then(|w| w.checked_add(config.units))
                } else {
                    weights
                };
                total.ok_or_else(|| {
                    FuncNetError::InvalidShape(format!(
                        "parameter count of '{}' ({} x {}) overflows usize",
                        self.name().unwrap_or(self.base_name()),
                        input.last_dim(),
                        config.units
                    ))
                })
            }
        }
    }

    fn call(self, input: &SymbolicTensor) -> error::Result<SymbolicTensor> {
        let shape = self.output_shape(input.shape())?;
        self.param_count(input.shape())?;
        debug!(
            layer = self.kind(),
            input = %input.shape(),
            output = %shape,
            "layer call"
        );
        Ok(SymbolicTensor::from_layer(self, input, shape))
    }
}

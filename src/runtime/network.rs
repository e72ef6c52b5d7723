//! Functional Network
//!
//! Materializes a symbolic [`Model`] into a burn module with initialized
//! weights. The module only holds parameters; the execution plan (flatten
//! and activation steps) lives beside it in [`CompiledModel`].

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use tracing::debug;

use crate::error::{FuncNetError, Result};
use crate::graph::{Activation, Layer, Model};

/// Parameters of a materialized model
#[derive(Module, Debug)]
pub struct FunctionalNet<B: Backend> {
    dense: Vec<Linear<B>>,
}

impl<B: Backend> FunctionalNet<B> {
    /// Dense layers in execution order
    pub fn dense_layers(&self) -> &[Linear<B>] {
        &self.dense
    }
}

/// One step of the execution plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Flatten,
    Dense { index: usize, activation: Activation },
}

/// A callable model: weights plus the plan to run them
#[derive(Debug)]
pub struct CompiledModel<B: Backend> {
    name: String,
    net: FunctionalNet<B>,
    steps: Vec<Step>,
    input_dims: Vec<usize>,
    output_dim: usize,
}

impl Model {
    /// Initialize weights on `device` and build the execution plan
    ///
    /// Supported graphs have one input, one output, and dense layers that
    /// each see a flat feature vector per sample.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CompiledModel<B>> {
        if self.inputs().len() != 1 || self.outputs().len() != 1 {
            return Err(FuncNetError::Unsupported(format!(
                "expected one input and one output, got {} and {}",
                self.inputs().len(),
                self.outputs().len()
            )));
        }

        let dtype = self.inputs()[0].dtype();
        let backend_width = core::mem::size_of::<B::FloatElem>();
        if dtype.size_in_bytes() != backend_width {
            return Err(FuncNetError::Unsupported(format!(
                "model dtype {} does not match the backend float width of {} bytes",
                dtype, backend_width
            )));
        }

        let layers = self.layers();
        let input_idx = self.input_indices()[0];

        // Walk back from the output to the input; single-input layers make
        // this a chain.
        let mut chain = Vec::new();
        let mut idx = self.output_indices()[0];
        while idx != input_idx {
            chain.push(idx);
            idx = layers[idx].inbound().ok_or_else(|| {
                FuncNetError::Unsupported(format!(
                    "layer '{}' has no inbound layer",
                    layers[idx].name()
                ))
            })?;
        }
        chain.reverse();

        let mut dense = Vec::new();
        let mut steps = Vec::with_capacity(chain.len());

        for idx in chain {
            let node = &layers[idx];
            match node.layer() {
                Some(Layer::Flatten(_)) => steps.push(Step::Flatten),
                Some(Layer::Dense(config)) => {
                    let input_shape = node.input_shape().ok_or_else(|| {
                        FuncNetError::Unsupported(format!("layer '{}' has no input", node.name()))
                    })?;
                    if input_shape.dims().len() != 1 {
                        return Err(FuncNetError::Unsupported(format!(
                            "dense layer '{}' receives {}; flatten it first",
                            node.name(),
                            input_shape
                        )));
                    }

                    let linear = LinearConfig::new(input_shape.last_dim(), config.units)
                        .with_bias(config.use_bias)
                        .init(device);
                    steps.push(Step::Dense {
                        index: dense.len(),
                        activation: config.activation,
                    });
                    dense.push(linear);
                }
                None => {
                    return Err(FuncNetError::Unsupported(format!(
                        "unexpected input node '{}' inside the graph",
                        node.name()
                    )))
                }
            }
        }

        let output_shape = layers[self.output_indices()[0]].output_shape();
        if output_shape.dims().len() != 1 {
            return Err(FuncNetError::Unsupported(format!(
                "model output {} is not a flat feature vector",
                output_shape
            )));
        }

        debug!(
            model = self.name(),
            steps = steps.len(),
            dense = dense.len(),
            "materialized model"
        );

        Ok(CompiledModel {
            name: self.name().to_string(),
            net: FunctionalNet { dense },
            steps,
            input_dims: layers[input_idx].output_shape().dims().to_vec(),
            output_dim: output_shape.last_dim(),
        })
    }
}

impl<B: Backend> CompiledModel<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn net(&self) -> &FunctionalNet<B> {
        &self.net
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Per-sample input dimensions
    pub fn input_dims(&self) -> &[usize] {
        &self.input_dims
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Number of initialized weights
    pub fn num_params(&self) -> usize {
        self.net.num_params()
    }

    /// Forward pass over a batch shaped `[batch, ..input_dims]`
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Result<Tensor<B, 2>> {
        let dims = input.dims();
        let found = if D > 1 { dims[1..].to_vec() } else { Vec::new() };
        if found != self.input_dims {
            return Err(FuncNetError::InputMismatch {
                expected: self.input_dims.clone(),
                found,
            });
        }

        // Dense layers only ever see flat rows, so flattening once up front
        // makes every later flatten step a no-op.
        self.forward_flat(input.reshape([dims[0], self.input_features()]))
    }

    /// Number of input elements per sample
    pub fn input_features(&self) -> usize {
        self.input_dims.iter().product()
    }

    /// Forward pass over pre-flattened rows shaped `[batch, input_features]`
    pub fn forward_flat(&self, input: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [_, features] = input.dims();
        if features != self.input_features() {
            return Err(FuncNetError::InputMismatch {
                expected: vec![self.input_features()],
                found: vec![features],
            });
        }

        let mut x = input;
        for step in &self.steps {
            match step {
                Step::Flatten => {}
                Step::Dense { index, activation } => {
                    x = activation.forward(self.net.dense[*index].forward(x));
                }
            }
        }

        Ok(x)
    }
}

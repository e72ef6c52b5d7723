//! Functional Model
//!
//! Assembles the layers reachable from declared inputs to declared outputs
//! into an ordered, named, inspectable model.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use super::layers::Layer;
use super::shape::{DType, Shape};
use super::tensor::{Origin, SymbolicTensor};
use crate::error::{FuncNetError, Result};

/// Default model name
pub const DEFAULT_MODEL_NAME: &str = "model";

/// One assembled node of a model, in topological order
#[derive(Debug, Clone)]
pub struct ModelLayer {
    name: String,
    /// `None` for input declarations
    layer: Option<Layer>,
    /// Index of the node this layer was called on
    inbound: Option<usize>,
    input_shape: Option<Shape>,
    output_shape: Shape,
    dtype: DType,
    params: usize,
}

impl ModelLayer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> Option<&Layer> {
        self.layer.as_ref()
    }

    pub fn is_input(&self) -> bool {
        self.layer.is_none()
    }

    pub fn kind(&self) -> &'static str {
        self.layer.as_ref().map(Layer::kind).unwrap_or("InputLayer")
    }

    pub fn inbound(&self) -> Option<usize> {
        self.inbound
    }

    pub fn input_shape(&self) -> Option<&Shape> {
        self.input_shape.as_ref()
    }

    pub fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn param_count(&self) -> usize {
        self.params
    }
}

/// A model assembled from symbolic inputs and outputs
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    inputs: Vec<SymbolicTensor>,
    outputs: Vec<SymbolicTensor>,
    layers: Vec<ModelLayer>,
    input_indices: Vec<usize>,
    output_indices: Vec<usize>,
    total_params: usize,
}

impl Model {
    /// Assemble a model named [`DEFAULT_MODEL_NAME`]
    pub fn new(
        inputs: impl Into<Vec<SymbolicTensor>>,
        outputs: impl Into<Vec<SymbolicTensor>>,
    ) -> Result<Self> {
        Self::named(DEFAULT_MODEL_NAME, inputs, outputs)
    }

    /// Assemble a model with an explicit name
    pub fn named(
        name: impl Into<String>,
        inputs: impl Into<Vec<SymbolicTensor>>,
        outputs: impl Into<Vec<SymbolicTensor>>,
    ) -> Result<Self> {
        let name = name.into();
        let inputs = inputs.into();
        let outputs = outputs.into();

        if inputs.is_empty() || outputs.is_empty() {
            return Err(FuncNetError::EmptyModel);
        }

        let mut declared = HashMap::new();
        for (i, input) in inputs.iter().enumerate() {
            if declared.insert(input.key(), i).is_some() {
                return Err(FuncNetError::DisconnectedGraph(format!(
                    "input {} is declared more than once",
                    i
                )));
            }
        }

        let mut assembler = Assembler::new(&declared);
        let mut output_indices = Vec::with_capacity(outputs.len());
        for output in &outputs {
            output_indices.push(assembler.visit(output)?);
        }

        let mut input_indices = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            match assembler.index.get(&input.key()) {
                Some(&idx) => input_indices.push(idx),
                None => {
                    return Err(FuncNetError::DisconnectedGraph(format!(
                        "input {} ({}) is not connected to any output",
                        i,
                        input.shape()
                    )))
                }
            }
        }

        let layers = assign_names(assembler.nodes)?;
        let total_params = layers
            .iter()
            .try_fold(0usize, |acc, l| acc.checked_add(l.params))
            .ok_or_else(|| {
                FuncNetError::InvalidShape(format!(
                    "total parameter count of '{}' overflows usize",
                    name
                ))
            })?;
        debug!(model = %name, layers = layers.len(), params = total_params, "assembled model");

        Ok(Self {
            name,
            inputs,
            outputs,
            layers,
            input_indices,
            output_indices,
            total_params,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[SymbolicTensor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SymbolicTensor] {
        &self.outputs
    }

    pub fn input_shapes(&self) -> Vec<&Shape> {
        self.inputs.iter().map(SymbolicTensor::shape).collect()
    }

    pub fn output_shapes(&self) -> Vec<&Shape> {
        self.outputs.iter().map(SymbolicTensor::shape).collect()
    }

    /// All nodes, inputs included, in topological order
    pub fn layers(&self) -> &[ModelLayer] {
        &self.layers
    }

    /// Node indices of the declared inputs, in declaration order
    pub fn input_indices(&self) -> &[usize] {
        &self.input_indices
    }

    /// Node indices of the declared outputs, in declaration order
    pub fn output_indices(&self) -> &[usize] {
        &self.output_indices
    }

    pub fn get_layer(&self, name: &str) -> Option<&ModelLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Total number of weights across all layers
    pub fn count_params(&self) -> usize {
        self.total_params
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Functional name={}, inputs=[{}], outputs=[{}], layers={}, params={}>",
            self.name,
            join_shapes(&self.input_shapes()),
            join_shapes(&self.output_shapes()),
            self.layers.len(),
            self.count_params()
        )
    }
}

fn join_shapes(shapes: &[&Shape]) -> String {
    shapes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unnamed node collected during traversal
struct RawNode {
    explicit_name: Option<String>,
    layer: Option<Layer>,
    inbound: Option<usize>,
    input_shape: Option<Shape>,
    output_shape: Shape,
    dtype: DType,
    params: usize,
}

/// Post-order traversal from outputs back to the declared inputs
struct Assembler<'a> {
    declared: &'a HashMap<usize, usize>,
    index: HashMap<usize, usize>,
    nodes: Vec<RawNode>,
}

impl<'a> Assembler<'a> {
    fn new(declared: &'a HashMap<usize, usize>) -> Self {
        Self {
            declared,
            index: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Returns the node index of `tensor`, visiting its ancestors first.
    ///
    /// Single-input layers make every path a chain, so the walk is iterative:
    /// collect handles back to a known node or a declared input, then emit
    /// them in reverse.
    fn visit(&mut self, tensor: &SymbolicTensor) -> Result<usize> {
        let mut pending = Vec::new();
        let mut current = tensor.clone();

        let mut inbound = loop {
            if let Some(&idx) = self.index.get(&current.key()) {
                break idx;
            }
            if self.declared.contains_key(&current.key()) {
                // Declared inputs become graph boundaries even if they were
                // produced by a layer.
                break self.push(&current, None, None, None)?;
            }
            let next = match &current.node().origin {
                Origin::Input => {
                    return Err(FuncNetError::DisconnectedGraph(format!(
                        "output depends on input {} that was not declared",
                        current.shape()
                    )))
                }
                Origin::Layer { input, .. } => input.clone(),
            };
            pending.push(std::mem::replace(&mut current, next));
        };

        while let Some(tensor) = pending.pop() {
            let Origin::Layer { layer, input } = &tensor.node().origin else {
                continue;
            };
            inbound = self.push(
                &tensor,
                Some(layer.clone()),
                Some(inbound),
                Some(input.shape().clone()),
            )?;
        }

        Ok(inbound)
    }

    fn push(
        &mut self,
        tensor: &SymbolicTensor,
        layer: Option<Layer>,
        inbound: Option<usize>,
        input_shape: Option<Shape>,
    ) -> Result<usize> {
        let params = match (&layer, &input_shape) {
            (Some(layer), Some(input)) => layer.param_count(input)?,
            _ => 0,
        };
        let idx = self.nodes.len();
        self.nodes.push(RawNode {
            explicit_name: tensor.name().map(str::to_string),
            layer,
            inbound,
            input_shape,
            output_shape: tensor.shape().clone(),
            dtype: tensor.dtype(),
            params,
        });
        self.index.insert(tensor.key(), idx);
        Ok(idx)
    }
}

/// Keep explicit names, generate `base`, `base_1`, ... for the rest
fn assign_names(nodes: Vec<RawNode>) -> Result<Vec<ModelLayer>> {
    let mut taken = HashSet::new();
    for node in &nodes {
        if let Some(name) = &node.explicit_name {
            if !taken.insert(name.clone()) {
                return Err(FuncNetError::DuplicateName(name.clone()));
            }
        }
    }

    let mut counters: HashMap<&'static str, usize> = HashMap::new();
    let mut layers = Vec::with_capacity(nodes.len());

    for node in nodes {
        let name = match node.explicit_name {
            Some(name) => name,
            None => {
                let base = node.layer.as_ref().map(Layer::base_name).unwrap_or("input_layer");
                loop {
                    let n = counters.entry(base).or_insert(0);
                    let candidate = if *n == 0 {
                        base.to_string()
                    } else {
                        format!("{}_{}", base, n)
                    };
                    *n += 1;
                    if taken.insert(candidate.clone()) {
                        break candidate;
                    }
                }
            }
        };

        layers.push(ModelLayer {
            name,
            layer: node.layer,
            inbound: node.inbound,
            input_shape: node.input_shape,
            output_shape: node.output_shape,
            dtype: node.dtype,
            params: node.params,
        });
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::activation::Activation;
    use crate::graph::layers::{DenseConfig, FlattenConfig};
    use crate::graph::tensor::Input;

    fn reference() -> (SymbolicTensor, SymbolicTensor) {
        let input = Input::new([28, 28]).build().unwrap();
        let x = FlattenConfig::new().call(&input).unwrap();
        let x = DenseConfig::new(128)
            .with_activation(Activation::Relu)
            .call(&x)
            .unwrap();
        let out = DenseConfig::new(10)
            .with_activation(Activation::Softmax)
            .call(&x)
            .unwrap();
        (input, out)
    }

    #[test]
    fn test_assembles_in_topological_order() {
        let (input, out) = reference();
        let model = Model::new([input], [out]).unwrap();

        let names: Vec<_> = model.layers().iter().map(ModelLayer::name).collect();
        assert_eq!(names, vec!["input_layer", "flatten", "dense", "dense_1"]);

        let kinds: Vec<_> = model.layers().iter().map(ModelLayer::kind).collect();
        assert_eq!(kinds, vec!["InputLayer", "Flatten", "Dense", "Dense"]);

        assert_eq!(model.layers()[1].inbound(), Some(0));
        assert_eq!(model.layers()[3].inbound(), Some(2));
        assert_eq!(model.input_indices(), &[0]);
        assert_eq!(model.output_indices(), &[3]);
    }

    #[test]
    fn test_count_params() {
        let (input, out) = reference();
        let model = Model::new([input], [out]).unwrap();
        assert_eq!(model.count_params(), 784 * 128 + 128 + 128 * 10 + 10);
        assert_eq!(model.get_layer("dense").unwrap().param_count(), 100_480);
        assert_eq!(model.get_layer("dense_1").unwrap().param_count(), 1_290);
        assert!(model.get_layer("conv2d").is_none());
    }

    #[test]
    fn test_display_is_single_line() {
        let (input, out) = reference();
        let model = Model::new([input], [out]).unwrap();
        assert_eq!(
            model.to_string(),
            "<Functional name=model, inputs=[(None, 28, 28)], outputs=[(None, 10)], layers=4, params=101770>"
        );
    }

    #[test]
    fn test_explicit_names_are_kept_and_generated_names_avoid_them() {
        let input = Input::new([4]).with_name("features").build().unwrap();
        let x = DenseConfig::new(8)
            .with_name(Some("dense".to_string()))
            .call(&input)
            .unwrap();
        let out = DenseConfig::new(2).call(&x).unwrap();
        let model = Model::named("tiny", [input], [out]).unwrap();

        let names: Vec<_> = model.layers().iter().map(ModelLayer::name).collect();
        assert_eq!(names, vec!["features", "dense", "dense_1"]);
        assert_eq!(model.name(), "tiny");
    }

    #[test]
    fn test_duplicate_explicit_names_fail() {
        let input = Input::new([4]).build().unwrap();
        let x = DenseConfig::new(8)
            .with_name(Some("hidden".to_string()))
            .call(&input)
            .unwrap();
        let out = DenseConfig::new(2)
            .with_name(Some("hidden".to_string()))
            .call(&x)
            .unwrap();
        let err = Model::new([input], [out]).unwrap_err();
        assert!(matches!(err, FuncNetError::DuplicateName(name) if name == "hidden"));
    }

    #[test]
    fn test_shared_trunk_is_visited_once() {
        let input = Input::new([16]).build().unwrap();
        let trunk = DenseConfig::new(8).call(&input).unwrap();
        let head_a = DenseConfig::new(2).call(&trunk).unwrap();
        let head_b = DenseConfig::new(3).call(&trunk).unwrap();

        let model = Model::new([input], [head_a, head_b]).unwrap();
        assert_eq!(model.layers().len(), 4);
        assert_eq!(model.output_shapes().len(), 2);
        assert_eq!(model.layers()[3].inbound(), Some(1));
    }

    #[test]
    fn test_undeclared_input_fails() {
        let (_, out) = reference();
        let other = Input::new([28, 28]).build().unwrap();
        let err = Model::new([other], [out]).unwrap_err();
        assert!(matches!(err, FuncNetError::DisconnectedGraph(_)));
    }

    #[test]
    fn test_unused_input_fails() {
        let (input, out) = reference();
        let extra = Input::new([3]).build().unwrap();
        let err = Model::new([input, extra], [out]).unwrap_err();
        assert!(matches!(err, FuncNetError::DisconnectedGraph(_)));
    }

    #[test]
    fn test_duplicate_input_fails() {
        let (input, out) = reference();
        assert!(Model::new([input.clone(), input], [out]).is_err());
    }

    #[test]
    fn test_empty_model_fails() {
        let (input, _) = reference();
        assert!(matches!(
            Model::new([input], Vec::new()),
            Err(FuncNetError::EmptyModel)
        ));
    }

    #[test]
    fn test_intermediate_tensor_as_input() {
        let (_, out) = reference();
        // Walk back to the hidden layer output and start a sub-model there.
        let hidden = match &out.node().origin {
            Origin::Layer { input, .. } => input.clone(),
            Origin::Input => unreachable!(),
        };
        let model = Model::new([hidden], [out]).unwrap();
        assert_eq!(model.layers().len(), 2);
        assert_eq!(model.layers()[0].kind(), "InputLayer");
        assert_eq!(model.count_params(), 1_290);
    }

    #[test]
    fn test_total_param_overflow_fails() {
        // Each head alone fits in usize; their sum does not.
        let input = Input::new([1usize << 33]).build().unwrap();
        let head_a = DenseConfig::new(1 << 30)
            .with_use_bias(false)
            .call(&input)
            .unwrap();
        let head_b = DenseConfig::new(1 << 30)
            .with_use_bias(false)
            .call(&input)
            .unwrap();

        let err = Model::new([input], [head_a, head_b]).unwrap_err();
        assert!(matches!(err, FuncNetError::InvalidShape(msg) if msg.contains("total parameter count")));
    }

    #[test]
    fn test_layers_carry_input_dtype() {
        let input = Input::new([4]).with_dtype(DType::Float64).build().unwrap();
        let out = DenseConfig::new(2).call(&input).unwrap();
        let model = Model::new([input], [out]).unwrap();
        assert!(model.layers().iter().all(|l| l.dtype() == DType::Float64));
    }
}

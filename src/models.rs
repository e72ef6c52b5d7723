//! Predefined architectures

use crate::error::Result;
use crate::graph::{Activation, DenseConfig, FlattenConfig, Input, Model};

/// Input grid of the reference classifier
pub const REFERENCE_INPUT_SHAPE: [usize; 2] = [28, 28];

/// Width of the hidden layer
pub const REFERENCE_HIDDEN_UNITS: usize = 128;

/// Number of output classes
pub const REFERENCE_NUM_CLASSES: usize = 10;

/// 28x28 grid -> flatten -> dense(128, relu) -> dense(10, softmax)
pub fn reference_classifier() -> Result<Model> {
    let input = Input::new(REFERENCE_INPUT_SHAPE).build()?;
    let x = FlattenConfig::new().call(&input)?;
    let x = DenseConfig::new(REFERENCE_HIDDEN_UNITS)
        .with_activation(Activation::Relu)
        .call(&x)?;
    let predictions = DenseConfig::new(REFERENCE_NUM_CLASSES)
        .with_activation(Activation::Softmax)
        .call(&x)?;

    Model::new([input], [predictions])
}

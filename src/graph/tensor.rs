//! Symbolic tensor handles
//!
//! A handle describes the shape and element type of data flowing through a
//! graph without holding any values. Handles are immutable; every layer call
//! returns a new handle that remembers which layer produced it and which
//! handle the layer was called on. The resulting chain of handles *is* the
//! graph, so building a model never touches shared state.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::layers::Layer;
use super::shape::{DType, Shape};
use crate::error::Result;

/// Where a symbolic tensor came from
#[derive(Debug)]
pub(crate) enum Origin {
    Input,
    Layer { layer: Layer, input: SymbolicTensor },
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) shape: Shape,
    pub(crate) dtype: DType,
    /// Explicit name of the input or layer that produced this tensor
    pub(crate) name: Option<String>,
    pub(crate) origin: Origin,
}

/// Placeholder for data flowing through a model under construction
#[derive(Clone)]
pub struct SymbolicTensor {
    node: Arc<Node>,
}

impl SymbolicTensor {
    pub(crate) fn from_layer(layer: Layer, input: &SymbolicTensor, shape: Shape) -> Self {
        let name = layer.name().map(str::to_string);
        Self {
            node: Arc::new(Node {
                shape,
                dtype: input.dtype(),
                name,
                origin: Origin::Layer {
                    layer,
                    input: input.clone(),
                },
            }),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.node.shape
    }

    pub fn dtype(&self) -> DType {
        self.node.dtype
    }

    /// Explicit name of the producing input or layer, if one was given
    pub fn name(&self) -> Option<&str> {
        self.node.name.as_deref()
    }

    /// True for handles created by [`Input`]
    pub fn is_input(&self) -> bool {
        matches!(self.node.origin, Origin::Input)
    }

    /// The layer that produced this handle, if any
    pub fn layer(&self) -> Option<&Layer> {
        match &self.node.origin {
            Origin::Input => None,
            Origin::Layer { layer, .. } => Some(layer),
        }
    }

    /// Identity comparison; two handles with equal shapes are still distinct
    /// unless they come from the same declaration or layer call.
    pub fn same_as(&self, other: &SymbolicTensor) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }
}

impl fmt::Debug for SymbolicTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<SymbolicTensor shape={}, dtype={}",
            self.shape(),
            self.dtype()
        )?;
        if let Some(name) = self.name() {
            write!(f, ", name={}", name)?;
        }
        write!(f, ">")
    }
}

/// Input declaration
///
/// ```ignore
/// let input = Input::new([28, 28]).build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    dims: Vec<usize>,
    batch_size: Option<usize>,
    dtype: DType,
    name: Option<String>,
}

impl Input {
    /// Per-sample dimensions; the batch dimension stays unspecified
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self {
            dims: dims.into(),
            batch_size: None,
            dtype: DType::default(),
            name: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Create the symbolic handle
    pub fn build(self) -> Result<SymbolicTensor> {
        let shape = Shape::new(self.batch_size, self.dims)?;
        debug!(shape = %shape, dtype = %self.dtype, "declared input");

        Ok(SymbolicTensor {
            node: Arc::new(Node {
                shape,
                dtype: self.dtype,
                name: self.name,
                origin: Origin::Input,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape_and_dtype() {
        let x = Input::new([28, 28]).build().unwrap();
        assert_eq!(x.shape().dims(), &[28, 28]);
        assert_eq!(x.shape().batch(), None);
        assert_eq!(x.dtype(), DType::Float32);
        assert!(x.is_input());
        assert!(x.layer().is_none());
    }

    #[test]
    fn test_input_rejects_zero_dim() {
        assert!(Input::new([28, 0]).build().is_err());
        assert!(Input::new(Vec::new()).build().is_err());
    }

    #[test]
    fn test_handles_have_identity() {
        let a = Input::new([4]).build().unwrap();
        let b = Input::new([4]).build().unwrap();
        let a2 = a.clone();

        assert!(a.same_as(&a2));
        assert!(!a.same_as(&b));
        assert_eq!(a.shape(), b.shape());
    }

    #[test]
    fn test_debug_repr() {
        let x = Input::new([3])
            .with_batch_size(8)
            .with_name("features")
            .build()
            .unwrap();
        assert_eq!(
            format!("{:?}", x),
            "<SymbolicTensor shape=(8, 3), dtype=float32, name=features>"
        );
    }
}

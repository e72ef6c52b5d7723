//! Shapes and element types of symbolic tensors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FuncNetError, Result};

/// Shape of a symbolic tensor: an optional batch dimension followed by
/// strictly positive per-sample dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Shape {
    batch: Option<usize>,
    dims: Vec<usize>,
}

impl Shape {
    /// Build a shape, rejecting empty or zero-sized per-sample dimensions.
    pub fn new(batch: Option<usize>, dims: Vec<usize>) -> Result<Self> {
        if dims.is_empty() {
            return Err(FuncNetError::InvalidShape(
                "at least one per-sample dimension is required".to_string(),
            ));
        }
        if let Some(pos) = dims.iter().position(|&d| d == 0) {
            return Err(FuncNetError::InvalidShape(format!(
                "dimension {} of {:?} must be positive",
                pos, dims
            )));
        }
        if batch == Some(0) {
            return Err(FuncNetError::InvalidShape(
                "batch size must be positive".to_string(),
            ));
        }
        if checked_product(&dims).is_none() {
            return Err(FuncNetError::InvalidShape(format!(
                "element count of {:?} overflows usize",
                dims
            )));
        }
        Ok(Self { batch, dims })
    }

    pub fn batch(&self) -> Option<usize> {
        self.batch
    }

    /// Per-sample dimensions (batch excluded)
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Rank including the batch dimension
    pub fn rank(&self) -> usize {
        self.dims.len() + 1
    }

    /// Number of elements per sample; `new` guarantees it fits in `usize`
    pub fn features(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn last_dim(&self) -> usize {
        // Constructor guarantees at least one dimension.
        self.dims[self.dims.len() - 1]
    }
}

pub(crate) fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.batch {
            Some(b) => write!(f, "({}", b)?,
            None => write!(f, "(None")?,
        }
        for d in &self.dims {
            write!(f, ", {}", d)?;
        }
        write!(f, ")")
    }
}

/// Element type carried by a symbolic tensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[default]
    Float32,
    Float64,
}

impl DType {
    /// Width of one element in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::Float32 => 4,
            DType::Float64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Float32 => write!(f, "float32"),
            DType::Float64 => write!(f, "float64"),
        }
    }
}

impl FromStr for DType {
    type Err = FuncNetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(DType::Float32),
            "float64" | "f64" => Ok(DType::Float64),
            other => Err(FuncNetError::UnknownDType(other.to_string())),
        }
    }
}

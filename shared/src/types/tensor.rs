//! Tensor descriptors
//!
//! A tensor is described by its shape and element type only; no data is ever
//! attached. Descriptors are immutable once constructed.

use crate::types::dtype::Dtype;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error raised when input shapes cannot be broadcast together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("shapes are not broadcastable: {0:?}")]
pub struct BroadcastError(pub Vec<Vec<usize>>);

/// Shape and element type of one tensor argument
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    shape: Vec<usize>,
    dtype: Dtype,
}

impl TensorDesc {
    pub fn new(shape: Vec<usize>, dtype: Dtype) -> Self {
        Self { shape, dtype }
    }

    /// A 0-dimensional descriptor (one element)
    pub fn scalar(dtype: Dtype) -> Self {
        Self {
            shape: Vec::new(),
            dtype,
        }
    }

    /// Number of dimensions; 0 for scalars
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Same shape, different element type
    pub fn with_dtype(&self, dtype: Dtype) -> Self {
        Self {
            shape: self.shape.clone(),
            dtype,
        }
    }

    /// Number of elements; an empty shape is a scalar with one element
    pub fn size(&self) -> u64 {
        self.shape.iter().map(|&d| d as u64).product()
    }

    pub fn itemsize(&self) -> u64 {
        self.dtype.itemsize()
    }

    /// Total bytes: element count times element width
    pub fn bytes(&self) -> u64 {
        self.size() * self.itemsize()
    }

    /// Broadcast a set of descriptors to a common output shape.
    ///
    /// Standard NumPy rules: shapes are right-aligned, each dimension must
    /// match or be 1. The result takes the first input's dtype.
    pub fn broadcast(inputs: &[TensorDesc]) -> Result<TensorDesc, BroadcastError> {
        let rank = inputs.iter().map(|t| t.ndim()).max().unwrap_or(0);
        let mut out = vec![1usize; rank];

        for t in inputs {
            let offset = rank - t.ndim();
            for (i, &d) in t.shape.iter().enumerate() {
                let o = &mut out[offset + i];
                if *o == 1 {
                    *o = d;
                } else if d != 1 && d != *o {
                    return Err(BroadcastError(
                        inputs.iter().map(|t| t.shape.clone()).collect(),
                    ));
                }
            }
        }

        let dtype = inputs.first().map(|t| t.dtype).unwrap_or(Dtype::Float32);
        Ok(TensorDesc::new(out, dtype))
    }
}

impl fmt::Display for TensorDesc {
    /// Renders as e.g. `[3,7]fp32`, matching the report format
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]{}", self.dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_has_one_element() {
        let t = TensorDesc::scalar(Dtype::Float32);
        assert_eq!(t.ndim(), 0);
        assert_eq!(t.size(), 1);
        assert_eq!(t.bytes(), 4);
    }

    #[test]
    fn test_bytes_is_size_times_itemsize() {
        for (shape, dtype, bytes) in [
            (vec![3, 7], Dtype::Float32, 84),
            (vec![3, 7, 11], Dtype::Float16, 462),
            (vec![1], Dtype::Int64, 8),
            (vec![2, 0, 5], Dtype::Float64, 0),
        ] {
            let t = TensorDesc::new(shape, dtype);
            assert_eq!(t.bytes(), bytes);
            assert_eq!(t.bytes(), t.size() * t.itemsize());
        }
    }

    #[test]
    fn test_broadcast_expands_ones() {
        let a = TensorDesc::new(vec![3, 1], Dtype::Float32);
        let b = TensorDesc::new(vec![1, 3], Dtype::Float32);
        let out = TensorDesc::broadcast(&[a, b]).unwrap();
        assert_eq!(out.shape(), &[3, 3]);
    }

    #[test]
    fn test_broadcast_scalar_with_tensor() {
        let a = TensorDesc::new(vec![4, 5], Dtype::Float16);
        let b = TensorDesc::scalar(Dtype::Float32);
        let out = TensorDesc::broadcast(&[a, b]).unwrap();
        assert_eq!(out.shape(), &[4, 5]);
        assert_eq!(out.dtype(), Dtype::Float16);
    }

    #[test]
    fn test_broadcast_incompatible() {
        let a = TensorDesc::new(vec![3, 4], Dtype::Float32);
        let b = TensorDesc::new(vec![2, 5], Dtype::Float32);
        assert!(TensorDesc::broadcast(&[a, b]).is_err());
    }

    #[test]
    fn test_display() {
        let t = TensorDesc::new(vec![3, 7], Dtype::Float16);
        assert_eq!(t.to_string(), "[3,7]fp16");
        assert_eq!(TensorDesc::scalar(Dtype::Int32).to_string(), "[]int32");
    }
}

//! Tensor element types
//!
//! The profiler markers carry PyTorch dtype names; this maps every wire
//! alias onto a fixed set of element types with a byte width and a canonical
//! display name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a marker carries an element type outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dtype: {0}")]
pub struct UnknownDtype(pub String);

/// Tensor element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    Uint8,
    Int8,
    Bool,
    Float16,
    Int16,
    Float32,
    Int32,
    Int64,
    Float64,
}

impl Dtype {
    /// Size of one element in bytes
    pub fn itemsize(&self) -> u64 {
        match self {
            Dtype::Uint8 | Dtype::Int8 | Dtype::Bool => 1,
            Dtype::Float16 | Dtype::Int16 => 2,
            Dtype::Float32 | Dtype::Int32 => 4,
            Dtype::Int64 | Dtype::Float64 => 8,
        }
    }

    /// Canonical short name used in reports
    pub fn canonical(&self) -> &'static str {
        match self {
            Dtype::Uint8 => "uint8",
            Dtype::Int8 => "int8",
            Dtype::Bool => "bool",
            Dtype::Float16 => "fp16",
            Dtype::Int16 => "int16",
            Dtype::Float32 => "fp32",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::Float64 => "fp64",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

impl FromStr for Dtype {
    type Err = UnknownDtype;

    /// Parse a wire alias. `byte` and `char` collapse onto `uint8`, the
    /// scalar type names (`float`, `int`) onto their default tensor widths.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uint8" | "byte" | "char" => Ok(Dtype::Uint8),
            "int8" => Ok(Dtype::Int8),
            "bool" => Ok(Dtype::Bool),
            "float16" | "half" => Ok(Dtype::Float16),
            "int16" | "short" => Ok(Dtype::Int16),
            "float32" | "float" => Ok(Dtype::Float32),
            "int32" | "int" => Ok(Dtype::Int32),
            "int64" | "long" => Ok(Dtype::Int64),
            "float64" | "double" => Ok(Dtype::Float64),
            _ => Err(UnknownDtype(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_itemsize_groups() {
        assert_eq!("byte".parse::<Dtype>().unwrap().itemsize(), 1);
        assert_eq!("half".parse::<Dtype>().unwrap().itemsize(), 2);
        assert_eq!("float".parse::<Dtype>().unwrap().itemsize(), 4);
        assert_eq!("double".parse::<Dtype>().unwrap().itemsize(), 8);
        assert_eq!("long".parse::<Dtype>().unwrap().itemsize(), 8);
    }

    #[test]
    fn test_aliases_collapse() {
        assert_eq!("byte".parse::<Dtype>().unwrap(), Dtype::Uint8);
        assert_eq!("char".parse::<Dtype>().unwrap(), Dtype::Uint8);
        assert_eq!("float16".parse::<Dtype>().unwrap().canonical(), "fp16");
        assert_eq!("int".parse::<Dtype>().unwrap(), Dtype::Int32);
    }

    #[test]
    fn test_unknown_dtype() {
        assert!("complex64".parse::<Dtype>().is_err());
    }
}

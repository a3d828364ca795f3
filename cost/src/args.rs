//! Argument-filtering idioms shared by the calculators
//!
//! Markers record arguments positionally (empty name) or by keyword. The
//! calculators all use the same moves: drop `out=` parameters, take the
//! positional arguments, or probe for a named argument with a positional
//! fallback.

use crate::CostError;
use kernelscope_shared::{Arg, Dtype, ScalarValue, TensorDesc};

/// Positional arguments only (empty name)
pub fn positional(args: &[Arg]) -> Vec<&Arg> {
    args.iter().filter(|a| a.is_positional()).collect()
}

/// Everything except the `out=` parameter
pub fn without_out(args: &[Arg]) -> Vec<&Arg> {
    args.iter().filter(|a| a.name() != "out").collect()
}

/// The argument at `index` when positional, else the one named `name`
pub fn select<'a>(args: &[&'a Arg], index: usize, name: &str) -> Result<&'a Arg, CostError> {
    let arg = args
        .get(index)
        .ok_or_else(|| CostError::invariant(format!("missing argument {} ({})", index, name)))?;
    if arg.is_positional() {
        return Ok(arg);
    }
    args.iter()
        .find(|a| a.name() == name)
        .copied()
        .ok_or_else(|| CostError::invariant(format!("no argument named `{}`", name)))
}

/// Tensor descriptor of a tensor/ndarray argument
pub fn tensor(arg: &Arg) -> Result<TensorDesc, CostError> {
    arg.tensor()
        .cloned()
        .ok_or_else(|| CostError::invariant(format!("expected a tensor argument, got {:?}", arg)))
}

/// Tensor descriptor of a tensor argument, or a 0-d descriptor for a
/// numeric scalar (the producer already re-encoded 0-d tensors as scalars)
pub fn tensor_or_scalar(arg: &Arg) -> Result<TensorDesc, CostError> {
    match arg {
        Arg::Tensor { desc, .. } | Arg::Ndarray { desc, .. } => Ok(desc.clone()),
        Arg::Scalar { kind, .. } => {
            let dtype: Dtype = kind
                .parse()
                .map_err(|_| CostError::invariant(format!("non-numeric scalar `{}`", kind)))?;
            Ok(TensorDesc::scalar(dtype))
        }
        Arg::Sequence { .. } => Err(CostError::invariant("expected tensor or scalar, got sequence")),
    }
}

/// Integer value of a scalar argument
pub fn int_value(arg: &Arg) -> Result<i64, CostError> {
    match arg {
        Arg::Scalar {
            value: ScalarValue::Int(i),
            ..
        } => Ok(*i),
        other => Err(CostError::invariant(format!(
            "expected an integer scalar, got {:?}",
            other
        ))),
    }
}

/// String value of a scalar argument
pub fn str_value(arg: &Arg) -> Result<&str, CostError> {
    match arg {
        Arg::Scalar {
            value: ScalarValue::Str(s),
            ..
        } => Ok(s),
        other => Err(CostError::invariant(format!(
            "expected a string scalar, got {:?}",
            other
        ))),
    }
}

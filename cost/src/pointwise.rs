//! Elementwise operators
//!
//! Costs scale with the element count of the (possibly broadcast) output.
//! Direction changes the read/write multiplier: a binary add in backward
//! only writes the two output-sized gradients, the incoming gradient passes
//! through unchanged.

use crate::args;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Direction, Dtype, TensorDesc};

const UNARY: [&str; 9] = [
    "abs", "abs_", "neg", "neg_", "reciprocal", "reciprocal_", "__abs__", "__neg__", "__invert__",
];

const EXP_LOG: [&str; 12] = [
    "exp", "exp_", "exp1m", "exp1m_", "log", "log_", "log10", "log10_", "log1p", "log1p_", "log2",
    "log2_",
];

const SQRT: [&str; 4] = ["rsqrt", "rsqrt_", "sqrt", "sqrt_"];

const REPRESENTATION: [&str; 14] = [
    "ceil", "ceil_", "clamp", "clamp_", "floor", "floor_", "frac", "frac_", "round", "round_",
    "sign", "sign_", "trunc", "trunc_",
];

const TRIG_TRANS: [&str; 22] = [
    "acos", "acos_", "asin", "asin_", "atan", "atan_", "atan2", "atan2_", "cos", "cos_", "cosh",
    "cosh_", "sin", "sin_", "sinh", "sinh_", "tan", "tan_", "sigmoid", "sigmoid_", "tanh", "tanh_",
];

const ERROR_FNS: [&str; 6] = ["erf", "erf_", "erfc", "erfc_", "erfinv", "erfinv_"];

const BINARY: [&str; 24] = [
    "add", "add_", "div", "div_", "mul", "mul_", "remainder", "remainder_", "sub", "sub_",
    "__add__", "__sub__", "__mul__", "__floordiv__", "__truediv__", "__mod__", "__radd__",
    "__rsub__", "__rmul__", "__rdiv__", "__rtruediv__", "__rfloordiv__", "fmod", "fmod_",
];

const IBINARY: [&str; 4] = ["__iadd__", "__isub__", "__imul__", "__itruediv__"];

const POWER: [&str; 4] = ["pow", "pow_", "__pow__", "__rpow__"];

const COMP: [&str; 18] = [
    "lt", "lt_", "gt", "gt_", "ge", "ge_", "le", "le_", "eq", "eq_", "ne", "ne_", "__lt__",
    "__gt__", "__ge__", "__le__", "__eq__", "__ne__",
];

const LOGICAL: [&str; 5] = ["__and__", "__or__", "__xor__", "__lshift__", "__rshift__"];

const ILOGICAL: [&str; 5] = ["__iand__", "__ior__", "__ixor__", "__ilshift__", "__irshift__"];

const TERNARY: [&str; 4] = ["addcdiv", "addcdiv_", "addcmul", "addcmul_"];

const MISC: [&str; 4] = ["digamma", "lerp", "lerp_", "mvlgamma"];

/// Whether the pointwise family claims this operator name
pub fn claims(op: &str) -> bool {
    UNARY.contains(&op)
        || EXP_LOG.contains(&op)
        || SQRT.contains(&op)
        || REPRESENTATION.contains(&op)
        || TRIG_TRANS.contains(&op)
        || ERROR_FNS.contains(&op)
        || BINARY.contains(&op)
        || IBINARY.contains(&op)
        || POWER.contains(&op)
        || COMP.contains(&op)
        || LOGICAL.contains(&op)
        || ILOGICAL.contains(&op)
        || TERNARY.contains(&op)
        || MISC.contains(&op)
}

/// Gradients of add/sub pass through unchanged: two output-sized writes
const PASS_THROUGH_BPROP: [&str; 5] = ["add", "__add__", "sub", "__sub__", "__isub__"];

/// Backward of a product needs the other operand again: 3 output-sized moves
const PRODUCT_BPROP: [&str; 5] = ["__mul__", "__imul__", "__rmul__", "div", "__truediv__"];

pub struct Pointwise {
    module: String,
    op: String,
    inputs: Vec<TensorDesc>,
    bytes: u64,
    flops: u64,
}

impl Pointwise {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !claims(&marker.op) {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        // Named parameters (kwargs) do not feed the element count
        let pos = args::positional(&marker.args);
        if pos.len() > 4 {
            return Err(CostError::invariant(format!(
                "pointwise op `{}` with {} positional arguments",
                marker.op,
                pos.len()
            )));
        }

        let inputs = pos
            .iter()
            .map(|a| args::tensor_or_scalar(a))
            .collect::<Result<Vec<_>, _>>()?;

        let (bytes, flops) = Self::bytes_flops(&marker.op, &inputs, ctx.direction)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            inputs,
            bytes,
            flops,
        })
    }

    fn bytes_flops(
        op: &str,
        inputs: &[TensorDesc],
        direction: Direction,
    ) -> Result<(u64, u64), CostError> {
        let first = |inputs: &[TensorDesc]| -> Result<TensorDesc, CostError> {
            inputs
                .first()
                .cloned()
                .ok_or_else(|| CostError::invariant(format!("`{}` without arguments", op)))
        };

        // clamp carries min/max scalars, so unary checks >= 1 argument
        if UNARY.contains(&op) || REPRESENTATION.contains(&op) {
            let t = first(inputs)?;
            return Ok((2 * t.bytes(), t.size()));
        }

        if EXP_LOG.contains(&op)
            || TRIG_TRANS.contains(&op)
            || SQRT.contains(&op)
            || ERROR_FNS.contains(&op)
        {
            if inputs.len() != 1 {
                return Err(CostError::invariant(format!(
                    "`{}` expects one argument, got {}",
                    op,
                    inputs.len()
                )));
            }
            let t = &inputs[0];
            // transcendental estimate: ~20 flops per element
            return Ok((2 * t.bytes(), t.size() * 20));
        }

        if COMP.contains(&op)
            || BINARY.contains(&op)
            || IBINARY.contains(&op)
            || LOGICAL.contains(&op)
            || ILOGICAL.contains(&op)
        {
            if inputs.len() != 2 {
                return Err(CostError::invariant(format!(
                    "`{}` expects two arguments, got {}",
                    op,
                    inputs.len()
                )));
            }
            let out = TensorDesc::broadcast(inputs)
                .map_err(|e| CostError::invariant(e.to_string()))?;

            return match direction {
                Direction::Fprop => {
                    let mut b: u64 = inputs.iter().map(TensorDesc::bytes).sum();
                    // comparisons produce a bool output
                    let out = if COMP.contains(&op) {
                        out.with_dtype(Dtype::Bool)
                    } else {
                        out
                    };
                    b += out.bytes();
                    Ok((b, out.size()))
                }
                Direction::Bprop => {
                    if PASS_THROUGH_BPROP.contains(&op) {
                        Ok((2 * out.bytes(), 0))
                    } else if PRODUCT_BPROP.contains(&op) {
                        Ok((3 * out.bytes(), out.size()))
                    } else {
                        Err(CostError::invariant(format!(
                            "`{}` bprop not supported yet",
                            op
                        )))
                    }
                }
            };
        }

        if POWER.contains(&op) {
            if inputs.len() != 2 {
                return Err(CostError::invariant(format!(
                    "`{}` expects two arguments, got {}",
                    op,
                    inputs.len()
                )));
            }
            let out = TensorDesc::broadcast(inputs)
                .map_err(|e| CostError::invariant(e.to_string()))?;
            let b: u64 = inputs.iter().map(TensorDesc::bytes).sum::<u64>() + out.bytes();
            return Ok((b, out.size() * 20));
        }

        if TERNARY.contains(&op) {
            // the scale argument is a scalar; the cost is in the tensors
            let tensors: Vec<TensorDesc> = inputs
                .iter()
                .filter(|t| !t.shape().is_empty())
                .cloned()
                .collect();
            if tensors.len() != 3 {
                return Err(CostError::invariant(format!(
                    "`{}` expects three tensor arguments, got {}",
                    op,
                    tensors.len()
                )));
            }
            let out = TensorDesc::broadcast(&tensors)
                .map_err(|e| CostError::invariant(e.to_string()))?;
            let b: u64 = tensors.iter().map(TensorDesc::bytes).sum::<u64>() + out.bytes();
            return Ok((b, 3 * out.size()));
        }

        Err(CostError::invariant(format!(
            "`{}` cost model not implemented",
            op
        )))
    }
}

impl OperatorLayer for Pointwise {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        let parts: Vec<String> = self.inputs.iter().map(|t| t.to_string()).collect();
        Params::text(parts.join(";"))
    }

    fn flops(&self) -> u64 {
        self.flops
    }

    fn bytes(&self) -> u64 {
        self.bytes
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

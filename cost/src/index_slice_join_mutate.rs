//! Index, slice, join and mutate operations
//!
//! Mostly data movement: flops are zero throughout. `nonzero` and
//! `masked_select` have data-dependent output sizes and charge the worst
//! case. `reshape` is a metadata-only view and moves no bytes.

use crate::args;
use crate::{fmt_shape, CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Arg, Dtype, ScalarValue, TensorDesc};

/// Concatenate a list of tensors along an axis (`cat`/`stack`)
pub struct Cat {
    module: String,
    op: String,
    inputs: Vec<TensorDesc>,
    axis: usize,
    sub_seq_id: i64,
}

impl Cat {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "torch" || !matches!(marker.op.as_str(), "cat" | "stack") {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() < 2 {
            return Err(CostError::invariant(format!(
                "{} expects at least two arguments, got {}",
                marker.op,
                marker.args.len()
            )));
        }

        let inputs: Vec<TensorDesc> = marker
            .args
            .iter()
            .filter_map(Arg::tensor)
            .cloned()
            .collect();
        let first = inputs
            .first()
            .ok_or_else(|| CostError::invariant("cat without tensor arguments"))?
            .clone();
        if inputs.iter().any(|t| t.dtype() != first.dtype()) {
            return Err(CostError::invariant("cat inputs must share one dtype"));
        }

        let axis = resolve_axis(&marker.args, first.ndim())?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            inputs,
            axis,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

/// Recover the concatenation axis from whichever positional or keyword
/// argument supplies it; negative values count from the end, so -1 on a
/// 2-d input resolves to 1. Defaults to 0 when absent.
fn resolve_axis(op_args: &[Arg], ndim: usize) -> Result<usize, CostError> {
    let dim = op_args
        .iter()
        .find_map(|a| match a {
            Arg::Scalar {
                name,
                value: ScalarValue::Int(i),
                ..
            } if name.is_empty() || name == "dim" => Some(*i),
            _ => None,
        })
        .unwrap_or(0);

    let rank = ndim as i64;
    let resolved = if dim < 0 { rank + dim } else { dim };
    if resolved < 0 || resolved >= rank.max(1) {
        return Err(CostError::invariant(format!(
            "axis {} out of range for rank {}",
            dim, ndim
        )));
    }
    Ok(resolved as usize)
}

impl OperatorLayer for Cat {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        let mut parts: Vec<String> = self.inputs.iter().map(|t| t.to_string()).collect();
        parts.push(format!("dim={}", self.axis));
        Params::text(parts.join(";"))
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        if self.sub_seq_id != 0 {
            return 0;
        }
        // 1 read, 1 write per input element
        2 * self.inputs.iter().map(TensorDesc::bytes).sum::<u64>()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

/// Metadata-only view change: moves no bytes regardless of tensor size
pub struct Reshape {
    module: String,
    op: String,
    input: TensorDesc,
}

impl Reshape {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "Tensor" || marker.op != "reshape" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        let first = marker
            .args
            .first()
            .ok_or_else(|| CostError::invariant("reshape without arguments"))?;
        let input = args::tensor(first)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
        })
    }
}

impl OperatorLayer for Reshape {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.input.shape())),
            ("type".to_string(), self.input.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        0
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Gather {
    module: String,
    op: String,
    input: TensorDesc,
}

impl Gather {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !matches!(marker.module.as_str(), "Tensor" | "torch") || marker.op != "gather" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        let rest = args::without_out(&marker.args);
        if rest.len() != 3 {
            return Err(CostError::invariant(format!(
                "gather expects input, dim, index; got {} arguments",
                rest.len()
            )));
        }
        let input = args::tensor(args::select(&rest, 0, "input")?)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
        })
    }
}

impl OperatorLayer for Gather {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.input.shape())),
            ("type".to_string(), self.input.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        2 * self.input.bytes()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct MaskedScatter {
    module: String,
    op: String,
    dst: TensorDesc,
    sub_seq_id: i64,
}

impl MaskedScatter {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "Tensor" || marker.op != "masked_scatter_" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 3 {
            return Err(CostError::invariant(format!(
                "masked_scatter_ expects dst, mask, src; got {}",
                marker.args.len()
            )));
        }

        let dst = args::tensor(&marker.args[0])?;
        let mask = args::tensor(&marker.args[1])?;
        let src = args::tensor(&marker.args[2])?;
        if mask.dtype() != Dtype::Uint8 {
            return Err(CostError::invariant("masked_scatter_ mask must be uint8"));
        }
        if dst.dtype() != src.dtype() || dst.shape() != mask.shape() {
            return Err(CostError::invariant(
                "masked_scatter_ argument shapes/dtypes disagree",
            ));
        }

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            dst,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

impl OperatorLayer for MaskedScatter {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.dst.shape())),
            ("type".to_string(), self.dst.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        if self.sub_seq_id > 0 {
            return 0;
        }
        // src and dst, plus the uint8 mask
        2 * self.dst.bytes() + self.dst.size()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

/// Output size is data-dependent; the worst case (every element non-zero)
/// is charged since the true size is unknowable statically.
pub struct Nonzero {
    module: String,
    op: String,
    input: TensorDesc,
    sub_seq_id: i64,
}

impl Nonzero {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !matches!(marker.module.as_str(), "torch" | "Tensor") || marker.op != "nonzero" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 1 {
            return Err(CostError::invariant(format!(
                "nonzero expects one argument, got {}",
                marker.args.len()
            )));
        }
        let input = args::tensor(&marker.args[0])?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

impl OperatorLayer for Nonzero {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.input.shape())),
            ("type".to_string(), self.input.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        if self.sub_seq_id > 0 {
            return 0;
        }
        let elems = self.input.size();
        let dim = self.input.ndim() as u64;
        // input, plus a worst-case (elems x dim) int64 index tensor
        self.input.bytes() + elems * dim * Dtype::Int64.itemsize()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct IndexSelect {
    module: String,
    op: String,
    input: TensorDesc,
    dim: usize,
    indices: u64,
}

impl IndexSelect {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !matches!(marker.module.as_str(), "Tensor" | "torch") || marker.op != "index_select" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        let rest = args::without_out(&marker.args);
        if rest.len() != 3 {
            return Err(CostError::invariant(format!(
                "index_select expects input, dim, index; got {}",
                rest.len()
            )));
        }

        let input = args::tensor(args::select(&rest, 0, "input")?)?;
        let dim = args::int_value(args::select(&rest, 1, "dim")?)?;
        let index = args::tensor(args::select(&rest, 2, "index")?)?;

        if index.dtype() != Dtype::Int64 || index.ndim() != 1 {
            return Err(CostError::invariant(
                "index_select index must be a 1-d int64 tensor",
            ));
        }
        if dim < 0 || dim as usize >= input.ndim() {
            return Err(CostError::invariant(format!(
                "index_select dim {} out of range for rank {}",
                dim,
                input.ndim()
            )));
        }

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            indices: index.shape()[0] as u64,
            dim: dim as usize,
            input,
        })
    }
}

impl OperatorLayer for IndexSelect {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.input.shape())),
            ("D".to_string(), self.dim.to_string()),
            ("I".to_string(), self.indices.to_string()),
            ("type".to_string(), self.input.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        let mut out_shape = self.input.shape().to_vec();
        out_shape[self.dim] = self.indices as usize;
        let out = TensorDesc::new(out_shape, self.input.dtype());

        // read the input slice, write the output, read the indices
        2 * out.bytes() + self.indices * Dtype::Int64.itemsize()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

/// Worst case: every element selected
pub struct MaskedSelect {
    module: String,
    op: String,
    input: TensorDesc,
    mask: TensorDesc,
}

impl MaskedSelect {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !matches!(marker.module.as_str(), "Tensor" | "torch") || marker.op != "masked_select" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        let rest = args::without_out(&marker.args);
        if rest.len() != 2 {
            return Err(CostError::invariant(format!(
                "masked_select expects input and mask, got {}",
                rest.len()
            )));
        }

        let input = args::tensor(args::select(&rest, 0, "input")?)?;
        let mask = args::tensor(args::select(&rest, 1, "mask")?)?;
        if mask.dtype() != Dtype::Uint8 {
            return Err(CostError::invariant("masked_select mask must be uint8"));
        }
        if input.shape() != mask.shape() {
            TensorDesc::broadcast(&[input.clone(), mask.clone()])
                .map_err(|e| CostError::invariant(e.to_string()))?;
        }

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            mask,
        })
    }
}

impl OperatorLayer for MaskedSelect {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.input.shape())),
            ("M".to_string(), fmt_shape(self.mask.shape())),
            ("type".to_string(), self.input.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        2 * self.input.bytes() + self.mask.size()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

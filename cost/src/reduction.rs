//! Reductions
//!
//! Bytes are dominated by reading the input once. A reduction can launch
//! several cooperating kernels under the same sequence id; only the first
//! (sub-sequence id 0) is charged, the rest would double count.

use crate::args;
use crate::{fmt_shape, CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::TensorDesc;

const MODULES: [&str; 2] = ["torch", "Tensor"];

pub struct Mean {
    module: String,
    op: String,
    input: TensorDesc,
    sub_seq_id: i64,
}

impl Mean {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !MODULES.contains(&marker.module.as_str()) || marker.op != "mean" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        let pos = args::positional(&marker.args);
        if pos.is_empty() || pos.len() > 2 {
            return Err(CostError::invariant(format!(
                "mean expects 1-2 positional arguments, got {}",
                pos.len()
            )));
        }
        let input = args::tensor_or_scalar(pos[0])?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

impl OperatorLayer for Mean {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        if self.sub_seq_id == 0 {
            self.input.size() + 1
        } else {
            0
        }
    }

    fn bytes(&self) -> u64 {
        if self.sub_seq_id == 0 {
            self.input.bytes() + self.input.itemsize()
        } else {
            0
        }
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Sum {
    module: String,
    op: String,
    input: TensorDesc,
    sub_seq_id: i64,
}

impl Sum {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !MODULES.contains(&marker.module.as_str()) || marker.op != "sum" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.is_empty() {
            return Err(CostError::invariant("sum without arguments"));
        }

        let all: Vec<&kernelscope_shared::Arg> = marker.args.iter().collect();
        let input = args::tensor(args::select(&all, 0, "input")?)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

impl OperatorLayer for Sum {
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
        self.input.size()
    }

    fn bytes(&self) -> u64 {
        if self.sub_seq_id == 0 {
            self.input.bytes()
        } else {
            0
        }
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Norm {
    module: String,
    op: String,
    input: TensorDesc,
    sub_seq_id: i64,
}

impl Norm {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !MODULES.contains(&marker.module.as_str()) || marker.op != "norm" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        let first = marker
            .args
            .first()
            .ok_or_else(|| CostError::invariant("norm without arguments"))?;
        let input = args::tensor(first)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

impl OperatorLayer for Norm {
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
        if self.sub_seq_id == 0 {
            // square-and-add over the input, plus the final sqrt
            2 * self.input.size() + 1
        } else {
            0
        }
    }

    fn bytes(&self) -> u64 {
        if self.sub_seq_id == 0 {
            self.input.bytes()
        } else {
            0
        }
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelscope_shared::{Arg, Direction, Dtype, OpMarker};

    fn marker(op: &str) -> OpMarker {
        OpMarker {
            module: "torch".to_string(),
            op: op.to_string(),
            call_id: None,
            input_call_ids: Vec::new(),
            args: vec![Arg::Tensor {
                name: String::new(),
                desc: TensorDesc::new(vec![128, 64], Dtype::Float32),
            }],
        }
    }

    fn ctx<'a>(marker: &'a OpMarker, sub: i64) -> OpContext<'a> {
        OpContext {
            marker,
            repr: None,
            direction: Direction::Fprop,
            sub_seq_id: sub,
            kernel_name: "reduce_kernel",
            grid: (1, 1, 1),
        }
    }

    #[test]
    fn test_sum_costs() {
        let m = marker("sum");
        let s = Sum::new(&ctx(&m, 0)).unwrap();
        assert_eq!(s.flops(), 128 * 64);
        assert_eq!(s.bytes(), 128 * 64 * 4);
    }

    #[test]
    fn test_duplicate_kernel_is_not_charged() {
        let m = marker("sum");
        let s = Sum::new(&ctx(&m, 1)).unwrap();
        assert_eq!(s.bytes(), 0);

        let m = marker("mean");
        let me = Mean::new(&ctx(&m, 1)).unwrap();
        assert_eq!(me.bytes(), 0);
        assert_eq!(me.flops(), 0);
    }

    #[test]
    fn test_mean_adds_output_scalar() {
        let m = marker("mean");
        let me = Mean::new(&ctx(&m, 0)).unwrap();
        assert_eq!(me.bytes(), 128 * 64 * 4 + 4);
        assert_eq!(me.flops(), 128 * 64 + 1);
    }

    #[test]
    fn test_norm_square_add_sqrt() {
        let m = marker("norm");
        let n = Norm::new(&ctx(&m, 0)).unwrap();
        assert_eq!(n.flops(), 2 * 128 * 64 + 1);
        assert_eq!(n.params().to_string(), "T=(128,64),fp32");
    }

    #[test]
    fn test_wrong_module_unsupported() {
        let mut m = marker("sum");
        m.module = "torch.nn.functional".to_string();
        assert!(matches!(
            Sum::new(&ctx(&m, 0)),
            Err(CostError::Unsupported { .. })
        ));
    }
}

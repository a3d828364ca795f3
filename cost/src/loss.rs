//! Loss functions
//!
//! With reduction `none` the elementwise loss tensor is materialized, which
//! costs one extra tensor-sized move compared to the reduced modes.

use crate::args;
use crate::{fmt_shape, CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Direction, TensorDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    None,
    Mean,
    Sum,
}

impl Reduction {
    fn parse(s: &str) -> Result<Self, CostError> {
        match s {
            "none" => Ok(Reduction::None),
            "mean" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            other => Err(CostError::invariant(format!(
                "unknown reduction `{}`",
                other
            ))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Reduction::None => "none",
            Reduction::Mean => "mean",
            Reduction::Sum => "sum",
        }
    }
}

pub struct MseLoss {
    module: String,
    op: String,
    input: TensorDesc,
    reduction: Reduction,
    direction: Direction,
}

impl MseLoss {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "torch.nn.functional" || marker.op != "mse_loss" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 3 {
            return Err(CostError::invariant(format!(
                "mse_loss expects input, target, reduction; got {}",
                marker.args.len()
            )));
        }

        let all: Vec<&kernelscope_shared::Arg> = marker.args.iter().collect();
        let input = args::tensor(args::select(&all, 0, "input")?)?;
        let target = args::tensor(args::select(&all, 1, "target")?)?;
        let reduction = Reduction::parse(args::str_value(args::select(&all, 2, "reduction")?)?)?;

        if input.shape() != target.shape() || input.dtype() != target.dtype() {
            return Err(CostError::invariant(
                "mse_loss input and target must match in shape and dtype",
            ));
        }

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            reduction,
            direction: ctx.direction,
        })
    }

    fn elems(&self) -> u64 {
        let e = self.input.size();
        let multiplier = match (self.direction, self.reduction) {
            (Direction::Fprop, Reduction::None) => 3,
            (Direction::Fprop, _) => 2,
            (Direction::Bprop, Reduction::None) => 4,
            (Direction::Bprop, _) => 3,
        };
        e * multiplier
    }
}

impl OperatorLayer for MseLoss {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.input.shape())),
            ("type".to_string(), self.input.dtype().to_string()),
            ("red".to_string(), self.reduction.as_str().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        self.elems() * 2 + 1
    }

    fn bytes(&self) -> u64 {
        self.elems() * self.input.itemsize()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

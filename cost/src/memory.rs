//! Tensor initialization (ones/zeros/fill/full)

use crate::args;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Arg, Dtype, TensorDesc};

const ONE_ZERO_OPS: [&str; 5] = ["ones", "ones_like", "zero_", "zeros", "zeros_like"];

/// Whether the one/zero family claims this operator name
pub fn claims_one_zero(op: &str) -> bool {
    ONE_ZERO_OPS.contains(&op)
}

pub struct OneZero {
    module: String,
    op: String,
    input: TensorDesc,
}

impl OneZero {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !matches!(marker.module.as_str(), "torch" | "Tensor") || !claims_one_zero(&marker.op) {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 1 {
            return Err(CostError::invariant(format!(
                "{} expects one argument, got {}",
                marker.op,
                marker.args.len()
            )));
        }
        let input = args::tensor(&marker.args[0])?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
        })
    }
}

impl OperatorLayer for OneZero {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        self.input.bytes()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Fill {
    module: String,
    op: String,
    input: TensorDesc,
}

impl Fill {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "Tensor" || marker.op != "fill_" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 2 {
            return Err(CostError::invariant(format!(
                "fill_ expects tensor and value, got {} arguments",
                marker.args.len()
            )));
        }
        let input = args::tensor(&marker.args[0])?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
        })
    }
}

impl OperatorLayer for Fill {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        self.input.bytes()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Full {
    module: String,
    op: String,
    output: TensorDesc,
}

impl Full {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "torch" || marker.op != "full" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 2 {
            return Err(CostError::invariant(format!(
                "full expects shape and fill value, got {} arguments",
                marker.args.len()
            )));
        }

        // the output shape arrives as a scalar sequence
        let shape = match &marker.args[0] {
            Arg::Sequence { values, .. } => values
                .iter()
                .map(|v| v.as_int().and_then(|i| usize::try_from(i).ok()))
                .collect::<Option<Vec<usize>>>()
                .ok_or_else(|| CostError::invariant("full shape must be integers"))?,
            other => {
                return Err(CostError::invariant(format!(
                    "full expects a shape sequence, got {:?}",
                    other
                )))
            }
        };
        let dtype: Dtype = match &marker.args[1] {
            Arg::Scalar { kind, .. } => kind
                .parse()
                .map_err(|_| CostError::invariant(format!("non-numeric fill value `{}`", kind)))?,
            other => {
                return Err(CostError::invariant(format!(
                    "full expects a scalar fill value, got {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            output: TensorDesc::new(shape, dtype),
        })
    }
}

impl OperatorLayer for Full {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.output.to_string())
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        self.output.bytes()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

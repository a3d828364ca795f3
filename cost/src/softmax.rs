//! Softmax and log-softmax
//!
//! The exponential is modeled at ~20 transcendental-equivalent flops per
//! element.

use crate::args;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Direction, TensorDesc};

pub struct Softmax {
    module: String,
    op: String,
    input: TensorDesc,
    direction: Direction,
}

impl Softmax {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "torch.nn.functional" || marker.op != "softmax" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        let pos = args::positional(&marker.args);
        if pos.is_empty() || pos.len() > 2 {
            return Err(CostError::invariant(format!(
                "softmax expects 1-2 positional arguments, got {}",
                pos.len()
            )));
        }
        let input = args::tensor(pos[0])?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            direction: ctx.direction,
        })
    }
}

impl OperatorLayer for Softmax {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        let e = self.input.size();
        // denominator: exp all elements and reduce; numerator: exp and divide
        e * 20 + e * 20
    }

    fn bytes(&self) -> u64 {
        // fprop is 2 reads, 1 write; bprop is 4 reads, 1 write
        let multiplier = match self.direction {
            Direction::Fprop => 3,
            Direction::Bprop => 5,
        };
        self.input.bytes() * multiplier
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct LogSoftmax {
    module: String,
    op: String,
    input: TensorDesc,
    direction: Direction,
}

impl LogSoftmax {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        let modules = ["torch", "Tensor", "torch.nn.functional"];
        if !modules.contains(&marker.module.as_str()) || marker.op != "log_softmax" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        let pos = args::positional(&marker.args);
        if pos.is_empty() || pos.len() > 2 {
            return Err(CostError::invariant(format!(
                "log_softmax expects 1-2 positional arguments, got {}",
                pos.len()
            )));
        }
        let input = args::tensor(pos[0])?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            direction: ctx.direction,
        })
    }
}

impl OperatorLayer for LogSoftmax {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        let e = self.input.size();
        // denominator: exp all elements and reduce; numerator: a subtraction
        e * 20 + e
    }

    fn bytes(&self) -> u64 {
        let multiplier = match self.direction {
            Direction::Fprop => 3,
            Direction::Bprop => 5,
        };
        self.input.bytes() * multiplier
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

//! Activation functions

use crate::args;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Direction, TensorDesc};

const OPS: [&str; 24] = [
    "celu",
    "elu",
    "elu_",
    "hardshrink",
    "hardtanh",
    "hardtanh_",
    "leaky_relu",
    "leaky_relu_",
    "logsigmoid",
    "prelu",
    "relu",
    "relu_",
    "relu6",
    "rrelu",
    "rrelu_",
    "selu",
    "sigmoid",
    "softplus",
    "softshrink",
    "softsign",
    "tanh",
    "tanhshrink",
    "threshold",
    "threshold_",
];

const MODULES: [&str; 3] = ["torch.nn.functional", "torch", "Tensor"];

/// Whether the activation family claims this operator name
pub fn claims(op: &str) -> bool {
    OPS.contains(&op)
}

pub struct Activation {
    module: String,
    op: String,
    input: TensorDesc,
    direction: Direction,
}

impl Activation {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !MODULES.contains(&marker.module.as_str()) || !claims(&marker.op) {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }

        let pos = args::positional(&marker.args);
        let first = pos
            .first()
            .ok_or_else(|| CostError::invariant("activation without arguments"))?;
        let input = args::tensor(first)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            direction: ctx.direction,
        })
    }
}

impl OperatorLayer for Activation {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        self.input.size()
    }

    fn bytes(&self) -> u64 {
        // fprop is 1 read, 1 write; bprop is 2 reads, 1 write
        let multiplier = match self.direction {
            Direction::Fprop => 2,
            Direction::Bprop => 3,
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

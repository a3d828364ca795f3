//! Batch normalization

use crate::args;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Direction, TensorDesc};

pub struct BatchNorm {
    module: String,
    op: String,
    input: TensorDesc,
    direction: Direction,
    sub_seq_id: i64,
}

impl BatchNorm {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.op != "batch_norm" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        let first = marker
            .args
            .first()
            .ok_or_else(|| CostError::invariant("batch_norm without arguments"))?;
        let input = args::tensor(first)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            direction: ctx.direction,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

impl OperatorLayer for BatchNorm {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        // variance is algo-dependent; 8 per element is a reasonable value
        self.input.size() * 8
    }

    fn bytes(&self) -> u64 {
        if self.sub_seq_id > 0 {
            return 0;
        }
        // fprop is 2 reads, 2 writes; bprop is 4 reads, 1 write
        let multiplier = match self.direction {
            Direction::Fprop => 4,
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

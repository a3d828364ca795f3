//! Dropout

use crate::args;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::TensorDesc;

pub struct Dropout {
    module: String,
    op: String,
    input: TensorDesc,
}

impl Dropout {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "torch.nn.functional" || marker.op != "dropout" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        let first = marker
            .args
            .first()
            .ok_or_else(|| CostError::invariant("dropout without arguments"))?;
        let input = args::tensor(first)?;

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
        })
    }
}

impl OperatorLayer for Dropout {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::text(self.input.to_string())
    }

    fn flops(&self) -> u64 {
        // approximate; depends on the RNG
        5 * self.input.size()
    }

    fn bytes(&self) -> u64 {
        // ignores the cost of writing and reading the mask
        2 * self.input.bytes()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

//! Dtype conversions
//!
//! A cast reads the source and writes the destination; no arithmetic is
//! charged.

use crate::args;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Dtype, TensorDesc};

const OPS: [&str; 9] = [
    "byte", "char", "double", "float", "half", "int", "long", "short", "to",
];

/// Whether the convert family claims this operator name
pub fn claims(op: &str) -> bool {
    OPS.contains(&op)
}

pub struct Convert {
    module: String,
    op: String,
    input: TensorDesc,
    output: TensorDesc,
}

impl Convert {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "Tensor" || !claims(&marker.op) {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 1 {
            return Err(CostError::invariant(format!(
                "convert expects one argument, got {}",
                marker.args.len()
            )));
        }

        let input = args::tensor_or_scalar(&marker.args[0])?;
        let output = if marker.op == "to" {
            // the target dtype is not recorded; assume same width
            input.clone()
        } else {
            let dtype: Dtype = marker
                .op
                .parse()
                .map_err(|_| CostError::invariant(format!("`{}` is not a dtype", marker.op)))?;
            input.with_dtype(dtype)
        };

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
            output,
        })
    }
}

impl OperatorLayer for Convert {
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
        self.input.bytes() + self.output.bytes()
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
    use kernelscope_shared::{Arg, Direction, OpMarker};

    fn marker(op: &str) -> OpMarker {
        OpMarker {
            module: "Tensor".to_string(),
            op: op.to_string(),
            call_id: None,
            input_call_ids: Vec::new(),
            args: vec![Arg::Tensor {
                name: String::new(),
                desc: TensorDesc::new(vec![100], Dtype::Float32),
            }],
        }
    }

    fn ctx<'a>(marker: &'a OpMarker) -> OpContext<'a> {
        OpContext {
            marker,
            repr: None,
            direction: Direction::Fprop,
            sub_seq_id: 0,
            kernel_name: "copy_device_to_device",
            grid: (1, 1, 1),
        }
    }

    #[test]
    fn test_half_reads_fp32_writes_fp16() {
        let m = marker("half");
        let c = Convert::new(&ctx(&m)).unwrap();
        assert_eq!(c.bytes(), 100 * 4 + 100 * 2);
        assert_eq!(c.flops(), 0);
    }

    #[test]
    fn test_to_assumes_same_width() {
        let m = marker("to");
        let c = Convert::new(&ctx(&m)).unwrap();
        assert_eq!(c.bytes(), 2 * 100 * 4);
    }

    #[test]
    fn test_wrong_module_unsupported() {
        let mut m = marker("half");
        m.module = "torch".to_string();
        assert!(matches!(
            Convert::new(&ctx(&m)),
            Err(CostError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_extra_arguments_violate_invariant() {
        let mut m = marker("to");
        m.args.push(m.args[0].clone());
        assert!(matches!(
            Convert::new(&ctx(&m)),
            Err(CostError::Invariant(_))
        ));
    }
}

//! Embedding lookup
//!
//! Forward gathers rows of the embedding matrix; backward scatters the
//! incoming gradient back. The backward update can fire several kernels;
//! only the first is charged.

use crate::args;
use crate::{fmt_shape, CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Direction, TensorDesc};

pub struct Embedding {
    module: String,
    op: String,
    indices: TensorDesc,
    table: TensorDesc,
    direction: Direction,
    sub_seq_id: i64,
}

impl Embedding {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "torch.nn.functional" || marker.op != "embedding" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() < 2 {
            return Err(CostError::invariant(format!(
                "embedding expects indices and table, got {} arguments",
                marker.args.len()
            )));
        }

        let indices = args::tensor(&marker.args[0])?;
        let table = args::tensor(&marker.args[1])?;
        if table.ndim() != 2 {
            return Err(CostError::invariant(format!(
                "embedding table must be 2-d, got shape {:?}",
                table.shape()
            )));
        }

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            indices,
            table,
            direction: ctx.direction,
            sub_seq_id: ctx.sub_seq_id,
        })
    }
}

impl OperatorLayer for Embedding {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        Params::Pairs(vec![
            ("I".to_string(), fmt_shape(self.indices.shape())),
            ("itype".to_string(), self.indices.dtype().to_string()),
            ("E".to_string(), fmt_shape(self.table.shape())),
            ("etype".to_string(), self.table.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        let lookups = self.indices.size();
        let row_width = self.table.shape()[1] as u64;
        let row_bytes = lookups * row_width * self.table.itemsize();

        match self.direction {
            Direction::Fprop => {
                // read the indices, then read and write one row per lookup
                self.indices.bytes() + 2 * row_bytes
            }
            Direction::Bprop => {
                if self.sub_seq_id > 0 {
                    0
                } else {
                    // three times the incoming gradient
                    3 * row_bytes
                }
            }
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
    use kernelscope_shared::{Arg, Dtype, OpMarker};

    fn marker() -> OpMarker {
        OpMarker {
            module: "torch.nn.functional".to_string(),
            op: "embedding".to_string(),
            call_id: None,
            input_call_ids: Vec::new(),
            args: vec![
                Arg::Tensor {
                    name: String::new(),
                    desc: TensorDesc::new(vec![8, 16], Dtype::Int64),
                },
                Arg::Tensor {
                    name: String::new(),
                    desc: TensorDesc::new(vec![30000, 512], Dtype::Float32),
                },
            ],
        }
    }

    fn ctx<'a>(marker: &'a OpMarker, direction: Direction, sub: i64) -> OpContext<'a> {
        OpContext {
            marker,
            repr: None,
            direction,
            sub_seq_id: sub,
            kernel_name: "indexSelectLargeIndex",
            grid: (1, 1, 1),
        }
    }

    #[test]
    fn test_fprop_bytes() {
        let m = marker();
        let e = Embedding::new(&ctx(&m, Direction::Fprop, 0)).unwrap();
        let lookups = 8 * 16u64;
        assert_eq!(e.bytes(), lookups * 8 + 2 * lookups * 512 * 4);
        assert_eq!(e.flops(), 0);
    }

    #[test]
    fn test_bprop_bytes_and_duplicate_gate() {
        let m = marker();
        let lookups = 8 * 16u64;

        let e = Embedding::new(&ctx(&m, Direction::Bprop, 0)).unwrap();
        assert_eq!(e.bytes(), 3 * lookups * 512 * 4);

        let e = Embedding::new(&ctx(&m, Direction::Bprop, 1)).unwrap();
        assert_eq!(e.bytes(), 0);
    }

    #[test]
    fn test_non_2d_table_is_invariant_error() {
        let mut m = marker();
        m.args[1] = Arg::Tensor {
            name: String::new(),
            desc: TensorDesc::new(vec![30000], Dtype::Float32),
        };
        assert!(matches!(
            Embedding::new(&ctx(&m, Direction::Fprop, 0)),
            Err(CostError::Invariant(_))
        ));
    }
}

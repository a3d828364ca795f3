//! Recurrent layers (LSTM, GRU)
//!
//! The most heuristic-heavy calculator, kept isolated so its assumptions
//! are easy to revisit. Layer hyperparameters come from the module-repr
//! marker; batch size and sequence length are inferred differently for
//! packed (rank-2) and unpacked (rank-3) inputs; GEMM kernels are
//! classified from their mangled name and grid dimensions.

use crate::args;
use crate::tc::is_tensor_core_kernel;
use crate::{CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Direction, Dtype, ReprMarker};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Lstm,
    Gru,
}

impl Cell {
    fn name(&self) -> &'static str {
        match self {
            Cell::Lstm => "LSTM",
            Cell::Gru => "GRU",
        }
    }

    /// Gates per step: i,f,g,o for LSTM; r,z,n for GRU
    fn gates(&self) -> u64 {
        match self {
            Cell::Lstm => 4,
            Cell::Gru => 3,
        }
    }
}

/// Hyperparameters recovered from the module's repr string, e.g.
/// `10, 20, num_layers=2, bias=False, bidirectional=True`
#[derive(Debug, Clone)]
struct RnnConfig {
    cell: Cell,
    input_size: u64,
    hidden_size: u64,
    num_layers: u64,
    batch_first: bool,
    bidirectional: bool,
}

impl RnnConfig {
    fn parse(repr: &ReprMarker) -> Result<Self, CostError> {
        let cell = match repr.module.as_str() {
            "LSTM" => Cell::Lstm,
            "GRU" => Cell::Gru,
            other => {
                return Err(CostError::invariant(format!(
                    "unsupported recurrent cell `{}`",
                    other
                )))
            }
        };

        let text = repr.repr.replace(' ', "");
        let mut fields = text.split(',');

        let parse_int = |s: Option<&str>| -> Result<u64, CostError> {
            s.and_then(|v| v.parse().ok())
                .ok_or_else(|| CostError::invariant(format!("malformed repr `{}`", repr.repr)))
        };
        let input_size = parse_int(fields.next())?;
        let hidden_size = parse_int(fields.next())?;

        let mut config = Self {
            cell,
            input_size,
            hidden_size,
            num_layers: 1,
            batch_first: false,
            bidirectional: false,
        };

        for field in fields {
            let (key, value) = field.split_once('=').ok_or_else(|| {
                CostError::invariant(format!("repr field without `=`: {}", field))
            })?;
            match key {
                "num_layers" => {
                    config.num_layers = value
                        .parse()
                        .map_err(|_| CostError::invariant("non-integer num_layers"))?
                }
                "batch_first" => config.batch_first = value == "True",
                "bidirectional" => config.bidirectional = value == "True",
                "bias" | "dropout" => {}
                other => debug!("ignoring repr field `{}`", other),
            }
        }
        Ok(config)
    }
}

/// cuDNN fuses this many timesteps into one layer gemm
fn fusion_steps(direction: Direction, batch: u64) -> u64 {
    match direction {
        Direction::Fprop => match batch {
            0..=1 => 32,
            2..=8 => 16,
            9..=16 => 8,
            17..=48 => 4,
            _ => 2,
        },
        Direction::Bprop => match batch {
            0..=1 => 32,
            2..=8 => 16,
            9..=16 => 8,
            17..=96 => 4,
            _ => 2,
        },
    }
}

fn has_tile_size(name: &str) -> bool {
    name.contains("sgemm") || name.contains("884gemm") || name.contains("hgemm")
}

/// CTA tile dimensions embedded in the kernel name, e.g. `..._128x64_nn`
fn cta_tile(name: &str) -> Result<(u64, u64), CostError> {
    let candidates: Vec<&str> = name
        .split('_')
        .filter(|part| part.contains('x') && !part.contains("slice"))
        .collect();
    if candidates.len() != 1 {
        return Err(CostError::invariant(format!(
            "cannot find a tile size in kernel name `{}`",
            name
        )));
    }
    let (x, y) = candidates[0]
        .split_once('x')
        .ok_or_else(|| CostError::invariant("malformed tile size"))?;
    let tile_x = x
        .parse()
        .map_err(|_| CostError::invariant(format!("non-integer tile `{}`", candidates[0])))?;
    let tile_y = y
        .parse()
        .map_err(|_| CostError::invariant(format!("non-integer tile `{}`", candidates[0])))?;
    Ok((tile_x, tile_y))
}

pub struct RnnBase {
    module: String,
    op: String,
    kernel_name: String,
    config: RnnConfig,
    batch: u64,
    seq_len: u64,
    dtype: Dtype,
    flops: u64,
    bytes: u64,
    kernel_params: Option<Vec<(String, String)>>,
}

impl RnnBase {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !matches!(marker.module.as_str(), "LSTM" | "GRU") || marker.op != "forward" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        let repr = ctx
            .repr
            .ok_or_else(|| CostError::invariant("recurrent layer without a repr marker"))?;
        let config = RnnConfig::parse(repr)?;

        let first = marker
            .args
            .first()
            .ok_or_else(|| CostError::invariant("recurrent layer without arguments"))?;
        let input = args::tensor(first)?;

        // rank 2 means a packed sequence, rank 3 an unpacked (B,L,X) batch
        let (batch, seq_len, x) = match input.ndim() {
            2 => {
                let batch_sizes = marker
                    .args
                    .get(1)
                    .and_then(|a| a.tensor())
                    .ok_or_else(|| {
                        CostError::invariant("packed sequence without a batch-sizes tensor")
                    })?;
                let l = batch_sizes.shape()[0] as u64;
                if l == 0 {
                    return Err(CostError::invariant("packed sequence of length zero"));
                }
                let x = input.shape()[1] as u64;
                let b = packed_batch_size(input.shape()[0] as u64, l);
                (b, l, x)
            }
            3 => {
                let s = input.shape();
                if config.batch_first {
                    (s[0] as u64, s[1] as u64, s[2] as u64)
                } else {
                    (s[1] as u64, s[0] as u64, s[2] as u64)
                }
            }
            n => {
                return Err(CostError::invariant(format!(
                    "recurrent input must be rank 2 or 3, got {}",
                    n
                )))
            }
        };

        if x != config.input_size {
            return Err(CostError::invariant(format!(
                "input width {} disagrees with repr input_size {}",
                x, config.input_size
            )));
        }

        let mut layer = Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            kernel_name: ctx.kernel_name.to_string(),
            config,
            batch,
            seq_len,
            dtype: input.dtype(),
            flops: 0,
            bytes: 0,
            kernel_params: None,
        };
        layer.classify_kernel(ctx.direction, ctx.grid)?;
        Ok(layer)
    }

    /// Attribute cost to this specific kernel by name: cuDNN dropout,
    /// the fused pointwise cell kernel, or one of the gemms.
    fn classify_kernel(
        &mut self,
        direction: Direction,
        grid: (u64, u64, u64),
    ) -> Result<(), CostError> {
        let name = self.kernel_name.clone();
        let b = self.batch;
        let h = self.config.hidden_size;
        let itemsize = self.dtype.itemsize();

        let dropout_name = match direction {
            Direction::Fprop => "cudnn::detail::dropout_fp",
            Direction::Bprop => "cudnn::detail::dropout_bp",
        };
        if name == dropout_name {
            self.bytes = b * h * itemsize;
            self.kernel_params = Some(vec![
                ("B".to_string(), b.to_string()),
                ("H".to_string(), h.to_string()),
                ("type".to_string(), self.dtype.to_string()),
            ]);
            return Ok(());
        }

        if direction == Direction::Fprop
            && name == format!("{}_elementWise_fp", self.config.cell.name())
        {
            // LSTM reads 2*(i,f,g,o) and c_(t-1), writes c_t and h_t;
            // GRU reads 2*(r,z,n) and h_(t-1), writes h_t
            let elems = match self.config.cell {
                Cell::Lstm => 11 * b * h,
                Cell::Gru => 8 * b * h,
            };
            self.bytes = elems * itemsize;
            self.kernel_params = Some(vec![
                ("B".to_string(), b.to_string()),
                ("H".to_string(), h.to_string()),
                ("type".to_string(), self.dtype.to_string()),
            ]);
            return Ok(());
        }

        if name.contains("gemm") && has_tile_size(&name) {
            let (tile_x, tile_y) = cta_tile(&name)?;
            let m = tile_x * grid.0;
            let n = tile_y * grid.1;
            let timesteps = fusion_steps(direction, b);

            let classified = match direction {
                Direction::Fprop => {
                    if n == b {
                        // one timestep of the recurrent gemm
                        Some(("fprop", h))
                    } else if n == b * timesteps {
                        // layer gemm over fused timesteps; K could be H, X
                        // or 2H depending on layer and direction count
                        Some(("fprop", self.config.input_size))
                    } else {
                        None
                    }
                }
                Direction::Bprop => {
                    if name.ends_with("_nn") {
                        Some(("dgrad", h * self.config.cell.gates()))
                    } else if name.ends_with("_nt") {
                        Some(("wgrad", b * self.seq_len))
                    } else {
                        None
                    }
                }
            };

            match classified {
                Some((kind, k)) => {
                    self.flops = 2 * m * n * k;
                    self.bytes = (m * k + k * n + m * n) * itemsize;
                    self.kernel_params = Some(vec![
                        ("gemm".to_string(), kind.to_string()),
                        ("M".to_string(), m.to_string()),
                        ("N".to_string(), n.to_string()),
                        ("K".to_string(), k.to_string()),
                        ("type".to_string(), self.dtype.to_string()),
                    ]);
                }
                None => debug!(
                    "unclassified recurrent gemm `{}` (M={}, N={}, B={})",
                    name, m, n, b
                ),
            }
        }

        Ok(())
    }
}

/// Batch size of a packed sequence. Batch sizes just under a power of two
/// get rounded up: cuDNN pads them. Unverified observation; preserved
/// as-is from profiling runs.
fn packed_batch_size(rows: u64, seq_len: u64) -> u64 {
    let mut b = (rows as f64 / seq_len as f64).ceil();
    let log = b.log2();
    if log.fract() > 0.9 {
        b = 2f64.powf(log.floor() + 1.0);
    }
    b as u64
}

impl OperatorLayer for RnnBase {
    fn tc(&self) -> TcUsage {
        if self.kernel_name.contains("gemm") {
            if is_tensor_core_kernel(&self.kernel_name) {
                TcUsage::Used
            } else {
                TcUsage::NotUsed
            }
        } else {
            TcUsage::NotApplicable
        }
    }

    fn params(&self) -> Params {
        match &self.kernel_params {
            Some(pairs) => Params::Pairs(pairs.clone()),
            None => Params::Pairs(vec![
                ("cell".to_string(), self.config.cell.name().to_string()),
                ("B".to_string(), self.batch.to_string()),
                ("seqL".to_string(), self.seq_len.to_string()),
                ("L".to_string(), self.config.num_layers.to_string()),
                ("H".to_string(), self.config.hidden_size.to_string()),
                ("X".to_string(), self.config.input_size.to_string()),
                ("biDir".to_string(), self.config.bidirectional.to_string()),
                ("type".to_string(), self.dtype.to_string()),
            ]),
        }
    }

    fn flops(&self) -> u64 {
        self.flops
    }

    fn bytes(&self) -> u64 {
        self.bytes
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
    use kernelscope_shared::{Arg, OpMarker, TensorDesc};

    fn repr(module: &str, text: &str) -> ReprMarker {
        ReprMarker {
            module: module.to_string(),
            repr: text.to_string(),
        }
    }

    fn marker(module: &str, shapes: &[&[usize]]) -> OpMarker {
        OpMarker {
            module: module.to_string(),
            op: "forward".to_string(),
            call_id: None,
            input_call_ids: Vec::new(),
            args: shapes
                .iter()
                .map(|s| Arg::Tensor {
                    name: String::new(),
                    desc: TensorDesc::new(s.to_vec(), Dtype::Float32),
                })
                .collect(),
        }
    }

    fn ctx<'a>(
        marker: &'a OpMarker,
        repr: &'a ReprMarker,
        direction: Direction,
        kernel_name: &'a str,
        grid: (u64, u64, u64),
    ) -> OpContext<'a> {
        OpContext {
            marker,
            repr: Some(repr),
            direction,
            sub_seq_id: 0,
            kernel_name,
            grid,
        }
    }

    #[test]
    fn test_repr_parsing_with_defaults() {
        let r = repr("LSTM", "10, 20");
        let c = RnnConfig::parse(&r).unwrap();
        assert_eq!(c.input_size, 10);
        assert_eq!(c.hidden_size, 20);
        assert_eq!(c.num_layers, 1);
        assert!(!c.batch_first);
        assert!(!c.bidirectional);
    }

    #[test]
    fn test_repr_parsing_with_overrides() {
        let r = repr("GRU", "32, 64, num_layers=2, bias=False, batch_first=True, bidirectional=True");
        let c = RnnConfig::parse(&r).unwrap();
        assert_eq!(c.cell, Cell::Gru);
        assert_eq!(c.num_layers, 2);
        assert!(c.batch_first);
        assert!(c.bidirectional);
    }

    #[test]
    fn test_unpacked_input_seq_major() {
        // (L, B, X) layout: seq 7, batch 4, width 10
        let m = marker("LSTM", &[&[7, 4, 10]]);
        let r = repr("LSTM", "10, 20");
        let layer = RnnBase::new(&ctx(&m, &r, Direction::Fprop, "some_kernel", (1, 1, 1))).unwrap();
        assert_eq!(layer.batch, 4);
        assert_eq!(layer.seq_len, 7);
    }

    #[test]
    fn test_packed_input_batch_rounding() {
        // 244 rows over 4 steps gives 61, whose log2 fraction exceeds 0.9,
        // so the batch rounds up to 64
        let m = marker("LSTM", &[&[244, 10], &[4]]);
        let r = repr("LSTM", "10, 20");
        let layer = RnnBase::new(&ctx(&m, &r, Direction::Fprop, "some_kernel", (1, 1, 1))).unwrap();
        assert_eq!(layer.batch, 64);
        assert_eq!(layer.seq_len, 4);
    }

    #[test]
    fn test_packed_input_no_rounding() {
        // 40 rows over 4 steps: batch 10 keeps its value
        let m = marker("LSTM", &[&[40, 10], &[4]]);
        let r = repr("LSTM", "10, 20");
        let layer = RnnBase::new(&ctx(&m, &r, Direction::Fprop, "some_kernel", (1, 1, 1))).unwrap();
        assert_eq!(layer.batch, 10);
    }

    #[test]
    fn test_elementwise_kernel_bytes() {
        let m = marker("LSTM", &[&[7, 4, 10]]);
        let r = repr("LSTM", "10, 20");
        let layer = RnnBase::new(&ctx(
            &m,
            &r,
            Direction::Fprop,
            "LSTM_elementWise_fp",
            (1, 1, 1),
        ))
        .unwrap();
        assert_eq!(layer.bytes(), 11 * 4 * 20 * 4);
        assert_eq!(layer.tc(), TcUsage::NotApplicable);
    }

    #[test]
    fn test_recurrent_gemm_classification() {
        // tile 128x64, grid (1,1,1): M=128, N=64; batch 64 makes N == B,
        // so this is the recurrent gemm with K = H
        let m = marker("LSTM", &[&[7, 64, 10]]);
        let r = repr("LSTM", "10, 128");
        let layer = RnnBase::new(&ctx(
            &m,
            &r,
            Direction::Fprop,
            "volta_sgemm_128x64_nn",
            (1, 1, 1),
        ))
        .unwrap();
        assert_eq!(layer.flops(), 2 * 128 * 64 * 128);
        assert_eq!(layer.tc(), TcUsage::NotUsed);
        let p = layer.params().to_string();
        assert!(p.contains("gemm=fprop"), "params: {}", p);
    }

    #[test]
    fn test_bprop_dgrad_wgrad_split() {
        let m = marker("LSTM", &[&[7, 64, 10]]);
        let r = repr("LSTM", "10, 128");

        let dgrad = RnnBase::new(&ctx(
            &m,
            &r,
            Direction::Bprop,
            "volta_h884gemm_128x64_nn",
            (1, 1, 1),
        ))
        .unwrap();
        assert!(dgrad.params().to_string().contains("gemm=dgrad"));
        // LSTM dgrad contracts over 4H
        assert_eq!(dgrad.flops(), 2 * 128 * 64 * (4 * 128));
        assert_eq!(dgrad.tc(), TcUsage::Used);

        let wgrad = RnnBase::new(&ctx(
            &m,
            &r,
            Direction::Bprop,
            "volta_h884gemm_128x64_nt",
            (1, 1, 1),
        ))
        .unwrap();
        assert!(wgrad.params().to_string().contains("gemm=wgrad"));
        // wgrad contracts over B*seqL
        assert_eq!(wgrad.flops(), 2 * 128 * 64 * (64 * 7));
    }

    #[test]
    fn test_default_params_when_kernel_unclassified() {
        let m = marker("GRU", &[&[7, 4, 10]]);
        let r = repr("GRU", "10, 20");
        let layer =
            RnnBase::new(&ctx(&m, &r, Direction::Fprop, "misc_kernel", (1, 1, 1))).unwrap();
        let p = layer.params().to_string();
        assert!(p.contains("cell=GRU"), "params: {}", p);
        assert_eq!(layer.flops(), 0);
        assert_eq!(layer.bytes(), 0);
    }

    #[test]
    fn test_missing_repr_is_invariant_error() {
        let m = marker("LSTM", &[&[7, 4, 10]]);
        let ctx = OpContext {
            marker: &m,
            repr: None,
            direction: Direction::Fprop,
            sub_seq_id: 0,
            kernel_name: "k",
            grid: (1, 1, 1),
        };
        assert!(matches!(
            RnnBase::new(&ctx),
            Err(CostError::Invariant(_))
        ));
    }

    #[test]
    fn test_input_width_mismatch_rejected() {
        let m = marker("LSTM", &[&[7, 4, 12]]);
        let r = repr("LSTM", "10, 20");
        assert!(RnnBase::new(&ctx(&m, &r, Direction::Fprop, "k", (1, 1, 1))).is_err());
    }
}

//! Copy-like operations and the pass-through fallback

use crate::args;
use crate::{fmt_shape, CostError, OpContext, OperatorLayer, Params, TcUsage};
use kernelscope_shared::{Arg, Dtype, TensorDesc};

/// Pass-through calculator for operations no specific calculator claims.
///
/// Records the tensor shapes and dtypes only, with zero cost. The registry
/// tags its output as unsupported so reports can separate coverage gaps
/// from correctly-computed zero cost.
pub struct Fallback {
    module: String,
    op: String,
    shapes: Vec<Vec<usize>>,
    dtypes: Vec<Dtype>,
}

impl Fallback {
    /// Never fails; every marker has at least a module and operator name.
    pub fn new(ctx: &OpContext) -> Self {
        let marker = ctx.marker;
        let mut shapes = Vec::new();
        let mut dtypes = Vec::new();
        for arg in &marker.args {
            if let Some(t) = arg.tensor() {
                shapes.push(t.shape().to_vec());
                dtypes.push(t.dtype());
            }
        }
        Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            shapes,
            dtypes,
        }
    }
}

impl OperatorLayer for Fallback {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        let shapes: Vec<String> = self.shapes.iter().map(|s| fmt_shape(s)).collect();
        let dtypes: Vec<String> = self.dtypes.iter().map(|d| d.to_string()).collect();
        Params::Pairs(vec![
            ("T".to_string(), format!("[{}]", shapes.join(","))),
            ("type".to_string(), dtypes.join(",")),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        0
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Copy {
    module: String,
    op: String,
    src: TensorDesc,
    dst: TensorDesc,
}

impl Copy {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "Tensor" || marker.op != "copy_" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 2 {
            return Err(CostError::invariant(format!(
                "copy_ expects dst and src, got {} arguments",
                marker.args.len()
            )));
        }
        let dst = args::tensor(&marker.args[0])?;
        let src = args::tensor(&marker.args[1])?;
        if src.shape() != dst.shape() {
            return Err(CostError::invariant("copy_ shapes must match"));
        }

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            src,
            dst,
        })
    }
}

impl OperatorLayer for Copy {
    fn tc(&self) -> TcUsage {
        TcUsage::NotApplicable
    }

    fn params(&self) -> Params {
        // the element types can differ between source and destination
        Params::Pairs(vec![
            ("T".to_string(), fmt_shape(self.src.shape())),
            ("stype".to_string(), self.src.dtype().to_string()),
            ("dtype".to_string(), self.dst.dtype().to_string()),
        ])
    }

    fn flops(&self) -> u64 {
        0
    }

    fn bytes(&self) -> u64 {
        self.src.size() * (self.src.itemsize() + self.dst.itemsize())
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct CloneOp {
    module: String,
    op: String,
    input: TensorDesc,
}

impl CloneOp {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if !matches!(marker.module.as_str(), "Tensor" | "torch") || marker.op != "clone" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 1 {
            return Err(CostError::invariant(format!(
                "clone expects one argument, got {}",
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

impl OperatorLayer for CloneOp {
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
        0
    }

    fn bytes(&self) -> u64 {
        2 * self.input.bytes()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Contiguous {
    module: String,
    op: String,
    input: TensorDesc,
}

impl Contiguous {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "Tensor" || marker.op != "contiguous" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.len() != 1 {
            return Err(CostError::invariant(format!(
                "contiguous expects one argument, got {}",
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

impl OperatorLayer for Contiguous {
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
        0
    }

    fn bytes(&self) -> u64 {
        2 * self.input.bytes()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn operator(&self) -> &str {
        &self.op
    }
}

pub struct Any {
    module: String,
    op: String,
    input: TensorDesc,
}

impl Any {
    pub fn new(ctx: &OpContext) -> Result<Self, CostError> {
        let marker = ctx.marker;
        if marker.module != "Tensor" || marker.op != "any" {
            return Err(CostError::unsupported(&marker.module, &marker.op));
        }
        if marker.args.is_empty() || marker.args.len() > 2 {
            return Err(CostError::invariant(format!(
                "any expects 1-2 arguments, got {}",
                marker.args.len()
            )));
        }

        // the input can be a tensor or a bool scalar
        let input = match &marker.args[0] {
            Arg::Tensor { desc, .. } | Arg::Ndarray { desc, .. } => desc.clone(),
            Arg::Scalar { kind, .. } if kind == "bool" => TensorDesc::new(vec![1], Dtype::Bool),
            other => {
                return Err(CostError::invariant(format!(
                    "any expects a tensor or bool, got {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            module: marker.module.clone(),
            op: marker.op.clone(),
            input,
        })
    }
}

impl OperatorLayer for Any {
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

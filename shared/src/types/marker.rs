//! Decoded profiler markers
//!
//! A marker arrives as raw text. Its kind is recovered from key presence,
//! not from a discriminant tag: the producer emits plain stringified
//! dictionaries for operation, trace and module-repr markers, and free text
//! for layer and autograd sequence markers. The classifier lives in one
//! place so the key-presence heuristic stays auditable.

use crate::literal::{self, PyValue};
use crate::types::dtype::Dtype;
use crate::types::tensor::TensorDesc;
use serde::{Deserialize, Serialize};

/// One kernel-enclosing marker, classified and (where structured) decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    /// Operation marker inserted by the instrumentation layer
    Op(OpMarker),
    /// Module configuration captured via its string representation
    Repr(ReprMarker),
    /// Call trace plus function stack
    Trace(TraceMarker),
    /// User-added layer annotation; the payload is the layer name
    Layer(String),
    /// Autograd sequence marker; kept as raw text for the heuristics
    Seq(String),
    /// Anything else, kept verbatim
    Other(String),
}

/// `{mod, op, args, callid?, input_callids?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpMarker {
    pub module: String,
    pub op: String,
    pub call_id: Option<String>,
    pub input_call_ids: Vec<String>,
    pub args: Vec<Arg>,
}

/// `{mod, strRepr}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReprMarker {
    pub module: String,
    pub repr: String,
}

/// `{traceMarker, funcStack}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMarker {
    /// Call trace as `file:line` entries
    pub frames: Vec<String>,
    /// `/`-delimited path of enclosing function names
    pub func_stack: String,
}

/// One argument descriptor of an operation marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Tensor {
        name: String,
        desc: TensorDesc,
    },
    Ndarray {
        name: String,
        desc: TensorDesc,
    },
    Scalar {
        name: String,
        /// The producer-side type name, e.g. `int`, `float`, `str`
        kind: String,
        value: ScalarValue,
    },
    /// A list or tuple of scalars, recorded as a single argument
    Sequence {
        name: String,
        values: Vec<ScalarValue>,
    },
}

impl Arg {
    pub fn name(&self) -> &str {
        match self {
            Arg::Tensor { name, .. }
            | Arg::Ndarray { name, .. }
            | Arg::Scalar { name, .. }
            | Arg::Sequence { name, .. } => name,
        }
    }

    /// Positional arguments carry an empty name
    pub fn is_positional(&self) -> bool {
        self.name().is_empty()
    }

    pub fn tensor(&self) -> Option<&TensorDesc> {
        match self {
            Arg::Tensor { desc, .. } | Arg::Ndarray { desc, .. } => Some(desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
}

impl ScalarValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Marker {
    /// Classify one raw marker text and decode the structured kinds.
    ///
    /// Classification is by substring screen first (cheap, and what the
    /// profiler backends key on), then by actual key presence once the text
    /// parses. Text that looks structured but fails the literal grammar
    /// falls back to `Other` rather than erroring: a malformed marker must
    /// never abort a trace pass.
    pub fn classify(text: &str) -> Marker {
        if text.contains("mod") && text.contains("op") && text.contains("args") && text.contains("type")
        {
            if let Some(m) = OpMarker::decode(text) {
                return Marker::Op(m);
            }
        }
        if let Some(name) = text.strip_prefix("layer:") {
            return Marker::Layer(name.to_string());
        }
        if text.contains("traceMarker") {
            if let Some(m) = TraceMarker::decode(text) {
                return Marker::Trace(m);
            }
        }
        if text.contains("strRepr") {
            if let Some(m) = ReprMarker::decode(text) {
                return Marker::Repr(m);
            }
        }
        if text.contains(", seq = ") {
            return Marker::Seq(text.to_string());
        }
        Marker::Other(text.to_string())
    }
}

impl OpMarker {
    pub fn decode(text: &str) -> Option<OpMarker> {
        let v = literal::parse(text)?;
        let module = v.get("mod")?.as_str()?.to_string();
        let op = v.get("op")?.as_str()?.to_string();
        let args = v
            .get("args")?
            .items()?
            .iter()
            .map(decode_arg)
            .collect::<Option<Vec<_>>>()?;

        let call_id = v.get("callid").map(id_string);
        let input_call_ids = match v.get("input_callids") {
            Some(ids) => ids.items()?.iter().map(id_string).collect(),
            None => Vec::new(),
        };

        Some(OpMarker {
            module,
            op,
            call_id,
            input_call_ids,
            args,
        })
    }
}

impl ReprMarker {
    pub fn decode(text: &str) -> Option<ReprMarker> {
        let v = literal::parse(text)?;
        Some(ReprMarker {
            module: v.get("mod")?.as_str()?.to_string(),
            repr: v.get("strRepr")?.as_str()?.to_string(),
        })
    }
}

impl TraceMarker {
    pub fn decode(text: &str) -> Option<TraceMarker> {
        let v = literal::parse(text)?;
        let frames = v
            .get("traceMarker")?
            .items()?
            .iter()
            .map(|f| f.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        let func_stack = v.get("funcStack")?.as_str()?.to_string();
        Some(TraceMarker { frames, func_stack })
    }
}

/// Call ids are opaque; numbers and strings both appear on the wire.
fn id_string(v: &PyValue) -> String {
    match v {
        PyValue::Str(s) => s.clone(),
        PyValue::Int(i) => i.to_string(),
        other => format!("{:?}", other),
    }
}

fn decode_arg(v: &PyValue) -> Option<Arg> {
    let name = v.get("name")?.as_str()?.to_string();
    let kind = v.get("type")?.as_str()?;

    match kind {
        "tensor" | "ndarray" => {
            let shape = decode_shape(v.get("shape")?)?;
            let dtype: Dtype = v.get("dtype")?.as_str()?.parse().ok()?;
            let desc = TensorDesc::new(shape, dtype);
            Some(if kind == "tensor" {
                Arg::Tensor { name, desc }
            } else {
                Arg::Ndarray { name, desc }
            })
        }
        "list" | "tuple" => {
            let values = v
                .get("value")?
                .items()?
                .iter()
                .map(decode_scalar_value)
                .collect::<Option<Vec<_>>>()?;
            Some(Arg::Sequence { name, values })
        }
        _ => {
            let value = decode_scalar(kind, v.get("value")?)?;
            Some(Arg::Scalar {
                name,
                kind: kind.to_string(),
                value,
            })
        }
    }
}

fn decode_shape(v: &PyValue) -> Option<Vec<usize>> {
    v.items()?
        .iter()
        .map(|d| usize::try_from(d.as_int()?).ok())
        .collect()
}

/// Non-finite floats travel as the literal strings `inf`, `-inf`, `nan`
/// because the wire format is text; map them back to the f64 specials.
fn decode_scalar(kind: &str, v: &PyValue) -> Option<ScalarValue> {
    if kind == "float" {
        if let PyValue::Str(s) = v {
            return match s.as_str() {
                "inf" => Some(ScalarValue::Float(f64::INFINITY)),
                "-inf" => Some(ScalarValue::Float(f64::NEG_INFINITY)),
                "nan" => Some(ScalarValue::Float(f64::NAN)),
                _ => None,
            };
        }
    }
    decode_scalar_value(v)
}

fn decode_scalar_value(v: &PyValue) -> Option<ScalarValue> {
    match v {
        PyValue::Int(i) => Some(ScalarValue::Int(*i)),
        PyValue::Float(f) => Some(ScalarValue::Float(*f)),
        PyValue::Bool(b) => Some(ScalarValue::Bool(*b)),
        PyValue::Str(s) => Some(ScalarValue::Str(s.clone())),
        PyValue::None => Some(ScalarValue::None),
        _ => None,
    }
}

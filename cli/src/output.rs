//! CSV report output

use anyhow::Result;
use kernelscope_cost::Record;
use std::io::Write;

const HEADER: &str = "kernel,duration_ns,direction,module,op,params,tc,flops,bytes,device,stream,grid,block,supported";

/// Write one CSV row per kernel record
pub fn write_csv<W: Write>(writer: &mut W, records: &[Record]) -> Result<()> {
    writeln!(writer, "{}", HEADER)?;
    for r in records {
        let fields = [
            r.short_name.clone(),
            r.duration.to_string(),
            r.direction.clone(),
            r.module.clone(),
            r.operator.clone(),
            r.params.clone(),
            r.tc.clone(),
            r.flops.to_string(),
            r.bytes.to_string(),
            r.device.to_string(),
            r.stream.to_string(),
            r.grid.clone(),
            r.block.clone(),
            r.supported.to_string(),
        ];
        let row: Vec<String> = fields.iter().map(|f| escape(f)).collect();
        writeln!(writer, "{}", row.join(","))?;
    }
    Ok(())
}

/// Quote fields containing separators or quotes
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

//! Miss trace format
//!
//! One operation per line, `#` starts a comment:
//! ```text
//! miss  <core_id> <address> <length> [io_class]
//! purge <core_id> <address> <length>
//! ```
//! Numbers may be decimal or `0x`-prefixed hex.

use anyhow::{Context, Result, anyhow, bail};
use blockcache_engine::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Miss(Request),
    Purge(Request),
}

fn parse_num<T>(field: Option<&str>, name: &str) -> Result<T>
where
    T: TryFrom<u64>,
{
    let field = field.ok_or_else(|| anyhow!("missing {}", name))?;
    let value = match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => field.parse::<u64>(),
    }
    .with_context(|| format!("invalid {} '{}'", name, field))?;

    T::try_from(value).map_err(|_| anyhow!("{} {} out of range", name, value))
}

/// Parse one line; blank lines and comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<TraceOp>> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let op = fields.next().unwrap_or("");

    let core_id = parse_num(fields.next(), "core_id")?;
    let address = parse_num(fields.next(), "address")?;
    let length = parse_num(fields.next(), "length")?;

    let parsed = match op.to_lowercase().as_str() {
        "miss" => {
            let io_class = match fields.next() {
                Some(class) => parse_num(Some(class), "io_class")?,
                None => 0,
            };
            TraceOp::Miss(Request::new(core_id, address, length, io_class))
        }
        "purge" => TraceOp::Purge(Request::new(core_id, address, length, 0)),
        other => bail!("unknown operation '{}'", other),
    };

    if let Some(extra) = fields.next() {
        bail!("unexpected trailing field '{}'", extra);
    }

    Ok(Some(parsed))
}

/// Parse a whole trace, reporting the first bad line by number
pub fn parse_trace(text: &str) -> Result<Vec<TraceOp>> {
    let mut ops = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(op) = parse_line(line).with_context(|| format!("trace line {}", index + 1))? {
            ops.push(op);
        }
    }
    Ok(ops)
}

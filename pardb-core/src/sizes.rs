//! Human-readable data size parsing, ported from `sd/numerology.py`'s
//! `ConvertDataSize`. Accepts a bare integer (bytes) or an integer/float
//! followed by a `K`/`M`/`G`/`T` suffix (decimal, 1000-based, matching the
//! original).

use anyhow::{bail, Result};

pub fn parse_size(input: &str) -> Result<u64> {
    let s = input.trim();
    if s.is_empty() {
        bail!("empty size string");
    }
    let upper = s.to_uppercase();
    let (num_part, multiplier) = if let Some(stripped) = upper.strip_suffix('T') {
        (stripped, 1_000_000_000_000.0)
    } else if let Some(stripped) = upper.strip_suffix('G') {
        (stripped, 1_000_000_000.0)
    } else if let Some(stripped) = upper.strip_suffix('M') {
        (stripped, 1_000_000.0)
    } else if let Some(stripped) = upper.strip_suffix('K') {
        (stripped, 1_000.0)
    } else if let Some(stripped) = upper.strip_suffix('B') {
        (stripped, 1.0)
    } else {
        (upper.as_str(), 1.0)
    };
    let value: f64 = num_part.trim().parse().map_err(|_| anyhow::anyhow!("invalid size: {input}"))?;
    if value < 0.0 {
        bail!("size cannot be negative: {input}");
    }
    Ok((value * multiplier).round() as u64)
}

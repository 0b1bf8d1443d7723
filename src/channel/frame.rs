use crate::model::{ClientEvent, ServerEvent};
use anyhow::{Context, Result};

/// One event per line.
pub fn encode(ev: &ClientEvent) -> Result<String> {
    let mut line = serde_json::to_string(ev).context("encode client event")?;
    line.push('\n');
    Ok(line)
}

/// Blank lines are keep-alives and decode to `None`.
pub fn decode(line: &str) -> Result<Option<ServerEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let ev = serde_json::from_str(line).with_context(|| {
        format!("decode server event: {}", truncate(line, 120))
    })?;
    Ok(Some(ev))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

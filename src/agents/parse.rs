//! Strict JSON parsing of model output.
//!
//! A reply is first parsed exactly as received. If that fails, one repair
//! pass runs: code fences are unwrapped, leading chatter such as
//! "Sure, here is the JSON:" is dropped, and the text is cut to the
//! outermost `{...}` object. Anything still invalid is an [`Error::Parse`].

use crate::core::NodeId;
use crate::error::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

/// A fenced block, optionally tagged `json`.
static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").unwrap());

/// Conversational lead-ins models put before the payload.
static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:sure|certainly|okay|ok|of course|here(?:'s| is| are)[^:\n]*)[^\n:]*:?\s*").unwrap()
});

/// Parse `text` into `T`, applying at most one repair pass.
///
/// # Errors
///
/// Returns `Error::Parse` naming `node` when neither the raw nor the repaired
/// text deserializes.
pub fn parse_json<T: DeserializeOwned>(node: NodeId, text: &str) -> Result<T> {
    let strict = serde_json::from_str::<T>(text.trim());
    let strict_err = match strict {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let repaired = repair(text).ok_or_else(|| Error::Parse {
        node,
        message: format!("no JSON object in output ({})", strict_err),
    })?;

    serde_json::from_str::<T>(&repaired).map_err(|e| Error::Parse {
        node,
        message: e.to_string(),
    })
}

/// The single repair pass. Returns `None` when no object can be located.
pub fn repair(text: &str) -> Option<String> {
    let unfenced = CODE_FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(text, |m| m.as_str());
    let unprefixed = if unfenced.trim_start().starts_with('{') {
        unfenced
    } else {
        PREFIX_RE.find(unfenced).map_or(unfenced, |m| &unfenced[m.end()..])
    };

    let start = unprefixed.find('{')?;
    let end = unprefixed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(unprefixed[start..=end].to_string())
}

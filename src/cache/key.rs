//! Deterministic cache keys.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::request::HttpMethod;

/// Derive the cache key for a call.
///
/// The payload is serialized to JSON with object keys sorted at every level,
/// so field order never changes the key.
pub fn cache_key<P: Serialize + ?Sized>(
    endpoint: &str,
    method: HttpMethod,
    payload: &P,
) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(payload)?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;

    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{}_{}_{:x}", endpoint, method, digest))
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(val, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

//! Merging of partial upstream payloads into the final response body.

use hyper::body::Bytes;
use serde_json::Value as JsonValue;

use crate::protocol::{ResourceKind, extract_items};

/// Concatenates the extracted item lists of every present payload in slot
/// order. Absent slots (failed calls) contribute nothing. No de-duplication
/// and no re-sorting: upstream order within a slot and slot order across
/// sources are both preserved, so the result is deterministic for a fixed
/// source order.
pub fn aggregate(resource: ResourceKind, payloads: &[Option<JsonValue>]) -> Vec<JsonValue> {
    let mut items = Vec::new();
    for payload in payloads.iter().flatten() {
        items.extend(extract_items(resource, payload));
    }
    items
}

/// Serializes the final `{<key>: [...]}` body. Always a well-formed list,
/// empty included.
pub fn into_body(resource: ResourceKind, items: Vec<JsonValue>) -> Bytes {
    let mut object = serde_json::Map::new();
    object.insert(resource.result_key().to_string(), JsonValue::Array(items));
    Bytes::from(JsonValue::Object(object).to_string())
}

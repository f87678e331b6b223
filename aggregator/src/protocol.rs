//! Wire protocol bridging for the two add-on request generations.
//!
//! The aggregated protocol exists in two generations that carry the same
//! information in different encodings:
//!
//! - **Path-encoded GET** (the older generation): the request is a URL path
//!   of the shape `<resource>/<type>/<id>.json`, with optional extras as a
//!   query string. Only `catalog`, `stream`, and `subtitles` exist in this
//!   encoding.
//! - **JSON-body POST** (the newer generation): the request is a body of the
//!   shape `{type, id, extra?: [{name, value}]}` posted to
//!   `<base>/<resource>`. Manifests of sources speaking this generation
//!   carry a `manifestVersion` field.
//!
//! Both inbound encodings normalize to the same [`ResourceRequest`], and a
//! [`ResourceRequest`] re-emits toward each upstream in whichever encoding
//! that source speaks, so a client of either generation can be served by
//! upstreams of either generation.

use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::form_urlencoded;

use crate::dispatch::OutboundCall;
use crate::source::Source;

/// The four resource kinds the aggregated add-on serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Catalog,
    Meta,
    Stream,
    Subtitles,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Catalog,
        ResourceKind::Meta,
        ResourceKind::Stream,
        ResourceKind::Subtitles,
    ];

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "catalog" => Some(ResourceKind::Catalog),
            "meta" => Some(ResourceKind::Meta),
            "stream" => Some(ResourceKind::Stream),
            "subtitles" => Some(ResourceKind::Subtitles),
            _ => None,
        }
    }

    /// Path segment of this resource in both wire generations.
    pub fn segment(self) -> &'static str {
        match self {
            ResourceKind::Catalog => "catalog",
            ResourceKind::Meta => "meta",
            ResourceKind::Stream => "stream",
            ResourceKind::Subtitles => "subtitles",
        }
    }

    /// Key under which merged items are returned to the client. Catalog and
    /// meta responses share the `metas` key.
    pub fn result_key(self) -> &'static str {
        match self {
            ResourceKind::Catalog | ResourceKind::Meta => "metas",
            ResourceKind::Stream => "streams",
            ResourceKind::Subtitles => "subtitles",
        }
    }
}

/// One extra request parameter (genre, skip, search and friends). Order is
/// significant and preserved through both encodings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtraProp {
    pub name: String,
    pub value: String,
}

/// The internal request descriptor both inbound generations normalize to.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceRequest {
    pub resource: ResourceKind,
    pub content_type: String,
    pub id: String,
    pub extra: Vec<ExtraProp>,
}

#[derive(Deserialize)]
struct JsonBodyRequest {
    #[serde(rename = "type")]
    content_type: String,
    id: String,
    #[serde(default)]
    extra: Vec<ExtraProp>,
}

#[derive(Serialize)]
struct JsonBodyOut<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extra: Option<&'a [ExtraProp]>,
}

impl ResourceRequest {
    /// Parses a JSON-body request. The `extra` array is optional; a meta
    /// request carries none.
    pub fn from_json_body(resource: ResourceKind, body: &Bytes) -> Result<Self, serde_json::Error> {
        let parsed: JsonBodyRequest = serde_json::from_slice(body)?;
        Ok(Self {
            resource,
            content_type: parsed.content_type,
            id: parsed.id,
            extra: parsed.extra,
        })
    }

    /// Parses a path-encoded request from `<resource>/<type>/<id>.json` path
    /// segments plus an optional query string. Returns `None` for anything
    /// that is not a well-formed path-generation request; `meta` has no
    /// path encoding.
    pub fn from_path(segments: &[&str], query: Option<&str>) -> Option<Self> {
        let [resource, content_type, id] = segments else {
            return None;
        };
        let resource = ResourceKind::from_segment(resource)?;
        if resource == ResourceKind::Meta {
            return None;
        }

        let id = id.strip_suffix(".json").unwrap_or(id);
        if content_type.is_empty() || id.is_empty() {
            return None;
        }

        let extra = query
            .map(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .map(|(name, value)| ExtraProp {
                        name: name.into_owned(),
                        value: value.into_owned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            resource,
            content_type: content_type.to_string(),
            id: id.to_string(),
            extra,
        })
    }

    /// Builds the outbound call for one source, in whichever generation that
    /// source speaks. The choice is static per source; there is no
    /// on-failure fallback to the other generation.
    pub fn outbound_call(&self, source: &Source) -> OutboundCall {
        if source.speaks_json_protocol() {
            OutboundCall::post_json(source.endpoint(self.resource.segment()), self.to_json_body())
        } else {
            OutboundCall::get(source.endpoint(&self.to_path()))
        }
    }

    /// JSON-body encoding of this request; `extra` is omitted when empty.
    pub fn to_json_body(&self) -> Bytes {
        let body = JsonBodyOut {
            content_type: &self.content_type,
            id: &self.id,
            extra: (!self.extra.is_empty()).then_some(self.extra.as_slice()),
        };
        // Serializing strings cannot fail; fall through to a Value to keep
        // this infallible.
        Bytes::from(serde_json::to_value(&body).unwrap_or_default().to_string())
    }

    /// Path encoding `<resource>/<type>/<id>.json[?extras]`, extras
    /// URL-encoded as `name=value` pairs joined with `&`.
    pub fn to_path(&self) -> String {
        let mut path = format!(
            "{}/{}/{}.json",
            self.resource.segment(),
            self.content_type,
            self.id
        );
        if !self.extra.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for prop in &self.extra {
                serializer.append_pair(&prop.name, &prop.value);
            }
            path.push('?');
            path.push_str(&serializer.finish());
        }
        path
    }
}

/// Pulls the resource's item array out of a raw upstream payload.
///
/// Catalog payloads carry `metas`, stream payloads `streams`, subtitles
/// payloads `subtitles`. Meta payloads may carry a single-object `meta`
/// and/or an array `metas`; both are normalized into one list. A missing or
/// non-array field, or a non-object payload, extracts to nothing.
pub fn extract_items(resource: ResourceKind, payload: &JsonValue) -> Vec<JsonValue> {
    let Some(object) = payload.as_object() else {
        return Vec::new();
    };

    let mut items = Vec::new();
    if resource == ResourceKind::Meta
        && let Some(meta) = object.get("meta").filter(|v| v.is_object())
    {
        items.push(meta.clone());
    }
    if let Some(JsonValue::Array(values)) = object.get(resource.result_key()) {
        items.extend(values.iter().cloned());
    }
    items
}

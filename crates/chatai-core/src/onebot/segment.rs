//! Message segments — OneBot v11 "array" message format.
//!
//! On the wire every segment is `{"type": "...", "data": {...}}` with a loosely
//! typed `data` map. Here the known kinds become enum variants with typed
//! payloads; anything else is kept verbatim in [`Segment::Other`] so it survives
//! a round trip through the dispatcher (e.g. inside a forwarded node).
//!
//! Also provides the CQ-code string rendering (`[CQ:at,qq=123]`) used when an
//! event carries no `raw_message` and for log output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// A single typed message segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSegment", into = "RawSegment")]
pub enum Segment {
    /// Plain text.
    Text { text: String },
    /// Image reference. `url` is filled in by the platform for received images.
    Image { file: String, url: Option<String> },
    /// Reply-chain reference to an earlier message.
    Reply { id: i64 },
    /// Mention. `qq` may be a user id or `"all"`.
    At { qq: String },
    /// Built-in emoji.
    Face { id: String },
    /// Poke (private chats / groups, platform dependent).
    Poke { qq: i64 },
    /// Music share card.
    Music { platform: String, id: i64 },
    /// Any segment kind we do not model.
    Other { kind: String, data: Map<String, Value> },
}

/// Wire shape of a segment.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawSegment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Map<String, Value>,
}

impl Segment {
    /// Text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    /// Mention segment for a user id.
    pub fn at(qq: i64) -> Self {
        Segment::At { qq: qq.to_string() }
    }

    /// Reply-chain reference.
    pub fn reply(id: i64) -> Self {
        Segment::Reply { id }
    }

    /// Image by file name, path or URL.
    pub fn image(file: impl Into<String>) -> Self {
        Segment::Image {
            file: file.into(),
            url: None,
        }
    }

    /// Poke a user.
    pub fn poke(qq: i64) -> Self {
        Segment::Poke { qq }
    }

    /// Music share, `platform` is `"qq"`, `"163"` or `"xm"`.
    pub fn music(platform: impl Into<String>, id: i64) -> Self {
        Segment::Music {
            platform: platform.into(),
            id,
        }
    }

    /// The wire `type` string of this segment.
    pub fn kind(&self) -> &str {
        match self {
            Segment::Text { .. } => "text",
            Segment::Image { .. } => "image",
            Segment::Reply { .. } => "reply",
            Segment::At { .. } => "at",
            Segment::Face { .. } => "face",
            Segment::Poke { .. } => "poke",
            Segment::Music { .. } => "music",
            Segment::Other { kind, .. } => kind,
        }
    }

    /// Text content, if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Download URL for image segments (falls back to `file` when it is a URL).
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Segment::Image { url: Some(url), .. } => Some(url),
            Segment::Image { file, url: None } if file.starts_with("http") => Some(file),
            _ => None,
        }
    }

    /// Render as CQ-code text (`[CQ:image,file=a.jpg]`, plain text is escaped).
    pub fn to_cq_code(&self) -> String {
        if let Segment::Text { text } = self {
            return escape_text(text);
        }
        let raw = RawSegment::from(self.clone());
        let mut out = format!("[CQ:{}", raw.kind);
        for (key, value) in &raw.data {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            out.push(',');
            out.push_str(key);
            out.push('=');
            out.push_str(&escape_value(&value));
        }
        out.push(']');
        out
    }
}

/// Render a whole message as a CQ-code string.
pub fn render_cq(segments: &[Segment]) -> String {
    segments.iter().map(Segment::to_cq_code).collect()
}

/// Escape plain text for CQ-code strings.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

/// Escape a CQ-code parameter value. Commas are significant inside codes.
pub fn escape_value(value: &str) -> String {
    escape_text(value).replace(',', "&#44;")
}

/// Read an id that some implementations send as a number and others as a string.
fn int_field(data: &Map<String, Value>, key: &str) -> Option<i64> {
    match data.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<RawSegment> for Segment {
    fn from(raw: RawSegment) -> Self {
        let data = &raw.data;
        let typed = match raw.kind.as_str() {
            "text" => str_field(data, "text").map(|text| Segment::Text { text }),
            "image" => Some(Segment::Image {
                file: str_field(data, "file").unwrap_or_default(),
                url: str_field(data, "url").filter(|u| !u.is_empty()),
            }),
            "reply" => int_field(data, "id").map(|id| Segment::Reply { id }),
            "at" => str_field(data, "qq").map(|qq| Segment::At { qq }),
            "face" => str_field(data, "id").map(|id| Segment::Face { id }),
            "poke" => int_field(data, "qq").map(|qq| Segment::Poke { qq }),
            "music" => match (str_field(data, "type"), int_field(data, "id")) {
                (Some(platform), Some(id)) => Some(Segment::Music { platform, id }),
                _ => None,
            },
            _ => None,
        };

        typed.unwrap_or_else(|| {
            debug!(kind = %raw.kind, "keeping segment untyped");
            Segment::Other {
                kind: raw.kind,
                data: raw.data,
            }
        })
    }
}

impl From<Segment> for RawSegment {
    fn from(segment: Segment) -> Self {
        let mut data = Map::new();
        let kind = segment.kind().to_string();
        match segment {
            Segment::Text { text } => {
                data.insert("text".into(), Value::String(text));
            }
            Segment::Image { file, url } => {
                data.insert("file".into(), Value::String(file));
                if let Some(url) = url {
                    data.insert("url".into(), Value::String(url));
                }
            }
            Segment::Reply { id } => {
                data.insert("id".into(), Value::from(id));
            }
            Segment::At { qq } => {
                data.insert("qq".into(), Value::String(qq));
            }
            Segment::Face { id } => {
                data.insert("id".into(), Value::String(id));
            }
            Segment::Poke { qq } => {
                data.insert("qq".into(), Value::from(qq));
            }
            Segment::Music { platform, id } => {
                data.insert("type".into(), Value::String(platform));
                data.insert("id".into(), Value::from(id));
            }
            Segment::Other { data: other, .. } => data = other,
        }
        RawSegment { kind, data }
    }
}

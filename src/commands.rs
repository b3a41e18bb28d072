//! Map command extraction from assistant replies
//!
//! The model embeds commands in its prose as bracketed tags:
//!
//! ```text
//! [LOCATION_SEARCH: {"query": "Marvel Stadium"}]
//! [CAMERA_ACTION: {"type": "SWITCH_MODE", "value": "ROAD"}]
//! ```
//!
//! The scanner walks the reply once, looking for the two tag keywords. After
//! a keyword it expects one balanced JSON object on a single line (braces
//! inside string literals do not count) followed by `]`. The first tag of
//! each kind is parsed; later duplicates are left in the prose.
//!
//! Only JSON syntax is checked. Any object is forwarded as written, so new
//! fields and action types reach the map controller untouched. A tag whose
//! payload is not a JSON object stays in the display text and is reported
//! as a [`CommandParseError`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Tag keyword kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    LocationSearch,
    CameraAction,
}

impl TagKind {
    const ALL: [TagKind; 2] = [TagKind::LocationSearch, TagKind::CameraAction];

    pub fn keyword(self) -> &'static str {
        match self {
            TagKind::LocationSearch => "[LOCATION_SEARCH:",
            TagKind::CameraAction => "[CAMERA_ACTION:",
        }
    }

    fn name(self) -> &'static str {
        match self {
            TagKind::LocationSearch => "LOCATION_SEARCH",
            TagKind::CameraAction => "CAMERA_ACTION",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Search the map for a place or category.
///
/// The payload object is forwarded as written. Only `query` is read here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LocationSearch(Map<String, Value>);

impl LocationSearch {
    #[cfg(test)]
    pub fn new(query: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("query".to_string(), Value::String(query.into()));
        Self(fields)
    }

    /// The search text, when the payload carries one as a string
    pub fn query(&self) -> Option<&str> {
        self.0.get("query").and_then(Value::as_str)
    }

}

/// Change the map camera or style.
///
/// The payload object is forwarded as written; the map controller owns the
/// action vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CameraAction(Map<String, Value>);

impl CameraAction {
    #[cfg(test)]
    pub fn new(kind: CameraActionKind, value: Option<&str>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        if let Some(value) = value {
            fields.insert("value".to_string(), Value::String(value.to_string()));
        }
        Self(fields)
    }

    /// `None` when `type` is missing or not a string
    pub fn action_type(&self) -> Option<CameraActionType> {
        let name = self.0.get("type")?.as_str()?;
        Some(match CameraActionKind::from_name(name) {
            Some(kind) => CameraActionType::Known(kind),
            None => CameraActionType::Other(name.to_string()),
        })
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.get("value")
    }

}

/// Camera action vocabulary as seen by this service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraActionType {
    Known(CameraActionKind),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraActionKind {
    ZoomIn,
    ZoomOut,
    RotateLeft,
    RotateRight,
    TiltUp,
    TiltDown,
    Reset,
    SwitchMode,
}

impl CameraActionKind {
    const ALL: [CameraActionKind; 8] = [
        CameraActionKind::ZoomIn,
        CameraActionKind::ZoomOut,
        CameraActionKind::RotateLeft,
        CameraActionKind::RotateRight,
        CameraActionKind::TiltUp,
        CameraActionKind::TiltDown,
        CameraActionKind::Reset,
        CameraActionKind::SwitchMode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CameraActionKind::ZoomIn => "ZOOM_IN",
            CameraActionKind::ZoomOut => "ZOOM_OUT",
            CameraActionKind::RotateLeft => "ROTATE_LEFT",
            CameraActionKind::RotateRight => "ROTATE_RIGHT",
            CameraActionKind::TiltUp => "TILT_UP",
            CameraActionKind::TiltDown => "TILT_DOWN",
            CameraActionKind::Reset => "RESET",
            CameraActionKind::SwitchMode => "SWITCH_MODE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// A command extracted from a reply
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LocationSearch(LocationSearch),
    CameraAction(CameraAction),
}

/// A tag was found but its payload is not a well-formed JSON object
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {tag} payload: {reason}")]
pub struct CommandParseError {
    pub tag: TagKind,
    /// Tag text as it appeared in the reply
    pub raw: String,
    pub reason: String,
}

/// Result of scanning one reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub display_text: String,
    pub location: Option<LocationSearch>,
    pub camera: Option<CameraAction>,
    pub errors: Vec<CommandParseError>,
}

pub fn extract(raw: &str) -> Extraction {
    let mut extraction = Extraction::default();
    let mut pending: Vec<TagKind> = TagKind::ALL.to_vec();
    let mut cuts: Vec<Range<usize>> = Vec::new();
    let mut cursor = 0;

    while let Some((start, kind)) = next_tag(raw, cursor, &pending) {
        pending.retain(|k| *k != kind);

        let tag = match scan_tag(raw, start, kind) {
            Ok(tag) => tag,
            Err(reason) => {
                extraction.errors.push(CommandParseError {
                    tag: kind,
                    raw: rest_of_line(raw, start).to_string(),
                    reason: reason.to_string(),
                });
                cursor = start + kind.keyword().len();
                continue;
            }
        };

        cursor = tag.span.end;
        match parse_payload(kind, tag.json) {
            Ok(Command::LocationSearch(cmd)) => extraction.location = Some(cmd),
            Ok(Command::CameraAction(cmd)) => extraction.camera = Some(cmd),
            Err(e) => {
                extraction.errors.push(CommandParseError {
                    tag: kind,
                    raw: raw.get(tag.span.clone()).unwrap_or_default().to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        }
        cuts.push(tag.span);
    }

    extraction.display_text = strip_spans(raw, &cuts);
    extraction
}

/// A structurally complete tag: `span` runs from `[` through `]`
struct ScannedTag<'a> {
    span: Range<usize>,
    json: &'a str,
}

/// Earliest keyword at or after `cursor` among the kinds still pending
fn next_tag(text: &str, cursor: usize, pending: &[TagKind]) -> Option<(usize, TagKind)> {
    let rest = text.get(cursor..)?;
    pending
        .iter()
        .filter_map(|kind| rest.find(kind.keyword()).map(|i| (cursor + i, *kind)))
        .min_by_key(|(pos, _)| *pos)
}

fn scan_tag(text: &str, start: usize, kind: TagKind) -> Result<ScannedTag<'_>, &'static str> {
    let bytes = text.as_bytes();

    let open = skip_whitespace(bytes, start + kind.keyword().len());
    if bytes.get(open) != Some(&b'{') {
        return Err("expected a JSON object after the tag keyword");
    }

    let end = object_end(bytes, open).ok_or("unterminated JSON object")?;
    let close = skip_whitespace(bytes, end);
    if bytes.get(close) != Some(&b']') {
        return Err("missing closing ']'");
    }

    let json = text.get(open..end).ok_or("unterminated JSON object")?;
    Ok(ScannedTag {
        span: start..close + 1,
        json,
    })
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
        pos += 1;
    }
    pos
}

/// Index one past the `}` matching the `{` at `open`.
///
/// Tags are single-line, so a newline ends the search.
fn object_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if b == b'\n' {
            return None;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Any syntactically valid object is accepted; field contents are not checked.
fn parse_payload(kind: TagKind, json: &str) -> Result<Command, serde_json::Error> {
    let fields: Map<String, Value> = serde_json::from_str(json)?;
    Ok(match kind {
        TagKind::LocationSearch => Command::LocationSearch(LocationSearch(fields)),
        TagKind::CameraAction => Command::CameraAction(CameraAction(fields)),
    })
}

fn rest_of_line(text: &str, start: usize) -> &str {
    let rest = text.get(start..).unwrap_or_default();
    rest.split('\n').next().unwrap_or(rest)
}

/// Remove `cuts` (sorted, non-overlapping) and collapse the whitespace left
/// at each seam to a single space.
fn strip_spans(text: &str, cuts: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (i, cut) in cuts.iter().enumerate() {
        let segment = text.get(last..cut.start).unwrap_or_default();
        join_segment(&mut out, segment, i > 0);
        last = cut.end;
    }
    join_segment(&mut out, text.get(last..).unwrap_or_default(), !cuts.is_empty());

    out.trim().to_string()
}

fn join_segment(out: &mut String, segment: &str, after_cut: bool) {
    if !after_cut {
        out.push_str(segment);
        return;
    }

    let kept = out.trim_end_matches([' ', '\t']).len();
    out.truncate(kept);
    let segment = segment.trim_start_matches([' ', '\t']);

    if !out.is_empty() && !segment.is_empty() && !out.ends_with('\n') && !segment.starts_with('\n')
    {
        out.push(' ');
    }
    out.push_str(segment);
}

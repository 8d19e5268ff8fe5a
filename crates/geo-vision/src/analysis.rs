//! Tolerant decoding of the vision model's JSON reply.
//!
//! The model is asked for a JSON object but replies are often fenced, truncated,
//! or carry trailing commas. Decoding never fails: every field falls back to a
//! named default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{VisionError, VisionResult};

pub const DEFAULT_DESCRIPTION: &str = "Could not analyze the image content";
pub const DEFAULT_SCENE_TYPE: &str = "unknown scene";
pub const DEFAULT_GEOGRAPHIC_CONSISTENCY: &str = "could not assess";
pub const DEFAULT_SPATIAL_CONTEXT: &str = "no spatial context";
pub const DEFAULT_LOCATION_CONFIDENCE: f64 = 0.5;

/// Structured scene analysis with every field defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub description: String,
    pub objects: Vec<String>,
    pub scene_type: String,
    pub geographic_consistency: String,
    pub spatial_landmarks: Vec<String>,
    pub location_confidence: f64,
    pub spatial_context: String,
    pub functional_analysis: String,
    pub temporal_indicators: String,
    pub relevance_to_intention: String,
    pub location_relevance: String,
}

impl Default for SceneAnalysis {
    fn default() -> Self {
        Self {
            description: DEFAULT_DESCRIPTION.to_string(),
            objects: Vec::new(),
            scene_type: DEFAULT_SCENE_TYPE.to_string(),
            geographic_consistency: DEFAULT_GEOGRAPHIC_CONSISTENCY.to_string(),
            spatial_landmarks: Vec::new(),
            location_confidence: DEFAULT_LOCATION_CONFIDENCE,
            spatial_context: DEFAULT_SPATIAL_CONTEXT.to_string(),
            functional_analysis: String::new(),
            temporal_indicators: String::new(),
            relevance_to_intention: String::new(),
            location_relevance: String::new(),
        }
    }
}

impl SceneAnalysis {
    /// Decode a raw model reply. Never fails.
    pub fn parse(raw: &str) -> Self {
        match repair_json(raw) {
            Ok(Value::Object(map)) => Self::from_map(&map),
            Ok(other) => {
                tracing::warn!("Model reply is JSON but not an object ({}); using defaults", kind(&other));
                Self::default()
            }
            Err(e) => {
                tracing::warn!("{e}; using defaults");
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let d = Self::default();
        Self {
            description: text_field(map, "description").unwrap_or(d.description),
            objects: list_field(map, "objects").unwrap_or(d.objects),
            scene_type: text_field(map, "scene_type").unwrap_or(d.scene_type),
            geographic_consistency: text_field(map, "geographic_consistency")
                .unwrap_or(d.geographic_consistency),
            spatial_landmarks: list_field(map, "spatial_landmarks").unwrap_or(d.spatial_landmarks),
            location_confidence: confidence_field(map, "location_confidence")
                .unwrap_or(d.location_confidence),
            spatial_context: text_field(map, "spatial_context").unwrap_or(d.spatial_context),
            functional_analysis: text_field(map, "functional_analysis").unwrap_or(d.functional_analysis),
            temporal_indicators: text_field(map, "temporal_indicators").unwrap_or(d.temporal_indicators),
            relevance_to_intention: text_field(map, "relevance_to_intention")
                .unwrap_or(d.relevance_to_intention),
            location_relevance: text_field(map, "location_relevance").unwrap_or(d.location_relevance),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn list_field(map: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    match map.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) if !s.trim().is_empty() => Some(vec![s.clone()]),
        _ => None,
    }
}

fn confidence_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

/// Parse a model reply as JSON, repairing common damage.
///
/// Handles markdown fences, prose around the object, trailing commas, and
/// truncation (unterminated strings and unclosed brackets).
pub fn repair_json(raw: &str) -> VisionResult<Value> {
    let trimmed = strip_fences(raw.trim());
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let start = trimmed
        .find('{')
        .ok_or_else(|| VisionError::ResponseParse("no JSON object in model reply".to_string()))?;
    let body = match trimmed.rfind('}') {
        Some(end) if end > start => &trimmed[start..=end],
        _ => &trimmed[start..],
    };

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    let repaired = close_unbalanced(&drop_trailing_commas(body));
    serde_json::from_str::<Value>(&repaired)
        .map_err(|e| VisionError::ResponseParse(format!("model reply is not repairable JSON: {e}")))
}

fn strip_fences(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn drop_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn close_unbalanced(s: &str) -> String {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut out = s.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    let tail = out.trim_end();
    let mut out = tail.strip_suffix(',').unwrap_or(tail).to_string();
    if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(closer) = closers.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_reply() {
        let raw = r#"{"description": "A busy crossing", "objects": ["car", "tower"],
            "scene_type": "urban street", "location_confidence": 0.9,
            "location_relevance": "matches the AOI"}"#;
        let a = SceneAnalysis::parse(raw);
        assert_eq!(a.description, "A busy crossing");
        assert_eq!(a.objects, vec!["car", "tower"]);
        assert_eq!(a.scene_type, "urban street");
        assert!((a.location_confidence - 0.9).abs() < 1e-9);
        assert_eq!(a.location_relevance, "matches the AOI");
        assert_eq!(a.spatial_context, DEFAULT_SPATIAL_CONTEXT);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let a = SceneAnalysis::parse(r#"{"scene_type": "park"}"#);
        assert_eq!(a.scene_type, "park");
        assert_eq!(a.description, DEFAULT_DESCRIPTION);
        assert!(a.objects.is_empty());
        assert_eq!(a.location_confidence, DEFAULT_LOCATION_CONFIDENCE);
    }

    #[test]
    fn test_fenced_reply() {
        let raw = "```json\n{\"description\": \"harbor\"}\n```";
        assert_eq!(SceneAnalysis::parse(raw).description, "harbor");
    }

    #[test]
    fn test_prose_around_object() {
        let raw = "Sure! Here is the analysis: {\"scene_type\": \"market\"} Hope it helps.";
        assert_eq!(SceneAnalysis::parse(raw).scene_type, "market");
    }

    #[test]
    fn test_trailing_commas() {
        let raw = r#"{"objects": ["bench", "tree",], "scene_type": "park",}"#;
        let a = SceneAnalysis::parse(raw);
        assert_eq!(a.objects, vec!["bench", "tree"]);
        assert_eq!(a.scene_type, "park");
    }

    #[test]
    fn test_truncated_reply() {
        let raw = r#"{"description": "A temple courtyard", "objects": ["lantern", "gate"#;
        let a = SceneAnalysis::parse(raw);
        assert_eq!(a.description, "A temple courtyard");
        assert_eq!(a.objects, vec!["lantern", "gate"]);
    }

    #[test]
    fn test_truncated_after_key() {
        let raw = r#"{"scene_type": "beach", "location_confidence":"#;
        let a = SceneAnalysis::parse(raw);
        assert_eq!(a.scene_type, "beach");
        assert_eq!(a.location_confidence, DEFAULT_LOCATION_CONFIDENCE);
    }

    #[test]
    fn test_garbage_yields_defaults() {
        assert_eq!(SceneAnalysis::parse("I cannot see any image."), SceneAnalysis::default());
        assert_eq!(SceneAnalysis::parse("[1, 2, 3]"), SceneAnalysis::default());
        assert_eq!(SceneAnalysis::parse(""), SceneAnalysis::default());
    }

    #[test]
    fn test_loose_field_types() {
        let raw = r#"{"objects": "fountain", "location_confidence": "0.75",
            "spatial_landmarks": ["arch", 3, null], "description": null}"#;
        let a = SceneAnalysis::parse(raw);
        assert_eq!(a.objects, vec!["fountain"]);
        assert!((a.location_confidence - 0.75).abs() < 1e-9);
        assert_eq!(a.spatial_landmarks, vec!["arch", "3"]);
        assert_eq!(a.description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let a = SceneAnalysis::parse(r#"{"location_confidence": 7}"#);
        assert_eq!(a.location_confidence, 1.0);
    }

    #[test]
    fn test_repair_reports_unrecoverable() {
        let err = repair_json("no braces here").unwrap_err();
        assert!(matches!(err, VisionError::ResponseParse(_)));
    }
}

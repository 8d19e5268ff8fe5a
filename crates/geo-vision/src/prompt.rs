//! Prompt template rendering and chat message types.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default prompt for geographic scene analysis.
pub const GEO_VISION_ANALYSIS_PROMPT: &str = r#"You are the geographic vision system of an agent. Analyze the attached image together with the geographic information below.

=== Agent status ===
Current intention: ${context.intention}
Current position: ${context.current_position}
Current emotion: ${status.emotion_types}
Agent coordinates: ${geo.agent_coordinates}
Current AOI: ${geo.current_aoi}

=== Geographic context ===
Image location: ${geo.image_location}
Nearby AOIs: ${geo.nearby_aois}
Distance from agent: ${geo.distance_from_agent}
Location consistency: ${geo.location_consistency}
Summary: ${geo.summary}

Provide:
1. Visual content: overall scene, main objects, buildings and people, scene type (indoor/outdoor, commercial/residential/natural), environment (weather, light, likely time of day).
2. Spatial analysis: consistency with the known location, recognizable landmarks, viewing direction, relation to nearby AOIs.
3. Semantics: function of the place, likely activities, social and cultural background, season.
4. Location verification: whether the content matches the GPS position and the expected surroundings.

Reply in JSON:
{
    "description": "detailed description of the image in its geographic setting",
    "objects": ["object1", "building2", "landmark3"],
    "scene_type": "scene type",
    "geographic_consistency": "assessment of geographic consistency",
    "spatial_landmarks": ["recognizable landmarks or features"],
    "location_confidence": 0.8,
    "spatial_context": "spatial context",
    "functional_analysis": "function of the scene",
    "temporal_indicators": "time-of-day and season cues",
    "relevance_to_intention": "relevance to the current intention",
    "location_relevance": "relevance of the location"
}
"#;

/// Value substituted for placeholders with no binding.
const UNBOUND_PLACEHOLDER: &str = "unknown";

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z0-9_.]+)\}")
            .map_err(|e| tracing::error!("Invalid placeholder pattern: {e}"))
            .ok()
    })
    .as_ref()
}

/// A `${name}` template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute every `${name}` from `bindings`; unbound names become `unknown`.
    pub fn render(&self, bindings: &HashMap<String, String>) -> String {
        let Some(re) = placeholder_regex() else {
            return self.template.clone();
        };
        re.replace_all(&self.template, |caps: &regex::Captures<'_>| {
            bindings
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| UNBOUND_PLACEHOLDER.to_string())
        })
        .into_owned()
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<String> {
        placeholder_regex()
            .map(|re| re.captures_iter(&self.template).map(|c| c[1].to_string()).collect())
            .unwrap_or_default()
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(GEO_VISION_ANALYSIS_PROMPT)
    }
}

/// One role-tagged turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user turn carrying the text followed by a high-detail JPEG attachment.
    pub fn user_with_image(text: impl Into<String>, jpeg_base64: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/jpeg;base64,{jpeg_base64}"),
                        detail: Some("high".to_string()),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Requested reply format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_and_defaults() {
        let template = PromptTemplate::new("at ${geo.image_location} feeling ${status.mood}");
        let mut bindings = HashMap::new();
        bindings.insert("geo.image_location".to_string(), "(1.000000, 2.000000)".to_string());
        assert_eq!(template.render(&bindings), "at (1.000000, 2.000000) feeling unknown");
    }

    #[test]
    fn test_placeholder_pattern_compiles() {
        assert!(placeholder_regex().is_some());
    }

    #[test]
    fn test_default_template_placeholders() {
        let names = PromptTemplate::default().placeholders();
        assert!(names.contains(&"context.intention".to_string()));
        assert!(names.contains(&"geo.summary".to_string()));
        assert!(names.contains(&"geo.location_consistency".to_string()));
    }

    #[test]
    fn test_image_message_wire_shape() {
        let msg = ChatMessage::user_with_image("look", "QUJD");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
        assert_eq!(json["content"][1]["image_url"]["detail"], "high");
    }

    #[test]
    fn test_response_format_wire_shape() {
        let json = serde_json::to_value(ResponseFormat::JsonObject).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "json_object" }));
    }
}

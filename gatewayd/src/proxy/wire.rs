//! Anthropic Messages wire types.
//!
//! `messages[*].content` and `system` accept either a bare string or an
//! array of typed content blocks; both directions must round-trip
//! faithfully, so [`StringOrBlocks`] records which shape it was built from
//! and replays that shape on serialisation rather than normalising to one
//! representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<StringOrBlocks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: StringOrBlocks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: Value },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: Value, #[serde(default, skip_serializing_if = "Option::is_none")] is_error: Option<bool> },
    Thinking { thinking: String },
}

/// A value that was either a bare string or an array of [`ContentBlock`]s
/// on the wire, preserving that distinction across a parse/serialise
/// round trip.
#[derive(Debug, Clone)]
pub enum StringOrBlocks {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl StringOrBlocks {
    /// The text a router or classifier cares about: the literal string, or
    /// the concatenation of every text block's text (other block kinds
    /// contribute nothing to the routing-relevant text).
    pub fn as_routing_text(&self) -> String {
        match self {
            StringOrBlocks::Text(s) => s.clone(),
            StringOrBlocks::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_tool_use(&self) -> bool {
        matches!(self, StringOrBlocks::Blocks(blocks) if blocks.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. })))
    }

    pub fn has_image(&self) -> bool {
        matches!(self, StringOrBlocks::Blocks(blocks) if blocks.iter().any(|b| matches!(b, ContentBlock::Image { .. })))
    }
}

impl Serialize for StringOrBlocks {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            StringOrBlocks::Text(s) => s.serialize(serializer),
            StringOrBlocks::Blocks(blocks) => blocks.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StringOrBlocks {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Text(String),
            Blocks(Vec<ContentBlock>),
        }
        match Shape::deserialize(deserializer)? {
            Shape::Text(s) => Ok(StringOrBlocks::Text(s)),
            Shape::Blocks(b) => Ok(StringOrBlocks::Blocks(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_shape_round_trips_as_a_bare_string() {
        let original = StringOrBlocks::Text("hello".to_string());
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, "\"hello\"");
        let parsed: StringOrBlocks = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, StringOrBlocks::Text(s) if s == "hello"));
    }

    #[test]
    fn array_shape_round_trips_preserving_order_and_types() {
        let original = StringOrBlocks::Blocks(vec![
            ContentBlock::Text { text: "part one".to_string() },
            ContentBlock::ToolUse { id: "tu_1".to_string(), name: "search".to_string(), input: serde_json::json!({"q": "rust"}) },
        ]);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: StringOrBlocks = serde_json::from_str(&json).unwrap();
        match parsed {
            StringOrBlocks::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == "part one"));
                assert!(matches!(&blocks[1], ContentBlock::ToolUse { id, .. } if id == "tu_1"));
            }
            StringOrBlocks::Text(_) => panic!("expected array shape to round-trip as an array"),
        }
    }

    #[test]
    fn as_routing_text_concatenates_only_text_blocks() {
        let value = StringOrBlocks::Blocks(vec![
            ContentBlock::Text { text: "first".to_string() },
            ContentBlock::Image { source: serde_json::json!({}) },
            ContentBlock::Text { text: "second".to_string() },
        ]);
        assert_eq!(value.as_routing_text(), "first\nsecond");
    }

    #[test]
    fn has_image_detects_image_blocks() {
        let with_image = StringOrBlocks::Blocks(vec![ContentBlock::Image { source: serde_json::json!({}) }]);
        let without_image = StringOrBlocks::Text("hi".to_string());
        assert!(with_image.has_image());
        assert!(!without_image.has_image());
    }

    #[test]
    fn full_request_round_trips_through_serde() {
        let body = serde_json::json!({
            "model": "claude-3-haiku",
            "max_tokens": 16,
            "messages": [{"role": "user", "content": "hello"}],
        });
        let request: MessagesRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.messages.len(), 1);
        assert!(matches!(&request.messages[0].content, StringOrBlocks::Text(s) if s == "hello"));
    }
}

//! Entity and relationship extraction from free text.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use kgagent_core::types::Metadata;

use crate::client::{ChatOptions, LlmClient, LlmMessage};
use crate::error::{LlmError, Result};

/// Entity types requested when the caller does not name any.
pub const DEFAULT_ENTITY_TYPES: &[&str] = &[
    "Person",
    "Organization",
    "Location",
    "Event",
    "Concept",
    "Date",
    "Product",
    "Technology",
];

const SYSTEM_PROMPT: &str =
    "You are an expert at extracting structured knowledge from text. Always return valid JSON.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
    pub properties: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub description: String,
    pub properties: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub model_used: String,
    pub text_length: usize,
    pub extraction_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
    pub metadata: ExtractionMetadata,
}

/// Extracts entities and relationships with a chat model.
#[derive(Clone)]
pub struct EntityExtractor {
    client: LlmClient,
}

impl EntityExtractor {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Extract entities and relationships from `text`.
    ///
    /// `entity_types` narrows what the model is asked to look for; `None` or
    /// an empty slice uses [`DEFAULT_ENTITY_TYPES`].
    pub async fn extract(
        &self,
        text: &str,
        entity_types: Option<&[String]>,
    ) -> Result<ExtractionResult> {
        let types = match entity_types {
            Some(types) if !types.is_empty() => types.join(", "),
            _ => DEFAULT_ENTITY_TYPES.join(", "),
        };
        let messages = [
            LlmMessage::system(SYSTEM_PROMPT),
            LlmMessage::user(extraction_prompt(&types, text)),
        ];

        let raw = self
            .client
            .chat(&messages, ChatOptions::with_temperature(0.1))
            .await?;
        let (entities, relationships) = parse_extraction(&raw)?;
        debug!(
            entities = entities.len(),
            relationships = relationships.len(),
            "Extracted knowledge from text"
        );

        Ok(ExtractionResult {
            entities,
            relationships,
            metadata: ExtractionMetadata {
                model_used: self.client.model().to_string(),
                text_length: text.chars().count(),
                extraction_time: Utc::now().to_rfc3339(),
            },
        })
    }
}

fn extraction_prompt(entity_types: &str, text: &str) -> String {
    format!(
        "Extract entities and relationships from the following text.\n\n\
         Entity types to focus on: {entity_types}\n\n\
         Return the result as a JSON object with the following structure:\n\
         {{\n  \"entities\": [\n    {{\"name\": \"entity name\", \"type\": \"entity type\", \
         \"description\": \"brief description\", \"properties\": {{\"key\": \"value\"}}}}\n  ],\n  \
         \"relationships\": [\n    {{\"source\": \"source entity name\", \"target\": \"target entity name\", \
         \"relationship\": \"relationship type\", \"description\": \"relationship description\", \
         \"properties\": {{\"key\": \"value\"}}}}\n  ]\n}}\n\n\
         Text to analyze:\n{text}"
    )
}

/// Pull a JSON object out of a model reply.
///
/// Accepts the bare object, a fenced ```` ```json ```` block, or the first
/// `{...}` span in surrounding prose.
pub fn recover_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        let body = body.find("```").map(|end| &body[..end]).unwrap_or(body);
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body.trim()) {
            return Some(value);
        }
    }

    let (start, end) = (trimmed.find('{')?, trimmed.rfind('}')?);
    if start >= end {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Parse a model reply into entities and relationships.
pub fn parse_extraction(
    raw: &str,
) -> Result<(Vec<ExtractedEntity>, Vec<ExtractedRelationship>)> {
    let value = recover_json(raw).ok_or_else(|| {
        warn!(reply_len = raw.len(), "Extraction reply was not JSON");
        LlmError::InvalidJson(truncate_for_error(raw))
    })?;

    let entities = value
        .get("entities")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_entity).collect())
        .unwrap_or_default();
    let relationships = value
        .get("relationships")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_relationship).collect())
        .unwrap_or_default();

    Ok((entities, relationships))
}

fn parse_entity(item: &Value) -> Option<ExtractedEntity> {
    let (name, obj) = match item {
        Value::String(name) => (name.trim().to_string(), None),
        Value::Object(obj) => {
            let name = obj
                .get("name")
                .or_else(|| obj.get("entity"))
                .and_then(value_to_string)?;
            (name.trim().to_string(), Some(obj))
        }
        _ => return None,
    };
    if name.is_empty() {
        return None;
    }

    let field = |keys: &[&str]| -> String {
        obj.and_then(|o| keys.iter().find_map(|k| o.get(*k).and_then(value_to_string)))
            .unwrap_or_default()
    };
    let entity_type = field(&["type", "entity_type", "label"]);

    Some(ExtractedEntity {
        name,
        entity_type: if entity_type.trim().is_empty() {
            "Concept".to_string()
        } else {
            entity_type.trim().to_string()
        },
        description: field(&["description"]),
        properties: obj.map(properties_of).unwrap_or_default(),
    })
}

fn parse_relationship(item: &Value) -> Option<ExtractedRelationship> {
    let obj = item.as_object()?;
    let pick = |keys: &[&str]| -> String {
        keys.iter()
            .find_map(|k| obj.get(*k).and_then(value_to_string))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let source = pick(&["source", "from", "entity1"]);
    let target = pick(&["target", "to", "entity2"]);
    if source.is_empty() || target.is_empty() {
        return None;
    }

    Some(ExtractedRelationship {
        source,
        target,
        relationship: pick(&["relationship", "relationship_type", "type"]),
        description: pick(&["description"]),
        properties: properties_of(obj),
    })
}

fn properties_of(obj: &serde_json::Map<String, Value>) -> Metadata {
    obj.get("properties")
        .or_else(|| obj.get("attributes"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => obj.get("name").and_then(value_to_string),
        _ => None,
    }
}

fn truncate_for_error(raw: &str) -> String {
    const MAX: usize = 200;
    if raw.chars().count() <= MAX {
        raw.to_string()
    } else {
        let head: String = raw.chars().take(MAX).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client_for, completion_body};

    #[test]
    fn test_recover_json_variants() {
        let bare = r#"{"entities": []}"#;
        assert!(recover_json(bare).is_some());

        let fenced = "Here you go:\n```json\n{\"entities\": [{\"name\": \"Ada\"}]}\n```\nDone.";
        assert_eq!(recover_json(fenced).unwrap()["entities"][0]["name"], "Ada");

        let prose = "Sure! {\"relationships\": []} Hope that helps.";
        assert!(recover_json(prose).unwrap().get("relationships").is_some());

        assert!(recover_json("no json here").is_none());
        assert!(recover_json("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_parse_extraction_drops_incomplete_items() {
        let raw = r#"{
            "entities": [
                {"name": "Ada Lovelace", "type": "Person", "description": "Mathematician",
                 "properties": {"born": 1815}},
                {"name": "   ", "type": "Person"},
                {"type": "Organization"},
                "Analytical Engine",
                {"name": "London"}
            ],
            "relationships": [
                {"source": "Ada Lovelace", "target": "Analytical Engine",
                 "relationship": "wrote about"},
                {"source": "", "target": "London", "relationship": "lived in"},
                {"target": "London"}
            ]
        }"#;
        let (entities, relationships) = parse_extraction(raw).unwrap();

        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].name, "Ada Lovelace");
        assert_eq!(entities[0].entity_type, "Person");
        assert_eq!(entities[0].properties["born"], 1815);
        assert_eq!(entities[1].name, "Analytical Engine");
        assert_eq!(entities[1].entity_type, "Concept");
        assert_eq!(entities[2].entity_type, "Concept");

        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].relationship, "wrote about");
    }

    #[test]
    fn test_parse_extraction_accepts_missing_arrays() {
        let (entities, relationships) = parse_extraction("{}").unwrap();
        assert!(entities.is_empty());
        assert!(relationships.is_empty());
    }

    #[test]
    fn test_parse_extraction_rejects_non_json() {
        let err = parse_extraction("I could not find anything.").unwrap_err();
        assert!(matches!(err, LlmError::InvalidJson(_)));
    }

    #[test]
    fn test_extracted_entity_serializes_type_key() {
        let entity = ExtractedEntity {
            name: "Ada".to_string(),
            entity_type: "Person".to_string(),
            description: String::new(),
            properties: Metadata::new(),
        };
        let value = serde_json::to_value(entity).unwrap();
        assert_eq!(value["type"], "Person");
    }

    #[tokio::test]
    async fn test_extract_uses_model_reply() {
        let mut server = mockito::Server::new_async().await;
        let reply = "```json\n{\"entities\": [{\"name\": \"Grace Hopper\", \"type\": \"Person\"}], \"relationships\": []}\n```";
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("Entity types to focus on: Person, Software".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body(reply))
            .create_async()
            .await;

        let extractor = EntityExtractor::new(client_for(&server));
        let types = vec!["Person".to_string(), "Software".to_string()];
        let result = extractor
            .extract("Grace Hopper built compilers.", Some(&types))
            .await
            .unwrap();

        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].name, "Grace Hopper");
        assert_eq!(result.metadata.model_used, "gpt-test");
        assert_eq!(result.metadata.text_length, 29);
    }
}

//! Prompt context assembly from search hits and chat history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kgagent_core::types::Metadata;
use kgagent_core::{ChatMessage, ChatRole, SearchHit};

/// Messages of recent conversation included in the context.
pub const HISTORY_WINDOW: usize = 6;

/// A search hit as cited alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub content: String,
    pub relevance_score: f64,
    pub metadata: Metadata,
}

/// Render hits and the tail of the conversation as a markdown context block.
pub fn prepare_context(hits: &[SearchHit], history: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !history.is_empty() {
        parts.push("## Recent Conversation:".to_string());
        let skip = history.len().saturating_sub(HISTORY_WINDOW);
        for message in &history[skip..] {
            let speaker = match message.role {
                ChatRole::User => "Human",
                _ => "Assistant",
            };
            parts.push(format!("{speaker}: {}", message.content));
        }
        parts.push(String::new());
    }

    if hits.is_empty() {
        parts.push("## Knowledge Graph Search:".to_string());
        parts.push(
            "No directly relevant information found in the knowledge graph for this query."
                .to_string(),
        );
        parts.push(String::new());
    } else {
        parts.push("## Relevant Knowledge from Graph:".to_string());
        for (i, hit) in hits.iter().enumerate() {
            parts.push(format!("{}. **{}**: {}", i + 1, hit.node_type, hit.content));
            let meta = metadata_line(&hit.metadata);
            if !meta.is_empty() {
                parts.push(format!("   Metadata: {meta}"));
            }
            parts.push(format!("   Relevance: {:.2}", hit.score));
            parts.push(String::new());
        }
    }

    parts.join("\n")
}

/// One-line account of which graph nodes informed an answer.
pub fn extract_reasoning(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "Response generated without specific graph context due to no relevant search results."
            .to_string();
    }
    let mut types: Vec<&str> = Vec::new();
    for hit in hits {
        if !types.contains(&hit.node_type.as_str()) {
            types.push(&hit.node_type);
        }
    }
    format!(
        "Response generated using {} relevant graph nodes of types: {}",
        hits.len(),
        types.join(", ")
    )
}

pub fn format_sources(hits: &[SearchHit]) -> Vec<Source> {
    hits.iter()
        .map(|hit| Source {
            node_id: hit.node_id.clone(),
            node_type: hit.node_type.clone(),
            content: hit.content.clone(),
            relevance_score: hit.score,
            metadata: hit.metadata.clone(),
        })
        .collect()
}

/// `key: value` pairs for non-empty metadata values.
fn metadata_line(metadata: &Metadata) -> String {
    metadata
        .iter()
        .filter_map(|(k, v)| {
            let rendered = match v {
                Value::Null => return None,
                Value::String(s) if s.is_empty() => return None,
                Value::Bool(false) => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(format!("{k}: {rendered}"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, node_type: &str, content: &str, score: f64) -> SearchHit {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), Value::String("notes.txt".to_string()));
        metadata.insert("name".to_string(), Value::String(String::new()));
        SearchHit {
            node_id: id.to_string(),
            content: content.to_string(),
            node_type: node_type.to_string(),
            score,
            metadata,
        }
    }

    #[test]
    fn test_context_with_hits_and_history() {
        let history: Vec<ChatMessage> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("q{i}"))
                } else {
                    ChatMessage::assistant(format!("a{i}"))
                }
            })
            .collect();
        let hits = vec![hit("n1", "Episode", "Ada wrote notes.", 1.234)];

        let ctx = prepare_context(&hits, &history);
        assert!(ctx.starts_with("## Recent Conversation:\nHuman: q2\nAssistant: a3"));
        assert!(!ctx.contains("q0"));
        assert!(!ctx.contains("a1\n"));
        assert!(ctx.contains("## Relevant Knowledge from Graph:\n1. **Episode**: Ada wrote notes."));
        assert!(ctx.contains("   Metadata: source: notes.txt\n"));
        assert!(ctx.contains("   Relevance: 1.23"));
    }

    #[test]
    fn test_context_without_hits() {
        let ctx = prepare_context(&[], &[]);
        assert_eq!(
            ctx,
            "## Knowledge Graph Search:\nNo directly relevant information found in the knowledge graph for this query.\n"
        );
    }

    #[test]
    fn test_reasoning_lists_distinct_types_in_order() {
        let hits = vec![
            hit("a", "Episode", "", 1.0),
            hit("b", "Person", "", 0.5),
            hit("c", "Episode", "", 0.2),
        ];
        assert_eq!(
            extract_reasoning(&hits),
            "Response generated using 3 relevant graph nodes of types: Episode, Person"
        );
        assert!(extract_reasoning(&[]).contains("no relevant search results"));
    }

    #[test]
    fn test_sources_mirror_hits() {
        let sources = format_sources(&[hit("a", "Person", "Ada", 0.7)]);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].relevance_score, 0.7);
        let json = serde_json::to_value(&sources[0]).unwrap();
        assert_eq!(json["type"], "Person");
    }
}

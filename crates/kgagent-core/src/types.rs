//! Core domain types for the kgagent knowledge graph service.
//!
//! These are the records exchanged between the graph layer, the ingestion
//! pipeline, the chat service, and the HTTP API (and from there the UI).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ── Identifiers ──────────────────────────────────────────────────

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a knowledge graph. Every data node carries it as `graph_id`.
    GraphId
);
uuid_id!(
    /// Identifier of a node (episode, entity, document) inside a graph.
    NodeId
);
uuid_id!(
    /// Identifier of an uploaded document.
    DocumentId
);
uuid_id!(
    /// Identifier of a chat session.
    SessionId
);
uuid_id!(MessageId);

// ── Graphs ───────────────────────────────────────────────────────

/// A knowledge graph as listed by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub graph_id: GraphId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub node_count: i64,
    pub edge_count: i64,
    #[serde(default)]
    pub metadata: Metadata,
}

/// First and last `timestamp` seen on the nodes of a graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemporalRange {
    pub start_date: String,
    pub end_date: String,
}

/// Statistical breakdown of a graph's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub graph_id: GraphId,
    pub node_count: i64,
    pub edge_count: i64,
    /// Keyed by the node's labels joined with `:` (e.g. `Entity:Person`).
    pub node_types: std::collections::BTreeMap<String, i64>,
    pub relationship_types: std::collections::BTreeMap<String, i64>,
    pub temporal_range: Option<TemporalRange>,
}

// ── Documents ────────────────────────────────────────────────────

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether processing has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Ok(Self::Uploaded),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// An uploaded source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,
    pub graph_id: GraphId,
    pub filename: String,
    pub file_path: String,
    pub content_type: String,
    pub size: u64,
    /// BLAKE3 hex digest of the raw file bytes.
    pub content_hash: String,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Progress of a document through the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingStatus {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    /// 0.0 to 1.0
    pub progress: f64,
    pub message: Option<String>,
    pub entities_extracted: Option<u64>,
    pub relationships_extracted: Option<u64>,
    pub errors: Option<Vec<String>>,
}

impl ProcessingStatus {
    pub fn queued(document_id: DocumentId) -> Self {
        Self {
            document_id,
            status: DocumentStatus::Queued,
            progress: 0.0,
            message: Some("Document uploaded, processing queued".to_string()),
            entities_extracted: None,
            relationships_extracted: None,
            errors: None,
        }
    }
}

// ── Chat ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A single message in a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content)
    }

    pub fn with_role(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A conversation against one graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: SessionId,
    pub graph_id: GraphId,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ChatSession {
    pub fn new(session_id: SessionId, graph_id: GraphId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            graph_id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: Metadata::new(),
        }
    }
}

// ── Search ───────────────────────────────────────────────────────

/// A node returned by graph search, ready to be used as RAG context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub node_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

// ── Timeline ─────────────────────────────────────────────────────

/// Bucket size for timeline aggregation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeGranularity {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl TimeGranularity {
    /// Parse a granularity name; anything unrecognized falls back to `Day`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Self::Hour,
            "week" => Self::Week,
            "month" => Self::Month,
            _ => Self::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_uuid_strings() {
        let id = GraphId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));

        let parsed: GraphId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn id_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<DocumentId>().is_err());
    }

    #[test]
    fn document_status_wire_format() {
        let json = serde_json::to_string(&DocumentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!("Completed".parse::<DocumentStatus>(), Ok(DocumentStatus::Completed));
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::Queued.is_terminal());
    }

    #[test]
    fn search_hit_uses_type_key() {
        let hit = SearchHit {
            node_id: "n1".to_string(),
            content: "Ada Lovelace wrote the first program".to_string(),
            node_type: "Episode".to_string(),
            score: 0.8,
            metadata: Metadata::new(),
        };
        let value = serde_json::to_value(&hit).unwrap();
        assert_eq!(value["type"], "Episode");
        assert!(value.get("node_type").is_none());
    }

    #[test]
    fn granularity_falls_back_to_day() {
        assert_eq!(TimeGranularity::parse_lenient("WEEK"), TimeGranularity::Week);
        assert_eq!(TimeGranularity::parse_lenient("fortnight"), TimeGranularity::Day);
    }

    #[test]
    fn chat_session_starts_empty() {
        let session = ChatSession::new(SessionId::new(), GraphId::new());
        assert!(session.messages.is_empty());
        assert_eq!(session.created_at, session.updated_at);
    }
}

//! Graph persistence: write extracted entities and relationships for an episode.

use chrono::{DateTime, Utc};

use kgagent_core::{GraphId, NodeId};
use kgagent_graph::{EntityInput, GraphClient, RelationInput};
use kgagent_llm::{ExtractedEntity, ExtractedRelationship, ExtractionResult};

use crate::error::Result;

/// Which parts of an extraction to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionFlags {
    pub entities: bool,
    pub relationships: bool,
}

impl ExtractionFlags {
    pub fn any(&self) -> bool {
        self.entities || self.relationships
    }
}

/// Counts of what was written for one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub entities: u64,
    pub relationships: u64,
}

/// Persist an extraction result and link everything to the episode it came from.
///
/// Relationship endpoints are merged as entities first so the edge has
/// something to attach to; they only count as entities when entity
/// extraction was requested.
pub async fn persist_extraction(
    graph: &GraphClient,
    graph_id: &GraphId,
    episode_id: &NodeId,
    extraction: &ExtractionResult,
    flags: ExtractionFlags,
    seen_at: DateTime<Utc>,
) -> Result<PersistSummary> {
    let mut summary = PersistSummary::default();

    if flags.entities {
        for entity in &extraction.entities {
            let id = graph
                .upsert_entity(graph_id, &entity_input(entity), seen_at)
                .await?;
            graph.link_mention(graph_id, episode_id, &id).await?;
            summary.entities += 1;
        }
    }

    if flags.relationships {
        for rel in &extraction.relationships {
            for endpoint in [&rel.source, &rel.target] {
                let input = endpoint_input(endpoint, &extraction.entities);
                let id = graph.upsert_entity(graph_id, &input, seen_at).await?;
                graph.link_mention(graph_id, episode_id, &id).await?;
            }
            if graph
                .upsert_relation(graph_id, &relation_input(rel), seen_at)
                .await?
            {
                summary.relationships += 1;
            } else {
                tracing::debug!(
                    source = %rel.source,
                    target = %rel.target,
                    "Relationship endpoints missing; skipped"
                );
            }
        }
    }

    Ok(summary)
}

fn entity_input(entity: &ExtractedEntity) -> EntityInput {
    EntityInput {
        name: entity.name.clone(),
        entity_type: entity.entity_type.clone(),
        description: entity.description.clone(),
        attributes: entity.properties.clone(),
    }
}

/// Entity input for a relationship endpoint, reusing the extracted entity
/// of the same name when there is one.
fn endpoint_input(name: &str, entities: &[ExtractedEntity]) -> EntityInput {
    entities
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
        .map(entity_input)
        .unwrap_or_else(|| EntityInput {
            name: name.to_string(),
            entity_type: "Concept".to_string(),
            ..Default::default()
        })
}

fn relation_input(rel: &ExtractedRelationship) -> RelationInput {
    RelationInput {
        source: rel.source.clone(),
        target: rel.target.clone(),
        relationship: rel.relationship.clone(),
        description: rel.description.clone(),
        attributes: rel.properties.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgagent_core::types::Metadata;

    fn extracted(name: &str, entity_type: &str) -> ExtractedEntity {
        ExtractedEntity {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            description: "desc".to_string(),
            properties: Metadata::new(),
        }
    }

    #[test]
    fn test_endpoint_reuses_extracted_entity() {
        let entities = vec![extracted("Ada Lovelace", "Person")];
        let input = endpoint_input("ada lovelace", &entities);
        assert_eq!(input.entity_type, "Person");
        assert_eq!(input.description, "desc");
    }

    #[test]
    fn test_unknown_endpoint_becomes_concept() {
        let input = endpoint_input("Analytical Engine", &[]);
        assert_eq!(input.name, "Analytical Engine");
        assert_eq!(input.entity_type, "Concept");
        assert!(input.description.is_empty());
    }

    #[test]
    fn test_flags_any() {
        let none = ExtractionFlags {
            entities: false,
            relationships: false,
        };
        assert!(!none.any());
        assert!(ExtractionFlags {
            entities: false,
            relationships: true
        }
        .any());
    }
}

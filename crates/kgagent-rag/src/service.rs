//! Retrieval-augmented answer generation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use kgagent_core::{ChatMessage, GraphId, SearchHit};
use kgagent_llm::{ChatOptions, LlmClient, LlmMessage};

use crate::context::{extract_reasoning, format_sources, prepare_context, Source};
use crate::error::Result;
use crate::search::GraphSearcher;

const SYSTEM_PROMPT: &str = "You are an intelligent AI assistant with access to a temporal knowledge graph.
Your role is to help users understand and explore information stored in the graph.

When answering questions:
1. Use the provided graph context to inform your responses
2. Be specific about information sources when available
3. If information is not in the graph, clearly state that
4. Consider temporal relationships and how information has evolved over time
5. Provide reasoning for your answers when helpful

You have access to relevant nodes and relationships from the knowledge graph based on the user's query.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagMetadata {
    pub search_results_count: usize,
    pub model_used: String,
    pub graph_id: GraphId,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub response: String,
    pub sources: Vec<Source>,
    pub reasoning: Option<String>,
    pub metadata: RagMetadata,
}

#[derive(Clone)]
pub struct RagService {
    searcher: GraphSearcher,
    llm: LlmClient,
}

impl RagService {
    pub fn new(searcher: GraphSearcher, llm: LlmClient) -> Self {
        Self { searcher, llm }
    }

    pub fn searcher(&self) -> &GraphSearcher {
        &self.searcher
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    /// Search the graph for `query` and answer it from the hits and `history`.
    pub async fn generate_response(
        &self,
        query: &str,
        graph_id: &GraphId,
        history: &[ChatMessage],
        search_limit: u32,
    ) -> Result<RagResponse> {
        let hits = self
            .searcher
            .search(graph_id, query, search_limit, &[])
            .await?;
        self.answer(query, graph_id, &hits, history).await
    }

    /// Answer `query` from already retrieved hits.
    pub async fn answer(
        &self,
        query: &str,
        graph_id: &GraphId,
        hits: &[SearchHit],
        history: &[ChatMessage],
    ) -> Result<RagResponse> {
        answer_from_hits(&self.llm, query, graph_id, hits, history).await
    }
}

/// Ask the chat model to answer `query` given the hits and conversation.
pub async fn answer_from_hits(
    llm: &LlmClient,
    query: &str,
    graph_id: &GraphId,
    hits: &[SearchHit],
    history: &[ChatMessage],
) -> Result<RagResponse> {
    let context = prepare_context(hits, history);
    let messages = [
        LlmMessage::system(SYSTEM_PROMPT),
        LlmMessage::user(user_prompt(&context, query)),
    ];
    let response = llm
        .chat(&messages, ChatOptions::with_temperature(0.7).max_tokens(1000))
        .await?;

    info!(graph_id = %graph_id, hits = hits.len(), "Generated RAG response");

    Ok(RagResponse {
        response,
        sources: format_sources(hits),
        reasoning: Some(extract_reasoning(hits)),
        metadata: RagMetadata {
            search_results_count: hits.len(),
            model_used: llm.model().to_string(),
            graph_id: *graph_id,
            generated_at: Utc::now().to_rfc3339(),
        },
    })
}

fn user_prompt(context: &str, query: &str) -> String {
    format!(
        "Context from knowledge graph and conversation history:\n{context}\n\n\
         User question: {query}\n\n\
         Please provide a helpful and accurate response based on the available context. \
         If the context doesn't contain relevant information, clearly state that and provide \
         general guidance if appropriate."
    )
}

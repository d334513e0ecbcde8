//! In-memory chat sessions.
//!
//! Sessions are bound to the graph they were opened against and are lost on
//! restart. Deleting a graph drops its sessions through
//! [`SessionStore::remove_for_graph`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kgagent_core::types::Metadata;
use kgagent_core::{ChatMessage, ChatSession, GraphId, SessionId};

use crate::error::{RagError, Result};

/// A session as downloaded by the export endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: SessionId,
    pub graph_id: GraphId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub metadata: Metadata,
    pub exported_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, ChatSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session `session_id` or open a new one on `graph_id`.
    ///
    /// A caller-chosen id that is not known yet opens a session with that
    /// id. A known session opened on another graph is rejected.
    pub fn get_or_create(
        &self,
        session_id: Option<SessionId>,
        graph_id: GraphId,
    ) -> Result<ChatSession> {
        let session_id = session_id.unwrap_or_default();
        let mut map = self.write();
        if let Some(existing) = map.get(&session_id) {
            if existing.graph_id != graph_id {
                return Err(RagError::GraphMismatch {
                    session_id,
                    expected: existing.graph_id,
                    requested: graph_id,
                });
            }
            return Ok(existing.clone());
        }

        let session = ChatSession::new(session_id, graph_id);
        map.insert(session_id, session.clone());
        tracing::debug!(session_id = %session_id, graph_id = %graph_id, "Chat session created");
        Ok(session)
    }

    pub fn append(&self, session_id: &SessionId, message: ChatMessage) -> Result<()> {
        let mut map = self.write();
        let session = map
            .get_mut(session_id)
            .ok_or(RagError::SessionNotFound(*session_id))?;
        session.updated_at = message.timestamp.max(session.updated_at);
        session.messages.push(message);
        Ok(())
    }

    /// Up to `limit` messages preceding the most recent one, oldest first.
    ///
    /// Called after the user's message is appended, this is the
    /// conversation the answer should take into account.
    pub fn history(&self, session_id: &SessionId, limit: usize) -> Result<Vec<ChatMessage>> {
        let map = self.read();
        let session = map
            .get(session_id)
            .ok_or(RagError::SessionNotFound(*session_id))?;
        let previous = session.messages.len().saturating_sub(1);
        let start = previous.saturating_sub(limit);
        Ok(session.messages[start..previous].to_vec())
    }

    pub fn get(&self, session_id: &SessionId) -> Result<ChatSession> {
        self.read()
            .get(session_id)
            .cloned()
            .ok_or(RagError::SessionNotFound(*session_id))
    }

    /// Sessions, most recently updated first, optionally for one graph.
    pub fn list(&self, graph_id: Option<GraphId>) -> Vec<ChatSession> {
        let mut sessions: Vec<ChatSession> = self
            .read()
            .values()
            .filter(|s| graph_id.map_or(true, |g| s.graph_id == g))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    pub fn delete(&self, session_id: &SessionId) -> Result<()> {
        self.write()
            .remove(session_id)
            .map(|_| ())
            .ok_or(RagError::SessionNotFound(*session_id))
    }

    /// Drop all messages, keeping the session itself.
    pub fn clear(&self, session_id: &SessionId) -> Result<()> {
        let mut map = self.write();
        let session = map
            .get_mut(session_id)
            .ok_or(RagError::SessionNotFound(*session_id))?;
        session.messages.clear();
        session.updated_at = Utc::now();
        Ok(())
    }

    pub fn export(&self, session_id: &SessionId) -> Result<SessionExport> {
        let session = self.get(session_id)?;
        Ok(SessionExport {
            session_id: session.session_id,
            graph_id: session.graph_id,
            created_at: session.created_at,
            updated_at: session.updated_at,
            messages: session.messages,
            metadata: session.metadata,
            exported_at: Utc::now(),
        })
    }

    /// Remove every session of a graph, returning how many were dropped.
    pub fn remove_for_graph(&self, graph_id: &GraphId) -> usize {
        let mut map = self.write();
        let before = map.len();
        map.retain(|_, s| s.graph_id != *graph_id);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, ChatSession>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, ChatSession>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_get_or_create_reuses_and_honours_requested_id() {
        let store = SessionStore::new();
        let graph = GraphId::new();

        let fresh = store.get_or_create(None, graph).unwrap();
        assert_eq!(fresh.graph_id, graph);
        assert!(fresh.messages.is_empty());

        let again = store.get_or_create(Some(fresh.session_id), graph).unwrap();
        assert_eq!(again.session_id, fresh.session_id);

        let chosen = SessionId::new();
        let named = store.get_or_create(Some(chosen), graph).unwrap();
        assert_eq!(named.session_id, chosen);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_session_bound_to_other_graph_is_rejected() {
        let store = SessionStore::new();
        let first = GraphId::new();
        let session = store.get_or_create(None, first).unwrap();

        let err = store
            .get_or_create(Some(session.session_id), GraphId::new())
            .unwrap_err();
        match err {
            RagError::GraphMismatch { expected, .. } => assert_eq!(expected, first),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_history_excludes_latest_message() {
        let store = SessionStore::new();
        let session = store.get_or_create(None, GraphId::new()).unwrap();
        let id = session.session_id;

        for i in 0..5 {
            store.append(&id, ChatMessage::user(format!("m{i}"))).unwrap();
        }

        let history = store.history(&id, 10).unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3"]);

        let limited = store.history(&id, 2).unwrap();
        let contents: Vec<&str> = limited.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);

        assert!(store.history(&id, 0).unwrap().is_empty());
    }

    #[test]
    fn test_history_of_empty_session() {
        let store = SessionStore::new();
        let session = store.get_or_create(None, GraphId::new()).unwrap();
        assert!(store.history(&session.session_id, 5).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_session_errors() {
        let store = SessionStore::new();
        let id = SessionId::new();
        assert!(matches!(store.get(&id), Err(RagError::SessionNotFound(_))));
        assert!(matches!(store.delete(&id), Err(RagError::SessionNotFound(_))));
        assert!(matches!(store.clear(&id), Err(RagError::SessionNotFound(_))));
        assert!(matches!(
            store.append(&id, ChatMessage::user("hi")),
            Err(RagError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_list_filters_by_graph_newest_first() {
        let store = SessionStore::new();
        let graph_a = GraphId::new();
        let graph_b = GraphId::new();

        let older = store.get_or_create(None, graph_a).unwrap();
        let newer = store.get_or_create(None, graph_a).unwrap();
        store.get_or_create(None, graph_b).unwrap();

        let mut late = ChatMessage::user("later");
        late.timestamp = Utc::now() + Duration::seconds(60);
        store.append(&older.session_id, late).unwrap();

        let listed = store.list(Some(graph_a));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, older.session_id);
        assert_eq!(listed[1].session_id, newer.session_id);
        assert_eq!(store.list(None).len(), 3);
    }

    #[test]
    fn test_clear_export_and_remove_for_graph() {
        let store = SessionStore::new();
        let graph = GraphId::new();
        let session = store.get_or_create(None, graph).unwrap();
        let id = session.session_id;
        store.append(&id, ChatMessage::user("q")).unwrap();
        store.append(&id, ChatMessage::assistant("a")).unwrap();

        let export = store.export(&id).unwrap();
        assert_eq!(export.messages.len(), 2);
        assert_eq!(export.graph_id, graph);
        assert!(export.exported_at >= export.created_at);

        store.clear(&id).unwrap();
        assert!(store.get(&id).unwrap().messages.is_empty());

        store.get_or_create(None, GraphId::new()).unwrap();
        assert_eq!(store.remove_for_graph(&graph), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&id).is_err());
    }
}

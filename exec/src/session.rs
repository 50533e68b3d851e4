//! Session resolution (§4.6 step 2): a priority chain that always ends with
//! a definite, active session ID — supplied directly, inherited from a file
//! reference, matched by entity, or freshly created.

use cellbox_protocol::http::{ExecRequest, FileRefRequest};
use cellbox_protocol::{Session, SessionId};
use cellbox_store::SessionStore;

use crate::error::Result;

pub async fn resolve_session(store: &SessionStore, request: &ExecRequest) -> Result<SessionId> {
    if let Some(session_id) = &request.session_id {
        if let Some(session) = store.get(session_id).await? {
            if session.is_active() {
                return touch_and_return(store, session).await;
            }
        }
    }

    if let Some(from_files) = resolve_from_files(store, &request.files).await? {
        return Ok(from_files);
    }

    if let Some(entity_id) = &request.entity_id {
        if let Some(session_id) = resolve_by_entity(store, entity_id).await? {
            return Ok(session_id);
        }
    }

    let mut session = Session::new(SessionId::new());
    if let Some(entity_id) = &request.entity_id {
        session.metadata.insert("entity_id".to_string(), entity_id.clone());
    }
    if let Some(user_id) = &request.user_id {
        session.metadata.insert("user_id".to_string(), user_id.clone());
    }
    store.put(&session).await?;
    Ok(session.id)
}

/// Bumps `last_activity_at` and persists it before handing the ID back, so
/// the external TTL sweeper sees this execution reflected (§3 Session:
/// "a creation time, a last-activity time").
async fn touch_and_return(store: &SessionStore, mut session: Session) -> Result<SessionId> {
    session.touch();
    let id = session.id.clone();
    store.put(&session).await?;
    Ok(id)
}

async fn resolve_from_files(store: &SessionStore, files: &Option<Vec<FileRefRequest>>) -> Result<Option<SessionId>> {
    let Some(files) = files else {
        return Ok(None);
    };
    for file in files {
        if let Some(session) = store.get(&file.session_id).await? {
            if session.is_active() {
                return touch_and_return(store, session).await.map(Some);
            }
        }
    }
    Ok(None)
}

/// Scans the active-session index for the newest session whose metadata
/// names this entity. The core has no secondary entity index, so this is a
/// linear scan over `sessions:index` — acceptable at the session volumes a
/// single replica holds in memory.
async fn resolve_by_entity(store: &SessionStore, entity_id: &str) -> Result<Option<SessionId>> {
    let mut newest: Option<Session> = None;
    for id in store.list_indexed_ids().await? {
        let Ok(session_id) = id.parse::<SessionId>() else {
            continue;
        };
        let Some(session) = store.get(&session_id).await? else {
            continue;
        };
        if !session.is_active() {
            continue;
        }
        if session.metadata.get("entity_id").map(|s| s.as_str()) != Some(entity_id) {
            continue;
        }
        if newest.as_ref().is_none_or(|current| session.created_at > current.created_at) {
            newest = Some(session);
        }
    }
    match newest {
        Some(session) => touch_and_return(store, session).await.map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellbox_store::InMemoryHotStore;
    use std::sync::Arc;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(InMemoryHotStore::new()))
    }

    fn request() -> ExecRequest {
        ExecRequest {
            code: "print(1)".to_string(),
            lang: "py".to_string(),
            session_id: None,
            entity_id: None,
            user_id: None,
            files: None,
            args: None,
        }
    }

    #[tokio::test]
    async fn no_hints_creates_a_fresh_session() {
        let store = store();
        let id = resolve_session(&store, &request()).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn explicit_active_session_id_is_reused() {
        let store = store();
        let session = Session::new(SessionId::new());
        store.put(&session).await.unwrap();

        let mut req = request();
        req.session_id = Some(session.id.clone());
        let resolved = resolve_session(&store, &req).await.unwrap();
        assert_eq!(resolved, session.id);
    }

    #[tokio::test]
    async fn entity_match_picks_the_newest_active_session() {
        let store = store();
        let mut older = Session::new(SessionId::new());
        older.metadata.insert("entity_id".to_string(), "agent-1".to_string());
        store.put(&older).await.unwrap();

        let mut req = request();
        req.entity_id = Some("agent-1".to_string());
        let resolved = resolve_session(&store, &req).await.unwrap();
        assert_eq!(resolved, older.id);
    }
}

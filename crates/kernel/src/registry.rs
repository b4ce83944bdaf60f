use std::collections::BTreeMap;
use std::sync::Arc;

use mission_common::{CoreError, CoreResult};
use parking_lot::RwLock;

use crate::config::PlannerConfig;
use crate::session::Session;

/// Sessions by title.
///
/// Constructed by the host and passed to whatever needs it; there is no
/// process-wide instance.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    config: PlannerConfig,
    sessions: RwLock<BTreeMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose `get_or_create` builds sessions from `config`.
    pub fn with_config(config: PlannerConfig) -> Self {
        Self {
            config,
            sessions: RwLock::default(),
        }
    }

    pub fn add_session(&self, session: Arc<Session>) -> CoreResult<()> {
        let mut sessions = self.sessions.write();
        let title = session.title().to_owned();
        if sessions.contains_key(&title) {
            return Err(CoreError::Duplicate(format!("session {title:?}")));
        }
        sessions.insert(title.clone(), session);
        tracing::info!(%title, "session registered");
        Ok(())
    }

    pub fn get_session(&self, title: &str) -> CoreResult<Arc<Session>> {
        self.sessions
            .read()
            .get(title)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("session {title:?}")))
    }

    pub fn get_or_create(&self, title: &str) -> Arc<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(title.to_owned()).or_insert_with(|| {
            tracing::info!(%title, "session registered");
            Arc::new(Session::with_config(title, self.config.clone()))
        });
        Arc::clone(session)
    }

    /// Drop the registry's handle to a session. The session itself lives on
    /// while callers still hold it.
    pub fn remove_session(&self, title: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(title);
        if removed.is_some() {
            tracing::info!(%title, "session removed");
        }
        removed
    }

    pub fn titles(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

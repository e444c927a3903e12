//! Session-scoped storage for the window scope.
//!
//! Each container session owns exactly one [`WindowIdHolder`], one
//! [`WindowBeanHolder`] and one [`ClientWindowConfig`]. They are created on
//! first access and torn down by [`SessionRegistry::end_session`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::client_window::ClientWindowConfig;
use crate::config::Config;
use crate::container::SessionHolders;
use crate::error::Result;
use crate::window_bean_holder::WindowBeanHolder;
use crate::window_id::SessionId;
use crate::window_id_holder::WindowIdHolder;

/// Window scope state of one session.
#[derive(Debug)]
pub struct SessionStorage {
    id_holder: Arc<WindowIdHolder>,
    bean_holder: Arc<WindowBeanHolder>,
    client_window: Arc<ClientWindowConfig>,
}

impl SessionStorage {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            id_holder: Arc::new(WindowIdHolder::new(config.window.max_count)),
            bean_holder: Arc::new(WindowBeanHolder::new(config.window.max_count)),
            client_window: Arc::new(ClientWindowConfig::new(
                config.client_window.clone(),
                config.project_stage,
                config.window.max_count,
            )),
        }
    }

    #[must_use]
    pub fn id_holder(&self) -> &Arc<WindowIdHolder> {
        &self.id_holder
    }

    #[must_use]
    pub fn bean_holder(&self) -> &Arc<WindowBeanHolder> {
        &self.bean_holder
    }

    #[must_use]
    pub fn client_window(&self) -> &Arc<ClientWindowConfig> {
        &self.client_window
    }

    /// Destroy every window of this session. Returns the number of instances
    /// destroyed.
    pub fn destroy(&self) -> usize {
        let destroyed = self.bean_holder.destroy_all();
        self.id_holder.clear();
        destroyed
    }
}

/// All live sessions of one deployment.
#[derive(Debug)]
pub struct SessionRegistry {
    config: Config,
    sessions: RwLock<HashMap<SessionId, Arc<SessionStorage>>>,
}

impl SessionRegistry {
    /// Registry creating session storage from `config`.
    ///
    /// `config` is expected to be validated; a zero window bound panics on
    /// first session access.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Storage for `session`, created on first access.
    pub fn storage(&self, session: &SessionId) -> Arc<SessionStorage> {
        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            if let Some(storage) = sessions.get(session) {
                return Arc::clone(storage);
            }
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(storage) = sessions.get(session) {
            return Arc::clone(storage);
        }
        let storage = Arc::new(SessionStorage::new(&self.config));
        sessions.insert(session.clone(), Arc::clone(&storage));
        tracing::debug!(session_id = %session, "Created window scope session storage");
        storage
    }

    /// Storage for `session` if it exists, without creating it.
    #[must_use]
    pub fn existing(&self, session: &SessionId) -> Option<Arc<SessionStorage>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session)
            .cloned()
    }

    /// End `session`, destroying all of its window-scoped instances. Unknown
    /// sessions destroy nothing.
    pub fn end_session(&self, session: &SessionId) -> usize {
        let storage = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session);
        let Some(storage) = storage else {
            return 0;
        };
        let destroyed = storage.destroy();
        tracing::info!(session_id = %session, destroyed, "Ended session");
        destroyed
    }

    /// Ids of live sessions, sorted.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionHolders for SessionRegistry {
    fn window_bean_holder(&self, session: &SessionId) -> Result<Arc<WindowBeanHolder>> {
        Ok(Arc::clone(self.storage(session).bean_holder()))
    }

    fn window_id_holder(&self, session: &SessionId) -> Result<Arc<WindowIdHolder>> {
        Ok(Arc::clone(self.storage(session).id_holder()))
    }

    fn client_window_config(&self, session: &SessionId) -> Result<Arc<ClientWindowConfig>> {
        Ok(Arc::clone(self.storage(session).client_window()))
    }
}

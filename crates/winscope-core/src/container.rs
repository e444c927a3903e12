//! Container integration surface.
//!
//! The window scope plugs into a dependency-injection container through two
//! lifecycle phases:
//!
//! 1. **Bean discovery**: extensions register custom contexts through
//!    [`AfterBeanDiscovery`]. Contextual lookups are not yet allowed.
//! 2. **Deployment validation**: extensions may resolve contextual references
//!    through [`BeanManager`] to finish wiring.
//!
//! [`StandaloneContainer`] is an in-process container implementing both
//! phases and the session registry, for embedders without their own.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::client_window::ClientWindowConfig;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::SessionRegistry;
use crate::window_bean_holder::WindowBeanHolder;
use crate::window_id::SessionId;
use crate::window_id_holder::WindowIdHolder;

/// Scopes a container knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Request,
    Window,
    Session,
    Application,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "request",
            Self::Window => "window",
            Self::Session => "session",
            Self::Application => "application",
        };
        f.write_str(name)
    }
}

/// A custom context registered with the container.
pub trait Context: Send + Sync {
    fn scope(&self) -> ScopeKind;

    /// Whether contextual instances can be served right now
    fn is_active(&self) -> bool;
}

/// Phase 1 event.
pub trait AfterBeanDiscovery {
    fn add_context(&mut self, context: Arc<dyn Context>);
}

/// Session-scoped holders, resolved per session.
pub trait SessionHolders: Send + Sync {
    fn window_bean_holder(&self, session: &SessionId) -> Result<Arc<WindowBeanHolder>>;

    fn window_id_holder(&self, session: &SessionId) -> Result<Arc<WindowIdHolder>>;

    fn client_window_config(&self, session: &SessionId) -> Result<Arc<ClientWindowConfig>>;
}

/// Contextual lookup, available in phase 2 and later.
pub trait BeanManager {
    fn session_holders(&self) -> Result<Arc<dyn SessionHolders>>;
}

/// A container extension observing both lifecycle phases.
pub trait Extension: Send {
    fn name(&self) -> &str;

    /// Phase 1: register contexts.
    fn after_bean_discovery(&mut self, event: &mut dyn AfterBeanDiscovery) -> Result<()>;

    /// Phase 2: resolve contextual references.
    fn after_deployment_validation(&mut self, manager: &dyn BeanManager) -> Result<()>;
}

// =============================================================================
// Standalone container
// =============================================================================

#[derive(Default)]
struct ContextRegistration {
    contexts: Vec<Arc<dyn Context>>,
}

impl AfterBeanDiscovery for ContextRegistration {
    fn add_context(&mut self, context: Arc<dyn Context>) {
        tracing::debug!(scope = %context.scope(), "Registered context");
        self.contexts.push(context);
    }
}

/// In-process container: owns the session registry and drives the extension
/// lifecycle.
pub struct StandaloneContainer {
    registry: Arc<SessionRegistry>,
    contexts: Vec<Arc<dyn Context>>,
    validated: AtomicBool,
}

impl fmt::Debug for StandaloneContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: Vec<ScopeKind> = self.contexts.iter().map(|c| c.scope()).collect();
        f.debug_struct("StandaloneContainer")
            .field("sessions", &self.registry.len())
            .field("contexts", &scopes)
            .field("validated", &self.is_validated())
            .finish()
    }
}

impl StandaloneContainer {
    /// Container with validated `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(SessionRegistry::new(config)),
            contexts: Vec::new(),
            validated: AtomicBool::new(false),
        })
    }

    /// Run both lifecycle phases for `extensions`.
    ///
    /// Every extension finishes phase 1 before any extension sees phase 2.
    /// The first failing hook aborts deployment.
    pub fn deploy(&mut self, extensions: &mut [&mut dyn Extension]) -> Result<()> {
        if self.is_validated() {
            return Err(Error::Deployment("container already deployed".to_string()));
        }

        let mut registration = ContextRegistration::default();
        for extension in extensions.iter_mut() {
            tracing::debug!(extension = extension.name(), "Running bean discovery");
            extension.after_bean_discovery(&mut registration)?;
        }
        self.contexts.extend(registration.contexts);

        self.validated.store(true, Ordering::Release);

        for extension in extensions.iter_mut() {
            tracing::debug!(extension = extension.name(), "Running deployment validation");
            extension.after_deployment_validation(&*self)?;
        }
        tracing::info!(
            extensions = extensions.len(),
            contexts = self.contexts.len(),
            "Container deployed"
        );
        Ok(())
    }

    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Registered context for `scope`, if any.
    #[must_use]
    pub fn context(&self, scope: ScopeKind) -> Option<Arc<dyn Context>> {
        self.contexts.iter().find(|c| c.scope() == scope).cloned()
    }

    /// End `session`, destroying its window-scoped instances.
    pub fn end_session(&self, session: &SessionId) -> usize {
        self.registry.end_session(session)
    }
}

impl BeanManager for StandaloneContainer {
    fn session_holders(&self) -> Result<Arc<dyn SessionHolders>> {
        if !self.is_validated() {
            return Err(Error::Deployment(
                "contextual lookup before deployment validation".to_string(),
            ));
        }
        let holders: Arc<dyn SessionHolders> = self.registry.clone();
        Ok(holders)
    }
}

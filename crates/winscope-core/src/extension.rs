//! Container extension installing the window scope.
//!
//! Phase 1 creates the [`WindowContext`] and registers it with the
//! container. Session holders are contextual references and cannot be
//! resolved yet, so the context stays inactive. Phase 2 resolves them and
//! binds them into the context.

use std::sync::Arc;

use crate::container::{AfterBeanDiscovery, BeanManager, Context, Extension};
use crate::error::{Error, Result};
use crate::window_context::WindowContext;

#[derive(Debug, Default)]
pub struct WindowScopeExtension {
    context: Option<Arc<WindowContext>>,
}

impl WindowScopeExtension {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The context created in phase 1, if bean discovery has run.
    #[must_use]
    pub fn window_context(&self) -> Option<Arc<WindowContext>> {
        self.context.clone()
    }
}

impl Extension for WindowScopeExtension {
    fn name(&self) -> &str {
        "window-scope"
    }

    fn after_bean_discovery(&mut self, event: &mut dyn AfterBeanDiscovery) -> Result<()> {
        let context = Arc::new(WindowContext::new());
        let registered: Arc<dyn Context> = context.clone();
        event.add_context(registered);
        self.context = Some(context);
        Ok(())
    }

    fn after_deployment_validation(&mut self, manager: &dyn BeanManager) -> Result<()> {
        let context = self.context.as_ref().ok_or_else(|| {
            Error::Deployment("window context was not registered during bean discovery".to_string())
        })?;
        context.init_window_context(manager.session_holders()?)?;
        tracing::info!("Window scope active");
        Ok(())
    }
}

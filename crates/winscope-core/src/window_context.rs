//! The window scope context.
//!
//! Serves window-scoped instances for the window a request belongs to. The
//! window is resolved once per request, in order:
//!
//! 1. an id explicitly activated on the request,
//! 2. the `dswid` query parameter,
//! 3. the `dspwid` form field,
//! 4. a freshly issued id.
//!
//! The context starts inactive. [`WindowContext::init_window_context`] binds
//! the session holders during deployment validation; every operation before
//! that fails with [`Error::ContextNotActive`].

use std::sync::{Arc, OnceLock};

use crate::client_window::ClientWindowRenderMode;
use crate::container::{Context, ScopeKind, SessionHolders};
use crate::contextual::{BeanId, BeanInstance, Contextual, downcast_instance};
use crate::error::{Error, Result};
use crate::request::RequestContext;
use crate::window_bean_holder::BagLookup;
use crate::window_id::{SessionId, WindowId};

/// Attempts to obtain an open bag when windows are closed concurrently.
const MAX_ACTIVATION_ATTEMPTS: usize = 8;

/// Context implementing the window scope.
#[derive(Default)]
pub struct WindowContext {
    holders: OnceLock<Arc<dyn SessionHolders>>,
}

impl std::fmt::Debug for WindowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowContext")
            .field("active", &self.is_active())
            .finish()
    }
}

impl WindowContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the session holders. Activates the scope.
    pub fn init_window_context(&self, holders: Arc<dyn SessionHolders>) -> Result<()> {
        self.holders
            .set(holders)
            .map_err(|_| Error::Deployment("window context already initialized".to_string()))?;
        tracing::debug!("Window context initialized");
        Ok(())
    }

    fn holders(&self) -> Result<&Arc<dyn SessionHolders>> {
        self.holders.get().ok_or_else(|| {
            Error::ContextNotActive("window context is not initialized".to_string())
        })
    }

    /// Window id of `request`, issuing a new one when the client sent none.
    ///
    /// Repeated calls within one request return the same id. The id becomes
    /// the session's current window; it is remembered only once it gets a
    /// bag.
    pub fn resolve_window_id(&self, request: &RequestContext<'_>) -> Result<WindowId> {
        let holders = self.holders()?;
        if let Some(id) = request.resolved_window_id() {
            return Ok(id.clone());
        }

        let id_holder = holders.window_id_holder(request.session_id())?;
        let resolved = request.resolve_with(|| {
            match request.activated().or_else(|| request.incoming_window_id()) {
                Some(id) => id,
                None => {
                    let id = id_holder.issue();
                    tracing::debug!(
                        session_id = %request.session_id(),
                        window_id = %id,
                        "Issued new window id"
                    );
                    id
                }
            }
        });
        id_holder.activate(resolved);
        Ok(resolved.clone())
    }

    /// Bind `window_id` to `request` ahead of resolution. Returns `false`
    /// when the request already resolved its window.
    pub fn activate_window(&self, request: &RequestContext<'_>, window_id: WindowId) -> Result<bool> {
        let holders = self.holders()?;
        if !request.set_activated(window_id.clone()) {
            tracing::debug!(
                session_id = %request.session_id(),
                window_id = %window_id,
                "Window activation ignored after resolution"
            );
            return Ok(false);
        }
        holders
            .window_id_holder(request.session_id())?
            .activate(&window_id);
        Ok(true)
    }

    /// Window of `request` if known, without issuing a new id.
    pub fn current_window_id(&self, request: &RequestContext<'_>) -> Result<Option<WindowId>> {
        self.holders()?;
        Ok(request
            .resolved_window_id()
            .cloned()
            .or_else(|| request.activated())
            .or_else(|| request.incoming_window_id()))
    }

    /// Existing instance of `bean_id` in the request's window. Marks the
    /// window as used.
    pub fn get(&self, request: &RequestContext<'_>, bean_id: &BeanId) -> Result<Option<BeanInstance>> {
        let window_id = self.resolve_window_id(request)?;
        let bean_holder = self.holders()?.window_bean_holder(request.session_id())?;
        if !bean_holder.touch(&window_id) {
            return Ok(None);
        }
        Ok(bean_holder
            .bag(&window_id)
            .and_then(|bag| bag.get(bean_id)))
    }

    /// Instance of `bean` in the request's window, created on first access.
    ///
    /// Activating a new window may evict the least recently used one; its
    /// instances are destroyed before this returns.
    pub fn get_or_create(
        &self,
        request: &RequestContext<'_>,
        bean: &Arc<dyn Contextual>,
    ) -> Result<BeanInstance> {
        let window_id = self.resolve_window_id(request)?;
        let holders = self.holders()?;
        let session = request.session_id();
        let bean_holder = holders.window_bean_holder(session)?;
        let id_holder = holders.window_id_holder(session)?;

        for _ in 0..MAX_ACTIVATION_ATTEMPTS {
            let activation = bean_holder.activate(&window_id);
            if activation.created {
                id_holder.remember(&window_id);
            }
            for evicted in &activation.evicted {
                id_holder.forget(evicted);
            }

            match activation.bag.get_or_create(bean)? {
                BagLookup::Found(instance) | BagLookup::Created(instance) => return Ok(instance),
                BagLookup::Closed => {
                    tracing::debug!(
                        session_id = %session,
                        window_id = %window_id,
                        bean_id = %bean.id(),
                        "Window closed during lookup, reactivating"
                    );
                }
            }
        }
        Err(Error::ContextNotActive(format!(
            "window {window_id} kept closing during lookup of {}",
            bean.id()
        )))
    }

    /// Typed [`WindowContext::get_or_create`].
    pub fn get_or_create_typed<T: Send + Sync + 'static>(
        &self,
        request: &RequestContext<'_>,
        bean: &Arc<dyn Contextual>,
    ) -> Result<Arc<T>> {
        let instance = self.get_or_create(request, bean)?;
        downcast_instance::<T>(bean.id(), instance)
    }

    /// Destroy the instance of `bean_id` in the request's window, if any.
    pub fn destroy(&self, request: &RequestContext<'_>, bean_id: &BeanId) -> Result<bool> {
        let window_id = self.resolve_window_id(request)?;
        let bean_holder = self.holders()?.window_bean_holder(request.session_id())?;
        Ok(bean_holder
            .bag(&window_id)
            .is_some_and(|bag| bag.remove(bean_id)))
    }

    /// Close `window_id` in `session`, destroying its instances. Unknown or
    /// already closed windows are a no-op returning `false`.
    pub fn close_window(&self, session: &SessionId, window_id: &WindowId) -> Result<bool> {
        let holders = self.holders()?;
        let span = crate::window_span!("close_window", session_id = %session, window_id = %window_id);
        let _guard = span.enter();

        let closed = holders.window_bean_holder(session)?.close_window(window_id);
        holders.window_id_holder(session)?.forget(window_id);
        if !closed {
            tracing::debug!("Close of unknown window ignored");
        }
        Ok(closed)
    }

    /// Windows of `session`, least recently used first.
    pub fn active_window_ids(&self, session: &SessionId) -> Result<Vec<WindowId>> {
        Ok(self.holders()?.window_bean_holder(session)?.window_ids())
    }

    /// Render mode for the request's client.
    pub fn render_mode(&self, request: &RequestContext<'_>) -> Result<ClientWindowRenderMode> {
        let config = self
            .holders()?
            .client_window_config(request.session_id())?;
        Ok(config.render_mode(request.request()))
    }
}

impl Context for WindowContext {
    fn scope(&self) -> ScopeKind {
        ScopeKind::Window
    }

    fn is_active(&self) -> bool {
        self.holders.get().is_some()
    }
}

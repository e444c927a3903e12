//! User messages that survive a redirect within the same window.
//!
//! Messages produced while handling a request are stored in a window-scoped
//! bean and drained by the next request of that window. When the scope is
//! not active the caller gets the messages back to hand them to another
//! mechanism.

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use serde::{Deserialize, Serialize};

use crate::contextual::{Contextual, FnBean};
use crate::error::{Error, Result};
use crate::request::RequestContext;
use crate::window_context::WindowContext;

/// Bean id of the per-window message store.
pub const WINDOW_MESSAGES_BEAN: &str = "winscope.window-messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// One user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    /// Component the message is attached to; `None` for global messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MessageEntry {
    #[must_use]
    pub fn new(severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            component_id: None,
            severity,
            summary: summary.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn for_component(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Window-scoped message store.
#[derive(Debug, Default)]
pub struct WindowMessages {
    entries: Mutex<Vec<MessageEntry>>,
}

impl WindowMessages {
    fn replace(&self, messages: Vec<MessageEntry>) {
        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = messages;
    }

    fn drain(&self) -> Vec<MessageEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static WINDOW_MESSAGES: LazyLock<Arc<dyn Contextual>> = LazyLock::new(|| {
    Arc::new(FnBean::new(WINDOW_MESSAGES_BEAN, |_| {
        Ok(WindowMessages::default())
    }))
});

/// Bean definition of the per-window message store.
#[must_use]
pub fn window_messages_bean() -> Arc<dyn Contextual> {
    Arc::clone(&WINDOW_MESSAGES)
}

/// Result of [`save_messages`].
#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Stored in the request's window
    Stored(usize),
    /// Retention is disabled; nothing was kept
    Skipped,
    /// The window scope is not active; the messages are handed back
    NotStored(Vec<MessageEntry>),
}

/// Keep `messages` for the next request of the same window, replacing any
/// previously stored ones.
pub fn save_messages(
    context: &WindowContext,
    request: &RequestContext<'_>,
    messages: Vec<MessageEntry>,
    keep: bool,
) -> Result<SaveOutcome> {
    if !keep {
        return Ok(SaveOutcome::Skipped);
    }
    let store = match context.get_or_create_typed::<WindowMessages>(request, &window_messages_bean()) {
        Ok(store) => store,
        Err(Error::ContextNotActive(reason)) => {
            tracing::debug!(%reason, "Window scope inactive, messages not stored");
            return Ok(SaveOutcome::NotStored(messages));
        }
        Err(err) => return Err(err),
    };
    let count = messages.len();
    store.replace(messages);
    Ok(SaveOutcome::Stored(count))
}

/// Take the messages stored for the request's window. An inactive scope or
/// disabled retention yields nothing.
pub fn restore_messages(
    context: &WindowContext,
    request: &RequestContext<'_>,
    keep: bool,
) -> Result<Vec<MessageEntry>> {
    if !keep {
        return Ok(Vec::new());
    }
    match context.get_or_create_typed::<WindowMessages>(request, &window_messages_bean()) {
        Ok(store) => Ok(store.drain()),
        Err(Error::ContextNotActive(_)) => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

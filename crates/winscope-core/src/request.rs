//! Request-side collaborator: parameters, headers and cookies of the current
//! HTTP request, plus the per-request [`RequestContext`] the window scope
//! works against.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::window_id::{SessionId, WindowId};

/// Query parameter carrying the window id on links and redirects.
pub const WINDOW_ID_PARAMETER: &str = "dswid";

/// Hidden form field carrying the window id on POST requests.
pub const POST_WINDOW_ID_PARAMETER: &str = "dspwid";

/// Cookie set when the client followed the no-script fallback link.
/// Its value is parsed as "script enabled" (`"false"` disables scripts).
pub const NO_SCRIPT_COOKIE: &str = "deltaspikeNoScriptEnabled";

/// Header consulted for crawler detection.
pub const USER_AGENT_HEADER: &str = "User-Agent";

/// Read access to an incoming HTTP request.
pub trait ClientRequest: Send + Sync {
    /// First value of a query or form parameter
    fn parameter(&self, name: &str) -> Option<&str>;

    /// First value of a request header (case-insensitive name)
    fn header(&self, name: &str) -> Option<&str>;

    /// Value of a request cookie
    fn cookie(&self, name: &str) -> Option<&str>;
}

/// Owned request used by tests, the CLI and embedders without their own
/// request type.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    parameters: HashMap<String, String>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl HttpRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_header(USER_AGENT_HEADER, user_agent)
    }
}

impl ClientRequest for HttpRequest {
    fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// One unit of work: the session the request belongs to, the request
/// itself, and the window id resolved for it.
///
/// The resolved id is computed at most once per context, which makes window
/// resolution idempotent within a request.
pub struct RequestContext<'r> {
    session_id: SessionId,
    request: &'r dyn ClientRequest,
    activated: Mutex<Option<WindowId>>,
    resolved: OnceLock<WindowId>,
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("session_id", &self.session_id)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

impl<'r> RequestContext<'r> {
    #[must_use]
    pub fn new(session_id: SessionId, request: &'r dyn ClientRequest) -> Self {
        Self {
            session_id,
            request,
            activated: Mutex::new(None),
            resolved: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn request(&self) -> &'r dyn ClientRequest {
        self.request
    }

    /// Window id carried by the request itself: the `dswid` query parameter,
    /// then the `dspwid` form field. Invalid values are ignored.
    #[must_use]
    pub fn incoming_window_id(&self) -> Option<WindowId> {
        [WINDOW_ID_PARAMETER, POST_WINDOW_ID_PARAMETER]
            .iter()
            .filter_map(|name| self.request.parameter(name))
            .find_map(|raw| {
                let parsed = WindowId::parse(raw);
                if parsed.is_none() {
                    tracing::debug!(
                        session_id = %self.session_id,
                        len = raw.len(),
                        "Ignoring malformed window id from client"
                    );
                }
                parsed
            })
    }

    /// Bind `window_id` to this request ahead of resolution.
    ///
    /// Has no effect once the window id has been resolved.
    pub(crate) fn set_activated(&self, window_id: WindowId) -> bool {
        if self.resolved.get().is_some() {
            return false;
        }
        let mut guard = self.activated.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(window_id);
        true
    }

    pub(crate) fn activated(&self) -> Option<WindowId> {
        self.activated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    #[must_use]
    pub fn resolved_window_id(&self) -> Option<&WindowId> {
        self.resolved.get()
    }

    pub(crate) fn resolve_with(&self, f: impl FnOnce() -> WindowId) -> &WindowId {
        self.resolved.get_or_init(f)
    }
}

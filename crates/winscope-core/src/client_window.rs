//! Client window render-mode policy.
//!
//! Decides per request how (or whether) the window id reaches the client.
//! Interactive browsers get the id embedded in links and forms; crawlers and
//! clients without script support get [`ClientWindowRenderMode::None`] so
//! bookmarks and indexed URLs stay free of window ids.
//!
//! | Client | Mode |
//! |--------|------|
//! | user agent contains `bot`, `Bot`, `Slurp`, `Crawler` | None |
//! | script disabled (no-script cookie) | configured Delegated, else None |
//! | otherwise | configured default, else Lazy |
//!
//! Detection results are cached per session in [`ClientWindowConfig`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, LazyLock, Mutex, OnceLock, RwLock};

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};

use crate::config::{ClientWindowSettings, ProjectStage};
use crate::error::Result;
use crate::request::{ClientRequest, NO_SCRIPT_COOKIE, USER_AGENT_HEADER};

/// Built-in window handler page.
pub const DEFAULT_WINDOW_HANDLER_HTML: &str = include_str!("../static/windowhandler.html");

/// Case-sensitive user agent markers of known crawlers.
pub const CRAWLER_MARKERS: [&str; 4] = ["bot", "Bot", "Slurp", "Crawler"];

static CRAWLER_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(CRAWLER_MARKERS).expect("crawler markers are valid literals")
});

/// Whether `user_agent` belongs to a known crawler.
#[must_use]
pub fn is_crawler(user_agent: &str) -> bool {
    CRAWLER_MATCHER.is_match(user_agent)
}

/// How the window id is propagated to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientWindowRenderMode {
    /// Never embed the window id
    None,
    /// Embed the id in links and forms; the client script verifies it lazily
    Lazy,
    /// Always render the window handler page first to obtain an id
    ClientWindow,
    /// Leave window handling to client-side script
    Delegated,
}

impl fmt::Display for ClientWindowRenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Lazy => "lazy",
            Self::ClientWindow => "client_window",
            Self::Delegated => "delegated",
        };
        f.write_str(name)
    }
}

impl FromStr for ClientWindowRenderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "lazy" => Ok(Self::Lazy),
            "client_window" | "clientwindow" => Ok(Self::ClientWindow),
            "delegated" => Ok(Self::Delegated),
            _ => Err(format!("unknown render mode: {s}")),
        }
    }
}

/// Per-session client window detection state.
pub struct ClientWindowConfig {
    settings: ClientWindowSettings,
    project_stage: ProjectStage,
    max_window_count: usize,
    javascript_enabled: RwLock<Option<bool>>,
    user_agent: OnceLock<String>,
    handler_html: Mutex<Option<Arc<str>>>,
}

impl fmt::Debug for ClientWindowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientWindowConfig")
            .field("settings", &self.settings)
            .field("project_stage", &self.project_stage)
            .field("max_window_count", &self.max_window_count)
            .field("user_agent", &self.user_agent.get())
            .finish()
    }
}

impl ClientWindowConfig {
    #[must_use]
    pub fn new(
        settings: ClientWindowSettings,
        project_stage: ProjectStage,
        max_window_count: usize,
    ) -> Self {
        Self {
            settings,
            project_stage,
            max_window_count,
            javascript_enabled: RwLock::new(None),
            user_agent: OnceLock::new(),
            handler_html: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ClientWindowSettings {
        &self.settings
    }

    #[must_use]
    pub fn max_window_count(&self) -> usize {
        self.max_window_count
    }

    /// Whether the client runs scripts. Read once from the no-script cookie;
    /// a missing or unparsable cookie means enabled.
    pub fn is_javascript_enabled(&self, request: &dyn ClientRequest) -> bool {
        if let Some(enabled) = *self
            .javascript_enabled
            .read()
            .unwrap_or_else(|e| e.into_inner())
        {
            return enabled;
        }

        let mut guard = self
            .javascript_enabled
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(enabled) = *guard {
            return enabled;
        }
        let enabled = request
            .cookie(NO_SCRIPT_COOKIE)
            .map_or(true, |value| !value.trim().eq_ignore_ascii_case("false"));
        *guard = Some(enabled);
        enabled
    }

    /// Override the detected script support (the no-script link handler
    /// calls this).
    pub fn set_javascript_enabled(&self, enabled: bool) {
        let mut guard = self
            .javascript_enabled
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(enabled);
    }

    /// User agent of the first request that sent one; it cannot change
    /// within a session. Requests without the header leave it unset.
    pub fn user_agent(&self, request: &dyn ClientRequest) -> Option<String> {
        if let Some(cached) = self.user_agent.get() {
            return Some(cached.clone());
        }
        let header = request.header(USER_AGENT_HEADER)?;
        Some(self.user_agent.get_or_init(|| header.to_string()).clone())
    }

    /// Render mode for `request`.
    pub fn render_mode(&self, request: &dyn ClientRequest) -> ClientWindowRenderMode {
        if self.user_agent(request).as_deref().is_some_and(is_crawler) {
            return ClientWindowRenderMode::None;
        }

        if !self.is_javascript_enabled(request) {
            return match self.settings.default_render_mode {
                Some(ClientWindowRenderMode::Delegated) => ClientWindowRenderMode::Delegated,
                _ => ClientWindowRenderMode::None,
            };
        }

        self.settings
            .default_render_mode
            .unwrap_or(ClientWindowRenderMode::Lazy)
    }

    /// Window handler HTML page. Cached for the session except in the
    /// Development stage, where the file is re-read on every call.
    pub fn client_window_html(&self) -> Result<Arc<str>> {
        let cache = !self.project_stage.is_development();
        if cache {
            let guard = self.handler_html.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(html) = guard.as_ref() {
                return Ok(Arc::clone(html));
            }
        }

        let html: Arc<str> = match &self.settings.handler_html {
            Some(path) => Arc::from(read_handler_html(path)?),
            None => Arc::from(DEFAULT_WINDOW_HANDLER_HTML),
        };

        if cache {
            let mut guard = self.handler_html.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Some(Arc::clone(&html));
        }
        Ok(html)
    }
}

fn read_handler_html(path: &Path) -> Result<String> {
    let html = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), bytes = html.len(), "Loaded window handler page");
    Ok(html)
}

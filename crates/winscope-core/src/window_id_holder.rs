//! Per-session registry of window ids.
//!
//! Tracks the ids of windows that own a bean bag and the window most
//! recently activated by a request. Ids that were only resolved never enter
//! the known set, and the set never holds more than the session's window
//! bound, so client-supplied ids cannot grow it.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use lru::LruCache;

use crate::config::DEFAULT_MAX_WINDOW_COUNT;
use crate::window_id::WindowId;

#[derive(Debug)]
struct IdState {
    /// Known ids; never promoted, so the LRU end is the oldest.
    known: LruCache<WindowId, ()>,
    current: Option<WindowId>,
}

/// Window ids of one session.
#[derive(Debug)]
pub struct WindowIdHolder {
    state: RwLock<IdState>,
}

impl Default for WindowIdHolder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WINDOW_COUNT)
    }
}

impl WindowIdHolder {
    /// Holder remembering at most `max_known` ids; a zero bound is treated
    /// as one.
    #[must_use]
    pub fn new(max_known: usize) -> Self {
        let capacity = NonZeroUsize::new(max_known).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: RwLock::new(IdState {
                known: LruCache::new(capacity),
                current: None,
            }),
        }
    }

    /// Generate an id distinct from every window this session tracks.
    ///
    /// The id is not remembered until its window gets a bag.
    pub fn issue(&self) -> WindowId {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        loop {
            let candidate = WindowId::generate();
            if !state.known.contains(&candidate) && state.current.as_ref() != Some(&candidate) {
                return candidate;
            }
        }
    }

    /// Record the id of a window that now owns a bag. Returns `true` when it
    /// was new. The oldest id is dropped once the bound is reached.
    pub fn remember(&self, window_id: &WindowId) -> bool {
        {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            if state.known.contains(window_id) {
                return false;
            }
        }
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.known.contains(window_id) {
            return false;
        }
        if let Some((dropped, _)) = state.known.push(window_id.clone(), ()) {
            tracing::trace!(window_id = %dropped, "Window id dropped from known set");
        }
        true
    }

    /// Mark `window_id` as the most recently activated window.
    pub fn activate(&self, window_id: &WindowId) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.current = Some(window_id.clone());
    }

    /// Most recently activated window, cleared when that window goes away.
    #[must_use]
    pub fn current(&self) -> Option<WindowId> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .current
            .clone()
    }

    /// Forget a closed or evicted window.
    pub fn forget(&self, window_id: &WindowId) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.current.as_ref() == Some(window_id) {
            state.current = None;
        }
        state.known.pop(window_id).is_some()
    }

    #[must_use]
    pub fn is_known(&self, window_id: &WindowId) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .known
            .contains(window_id)
    }

    /// Known ids in first-seen order.
    #[must_use]
    pub fn known_ids(&self) -> Vec<WindowId> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .known
            .iter()
            .rev()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Forget everything (session end).
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.known.clear();
        state.current = None;
    }
}

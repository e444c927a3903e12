//! Per-session window storage with a bounded LRU eviction policy.
//!
//! A [`WindowBeanHolder`] maps each window id of one session to a
//! [`BeanBag`], the set of window-scoped instances created in that window.
//! At most `max_window_count` windows are tracked; when a newly activated
//! window exceeds the bound, the least-recently-used windows are evicted and
//! every instance in their bags is destroyed before the activation returns.
//!
//! # Locking
//!
//! - The window table (recency list + bag handles) sits behind one short
//!   session-wide lock, held only for lookups and structural changes.
//! - Each bag has its own lock for its slot table, so requests in different
//!   windows never contend beyond the table lookup.
//! - Each bean gets a slot with its own lock. Creation runs under the slot
//!   lock only, so a factory may resolve other beans of the same window.
//!   A factory that resolves its own bean deadlocks (circular dependency).
//! - Destruction callbacks always run with no holder lock held.
//! - A lookup re-checks its slot after taking the slot lock. A slot that was
//!   removed or drained meanwhile is left to whoever detached it, and the
//!   lookup retries against the live table.
//! - A bag created by an activation that evicts serves no lookups until the
//!   evicted windows are destroyed, even to other requests that find it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use lru::LruCache;
use serde::Serialize;

use crate::contextual::{BeanId, BeanInstance, Contextual, ContextualInstanceEntry};
use crate::error::Result;
use crate::window_id::WindowId;

type Slot = Arc<Mutex<Option<ContextualInstanceEntry>>>;

// =============================================================================
// Bean bag
// =============================================================================

struct BagState {
    slots: HashMap<BeanId, Slot>,
    closed: bool,
    /// Lookups wait until set
    ready: bool,
}

/// Where a locked slot stands relative to its bag.
enum SlotStatus {
    Live,
    Detached,
    Closed,
}

/// Outcome of a lookup-or-create against one bag.
#[derive(Debug)]
pub enum BagLookup {
    /// An existing instance was returned
    Found(BeanInstance),
    /// The factory ran and its instance was stored
    Created(BeanInstance),
    /// The bag was destroyed concurrently; re-activate the window and retry
    Closed,
}

/// Window-scoped instances of one window.
pub struct BeanBag {
    window_id: WindowId,
    state: Mutex<BagState>,
    ready_changed: Condvar,
}

impl std::fmt::Debug for BeanBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanBag")
            .field("window_id", &self.window_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BeanBag {
    fn new(window_id: WindowId, ready: bool) -> Self {
        Self {
            window_id,
            state: Mutex::new(BagState {
                slots: HashMap::new(),
                closed: false,
                ready,
            }),
            ready_changed: Condvar::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BagState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_ready(&self) -> MutexGuard<'_, BagState> {
        self.ready_changed
            .wait_while(self.lock_state(), |state| !state.ready && !state.closed)
            .unwrap_or_else(|e| e.into_inner())
    }

    fn mark_ready(&self) {
        self.lock_state().ready = true;
        self.ready_changed.notify_all();
    }

    fn slot_status(&self, bean_id: &BeanId, slot: &Slot) -> SlotStatus {
        let state = self.lock_state();
        if state.closed {
            return SlotStatus::Closed;
        }
        match state.slots.get(bean_id) {
            Some(mapped) if Arc::ptr_eq(mapped, slot) => SlotStatus::Live,
            _ => SlotStatus::Detached,
        }
    }

    #[must_use]
    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    fn slots(&self) -> Vec<(BeanId, Slot)> {
        let state = self.lock_state();
        state
            .slots
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect()
    }

    /// Number of live instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots()
            .iter()
            .filter(|(_, slot)| slot.lock().unwrap_or_else(|e| e.into_inner()).is_some())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of beans with a live instance, sorted.
    #[must_use]
    pub fn bean_ids(&self) -> Vec<BeanId> {
        let mut ids: Vec<BeanId> = self
            .slots()
            .into_iter()
            .filter(|(_, slot)| slot.lock().unwrap_or_else(|e| e.into_inner()).is_some())
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Existing instance for `bean_id`, if any.
    #[must_use]
    pub fn get(&self, bean_id: &BeanId) -> Option<BeanInstance> {
        let slot = {
            let state = self.lock_state();
            if state.closed {
                return None;
            }
            Arc::clone(state.slots.get(bean_id)?)
        };
        let guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(ContextualInstanceEntry::instance)
    }

    /// Return the instance for `bean`, creating it on first access.
    ///
    /// Reports [`BagLookup::Closed`] when the bag is destroyed before or
    /// during creation; an instance created meanwhile is destroyed with the
    /// bag.
    pub fn get_or_create(&self, bean: &Arc<dyn Contextual>) -> Result<BagLookup> {
        loop {
            let slot = {
                let mut state = self.wait_ready();
                if state.closed {
                    return Ok(BagLookup::Closed);
                }
                Arc::clone(state.slots.entry(bean.id().clone()).or_default())
            };

            let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            match self.slot_status(bean.id(), &slot) {
                SlotStatus::Live => {}
                SlotStatus::Detached => continue,
                SlotStatus::Closed => return Ok(BagLookup::Closed),
            }
            if let Some(entry) = guard.as_ref() {
                return Ok(BagLookup::Found(entry.instance()));
            }

            let entry = ContextualInstanceEntry::create(Arc::clone(bean))?;
            let instance = entry.instance();
            *guard = Some(entry);
            // A detached slot is queued for destruction; its new entry goes
            // with it.
            match self.slot_status(bean.id(), &slot) {
                SlotStatus::Live => {
                    tracing::debug!(window_id = %self.window_id, bean_id = %bean.id(), "Created window-scoped instance");
                    return Ok(BagLookup::Created(instance));
                }
                SlotStatus::Detached => {
                    tracing::debug!(window_id = %self.window_id, bean_id = %bean.id(), "Instance removed during creation, retrying");
                }
                SlotStatus::Closed => return Ok(BagLookup::Closed),
            }
        }
    }

    /// Remove and destroy a single instance. Returns whether one existed.
    pub fn remove(&self, bean_id: &BeanId) -> bool {
        let slot = {
            let mut state = self.lock_state();
            match state.slots.remove(bean_id) {
                Some(slot) => slot,
                None => return false,
            }
        };
        let entry = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        match entry {
            Some(entry) => {
                entry.destroy();
                true
            }
            None => false,
        }
    }

    /// Close the bag and destroy every instance in it. Returns the number of
    /// instances destroyed; a second call destroys nothing.
    pub fn destroy(&self) -> usize {
        let slots: Vec<Slot> = {
            let mut state = self.lock_state();
            state.closed = true;
            state.slots.drain().map(|(_, slot)| slot).collect()
        };
        self.ready_changed.notify_all();

        let mut destroyed = 0;
        for slot in slots {
            // Waits for an in-flight creation on this slot to finish.
            let entry = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
            if let Some(entry) = entry {
                entry.destroy();
                destroyed += 1;
            }
        }
        destroyed
    }
}

/// Opens a pending bag on drop, also when a destroy callback unwinds.
struct OpenOnDrop<'a>(&'a BeanBag);

impl Drop for OpenOnDrop<'_> {
    fn drop(&mut self) {
        self.0.mark_ready();
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters for one holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HolderStats {
    pub windows_created: u64,
    pub windows_evicted: u64,
    pub windows_closed: u64,
    pub instances_destroyed: u64,
}

#[derive(Debug, Default)]
struct AtomicStats {
    windows_created: AtomicU64,
    windows_evicted: AtomicU64,
    windows_closed: AtomicU64,
    instances_destroyed: AtomicU64,
}

impl AtomicStats {
    fn snapshot(&self) -> HolderStats {
        HolderStats {
            windows_created: self.windows_created.load(Ordering::Relaxed),
            windows_evicted: self.windows_evicted.load(Ordering::Relaxed),
            windows_closed: self.windows_closed.load(Ordering::Relaxed),
            instances_destroyed: self.instances_destroyed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Window bean holder
// =============================================================================

/// Result of [`WindowBeanHolder::activate`].
#[derive(Debug)]
pub struct Activation {
    /// Bag of the activated window
    pub bag: Arc<BeanBag>,
    /// Whether the window was new to this holder
    pub created: bool,
    /// Windows evicted (and already destroyed) to make room
    pub evicted: Vec<WindowId>,
}

/// Window id → bag mapping for one session, bounded by `max_window_count`.
pub struct WindowBeanHolder {
    max_window_count: usize,
    windows: Mutex<LruCache<WindowId, Arc<BeanBag>>>,
    stats: AtomicStats,
}

impl std::fmt::Debug for WindowBeanHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowBeanHolder")
            .field("max_window_count", &self.max_window_count)
            .field("size", &self.size())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl WindowBeanHolder {
    /// Create a holder tracking at most `max_window_count` windows.
    ///
    /// # Panics
    /// Panics if `max_window_count` is 0; configuration validation rejects it
    /// earlier.
    #[must_use]
    pub fn new(max_window_count: usize) -> Self {
        assert!(max_window_count > 0, "max_window_count must be > 0");
        Self {
            max_window_count,
            windows: Mutex::new(LruCache::unbounded()),
            stats: AtomicStats::default(),
        }
    }

    #[must_use]
    pub fn max_window_count(&self) -> usize {
        self.max_window_count
    }

    /// Number of windows currently tracked.
    #[must_use]
    pub fn size(&self) -> usize {
        self.lock_windows().len()
    }

    #[must_use]
    pub fn stats(&self) -> HolderStats {
        self.stats.snapshot()
    }

    fn lock_windows(&self) -> std::sync::MutexGuard<'_, LruCache<WindowId, Arc<BeanBag>>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `window_id` as most recently used. Returns whether it is tracked.
    pub fn touch(&self, window_id: &WindowId) -> bool {
        self.lock_windows().get(window_id).is_some()
    }

    /// Bag for `window_id`, created if absent. New bags enter as most
    /// recently used; existing ones keep their position.
    pub fn put_if_absent(&self, window_id: &WindowId) -> (Arc<BeanBag>, bool) {
        let mut windows = self.lock_windows();
        self.put_if_absent_locked(&mut windows, window_id, true)
    }

    fn put_if_absent_locked(
        &self,
        windows: &mut LruCache<WindowId, Arc<BeanBag>>,
        window_id: &WindowId,
        ready: bool,
    ) -> (Arc<BeanBag>, bool) {
        if let Some(bag) = windows.peek(window_id) {
            return (Arc::clone(bag), false);
        }
        let bag = Arc::new(BeanBag::new(window_id.clone(), ready));
        windows.put(window_id.clone(), Arc::clone(&bag));
        self.stats.windows_created.fetch_add(1, Ordering::Relaxed);
        (bag, true)
    }

    /// Evict least-recently-used windows while over capacity, never
    /// `current`. Evicted bags are destroyed before this returns.
    pub fn evict_if_over_capacity(&self, current: Option<&WindowId>) -> Vec<WindowId> {
        let victims = {
            let mut windows = self.lock_windows();
            Self::select_victims(&mut windows, self.max_window_count, current)
        };
        self.destroy_evicted(victims)
    }

    fn select_victims(
        windows: &mut LruCache<WindowId, Arc<BeanBag>>,
        max_window_count: usize,
        current: Option<&WindowId>,
    ) -> Vec<(WindowId, Arc<BeanBag>)> {
        let mut victims = Vec::new();
        while windows.len() > max_window_count {
            let candidate = windows
                .iter()
                .rev()
                .map(|(id, _)| id)
                .find(|id| current != Some(*id))
                .cloned();
            let Some(id) = candidate else { break };
            if let Some(bag) = windows.pop(&id) {
                victims.push((id, bag));
            }
        }
        victims
    }

    fn destroy_evicted(&self, victims: Vec<(WindowId, Arc<BeanBag>)>) -> Vec<WindowId> {
        let mut evicted = Vec::with_capacity(victims.len());
        for (id, bag) in victims {
            let destroyed = bag.destroy();
            self.stats.windows_evicted.fetch_add(1, Ordering::Relaxed);
            self.stats
                .instances_destroyed
                .fetch_add(destroyed as u64, Ordering::Relaxed);
            tracing::info!(evicted = %id, destroyed, "Evicted least recently used window");
            evicted.push(id);
        }
        evicted
    }

    /// Make `window_id` the most recently used window, creating its bag if
    /// needed and evicting over-capacity windows when it is new.
    ///
    /// A new bag is visible to other activations at once but serves lookups
    /// only after the evicted windows are destroyed.
    pub fn activate(&self, window_id: &WindowId) -> Activation {
        let (bag, created, victims) = {
            let mut windows = self.lock_windows();
            if let Some(bag) = windows.get(window_id) {
                (Arc::clone(bag), false, Vec::new())
            } else {
                let (bag, created) = self.put_if_absent_locked(&mut windows, window_id, false);
                let victims =
                    Self::select_victims(&mut windows, self.max_window_count, Some(window_id));
                (bag, created, victims)
            }
        };
        let evicted = {
            let _open = created.then(|| OpenOnDrop(&bag));
            self.destroy_evicted(victims)
        };
        Activation {
            bag,
            created,
            evicted,
        }
    }

    /// Bag for `window_id` without changing recency.
    #[must_use]
    pub fn bag(&self, window_id: &WindowId) -> Option<Arc<BeanBag>> {
        self.lock_windows().peek(window_id).cloned()
    }

    /// Destroy and forget `window_id`. Unknown ids are a no-op returning
    /// `false`.
    pub fn close_window(&self, window_id: &WindowId) -> bool {
        let bag = self.lock_windows().pop(window_id);
        match bag {
            Some(bag) => {
                let destroyed = bag.destroy();
                self.stats.windows_closed.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .instances_destroyed
                    .fetch_add(destroyed as u64, Ordering::Relaxed);
                tracing::debug!(window_id = %window_id, destroyed, "Closed window");
                true
            }
            None => false,
        }
    }

    /// Tracked window ids, least recently used first.
    #[must_use]
    pub fn window_ids(&self) -> Vec<WindowId> {
        self.lock_windows()
            .iter()
            .rev()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Destroy every window (session end). Returns the number of instances
    /// destroyed.
    pub fn destroy_all(&self) -> usize {
        let bags: Vec<Arc<BeanBag>> = {
            let mut windows = self.lock_windows();
            let mut bags = Vec::with_capacity(windows.len());
            while let Some((_, bag)) = windows.pop_lru() {
                bags.push(bag);
            }
            bags
        };
        let mut destroyed = 0;
        for bag in bags {
            destroyed += bag.destroy();
            self.stats.windows_closed.fetch_add(1, Ordering::Relaxed);
        }
        self.stats
            .instances_destroyed
            .fetch_add(destroyed as u64, Ordering::Relaxed);
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contextual::FnBean;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    fn wid(s: &str) -> WindowId {
        WindowId::parse(s).unwrap()
    }

    fn counting_bean(id: &str, destroyed: &Arc<AtomicUsize>) -> Arc<dyn Contextual> {
        let destroyed = Arc::clone(destroyed);
        Arc::new(
            FnBean::new(id, |_| Ok(String::from("value"))).on_destroy(move |_| {
                destroyed.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn fill(holder: &WindowBeanHolder, window: &str, bean: &Arc<dyn Contextual>) {
        let activation = holder.activate(&wid(window));
        assert!(matches!(
            activation.bag.get_or_create(bean).unwrap(),
            BagLookup::Created(_)
        ));
    }

    #[test]
    fn activate_creates_bag_once() {
        let holder = WindowBeanHolder::new(4);
        let first = holder.activate(&wid("a"));
        assert!(first.created);
        let second = holder.activate(&wid("a"));
        assert!(!second.created);
        assert!(Arc::ptr_eq(&first.bag, &second.bag));
        assert_eq!(holder.size(), 1);
    }

    #[test]
    fn bag_returns_same_instance() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let bean = counting_bean("cart", &destroyed);
        let holder = WindowBeanHolder::new(4);
        let bag = holder.activate(&wid("a")).bag;
        let BagLookup::Created(first) = bag.get_or_create(&bean).unwrap() else {
            panic!("expected creation");
        };
        let BagLookup::Found(second) = bag.get_or_create(&bean).unwrap() else {
            panic!("expected lookup hit");
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn over_capacity_evicts_lru_and_destroys_it() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let bean = counting_bean("cart", &destroyed);
        let holder = WindowBeanHolder::new(2);
        fill(&holder, "a", &bean);
        fill(&holder, "b", &bean);

        let activation = holder.activate(&wid("c"));
        assert_eq!(activation.evicted, vec![wid("a")]);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(holder.window_ids(), vec![wid("b"), wid("c")]);
        assert_eq!(holder.stats().windows_evicted, 1);
    }

    #[test]
    fn touch_protects_window_from_eviction() {
        let holder = WindowBeanHolder::new(2);
        holder.activate(&wid("a"));
        holder.activate(&wid("b"));
        assert!(holder.touch(&wid("a")));
        let activation = holder.activate(&wid("c"));
        assert_eq!(activation.evicted, vec![wid("b")]);
        assert_eq!(holder.window_ids(), vec![wid("a"), wid("c")]);
        assert!(!holder.touch(&wid("b")));
    }

    #[test]
    fn eviction_skips_current_window() {
        let holder = WindowBeanHolder::new(3);
        for w in ["a", "b", "c"] {
            holder.put_if_absent(&wid(w));
        }
        holder.put_if_absent(&wid("d"));
        // "a" is least recently used but pinned as current.
        let evicted = holder.evict_if_over_capacity(Some(&wid("a")));
        assert_eq!(evicted, vec![wid("b")]);
        assert_eq!(holder.window_ids(), vec![wid("a"), wid("c"), wid("d")]);
    }

    #[test]
    fn put_if_absent_keeps_existing_position() {
        let holder = WindowBeanHolder::new(8);
        let (_, created_a) = holder.put_if_absent(&wid("a"));
        let (_, created_b) = holder.put_if_absent(&wid("b"));
        let (_, again) = holder.put_if_absent(&wid("a"));
        assert!(created_a && created_b && !again);
        assert_eq!(holder.window_ids(), vec![wid("a"), wid("b")]);
    }

    #[test]
    fn close_window_is_idempotent() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let bean = counting_bean("cart", &destroyed);
        let holder = WindowBeanHolder::new(4);
        fill(&holder, "a", &bean);

        assert!(holder.close_window(&wid("a")));
        assert!(!holder.close_window(&wid("a")));
        assert!(!holder.close_window(&wid("never")));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(holder.size(), 0);
    }

    #[test]
    fn closed_bag_reports_closed_and_reopen_is_fresh() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let bean = counting_bean("cart", &destroyed);
        let holder = WindowBeanHolder::new(4);
        let stale = holder.activate(&wid("a")).bag;
        stale.get_or_create(&bean).unwrap();
        holder.close_window(&wid("a"));

        assert!(stale.is_closed());
        assert!(matches!(stale.get_or_create(&bean).unwrap(), BagLookup::Closed));
        assert!(stale.get(bean.id()).is_none());

        let fresh = holder.activate(&wid("a"));
        assert!(fresh.created);
        assert!(fresh.bag.is_empty());
    }

    #[test]
    fn destroy_all_destroys_each_instance_once() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let cart = counting_bean("cart", &destroyed);
        let prefs = counting_bean("prefs", &destroyed);
        let holder = WindowBeanHolder::new(4);
        fill(&holder, "a", &cart);
        fill(&holder, "a", &prefs);
        fill(&holder, "b", &cart);

        assert_eq!(holder.destroy_all(), 3);
        assert_eq!(holder.destroy_all(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 3);
        assert_eq!(holder.size(), 0);
    }

    #[test]
    fn remove_single_instance() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let bean = counting_bean("cart", &destroyed);
        let holder = WindowBeanHolder::new(4);
        let bag = holder.activate(&wid("a")).bag;
        bag.get_or_create(&bean).unwrap();
        assert!(bag.remove(bean.id()));
        assert!(!bag.remove(bean.id()));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(bag.bean_ids().is_empty());
    }

    #[test]
    fn failed_creation_leaves_no_instance() {
        let holder = WindowBeanHolder::new(4);
        let bag = holder.activate(&wid("a")).bag;
        let broken: Arc<dyn Contextual> = Arc::new(FnBean::<u8>::new("broken", |_| {
            Err(crate::error::Error::Creation {
                bean: "broken".to_string(),
                reason: "boom".to_string(),
            })
        }));
        assert!(bag.get_or_create(&broken).is_err());
        assert!(bag.is_empty());
    }

    #[test]
    fn factory_may_resolve_sibling_bean_in_same_window() {
        let holder = Arc::new(WindowBeanHolder::new(4));
        let bag = holder.activate(&wid("a")).bag;
        let inner: Arc<dyn Contextual> = Arc::new(FnBean::new("inner", |_| Ok(7_u32)));
        let bag_for_outer = Arc::clone(&bag);
        let inner_for_outer = Arc::clone(&inner);
        let outer: Arc<dyn Contextual> = Arc::new(FnBean::new("outer", move |_| {
            match bag_for_outer.get_or_create(&inner_for_outer)? {
                BagLookup::Found(v) | BagLookup::Created(v) => {
                    Ok(*v.downcast::<u32>().map_err(|_| crate::error::Error::Creation {
                        bean: "outer".to_string(),
                        reason: "type".to_string(),
                    })? + 1)
                }
                BagLookup::Closed => Ok(0),
            }
        }));
        let BagLookup::Created(value) = bag.get_or_create(&outer).unwrap() else {
            panic!("expected creation");
        };
        assert_eq!(*value.downcast::<u32>().unwrap(), 8);
        assert_eq!(bag.bean_ids(), vec![BeanId::new("inner"), BeanId::new("outer")]);
    }

    /// Bean whose first creation blocks between `entered` and `release`.
    fn gated_bean(
        created: &Arc<AtomicUsize>,
        destroyed: &Arc<AtomicUsize>,
        entered: &Arc<Barrier>,
        release: &Arc<Barrier>,
    ) -> Arc<dyn Contextual> {
        let (created, destroyed) = (Arc::clone(created), Arc::clone(destroyed));
        let (entered, release) = (Arc::clone(entered), Arc::clone(release));
        Arc::new(
            FnBean::new("cart", move |_| {
                if created.fetch_add(1, Ordering::SeqCst) == 0 {
                    entered.wait();
                    release.wait();
                }
                Ok(())
            })
            .on_destroy(move |_| {
                destroyed.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn lookup_queued_behind_removed_slot_never_orphans_an_instance() {
        let created = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let bean = gated_bean(&created, &destroyed, &entered, &release);
        let bag = BeanBag::new(wid("a"), true);
        let slot_refs = || {
            bag.state
                .lock()
                .unwrap()
                .slots
                .get(bean.id())
                .map(Arc::strong_count)
        };

        std::thread::scope(|scope| {
            let creator = scope.spawn(|| bag.get_or_create(&bean).unwrap());
            entered.wait();

            // Second lookup holds a clone of the slot the creator has locked.
            let waiter = scope.spawn(|| bag.get_or_create(&bean).unwrap());
            while slot_refs() != Some(3) {
                std::thread::yield_now();
            }
            let remover = scope.spawn(|| bag.remove(bean.id()));
            while slot_refs().is_some() {
                std::thread::yield_now();
            }
            release.wait();

            assert!(!matches!(creator.join().unwrap(), BagLookup::Closed));
            assert!(!matches!(waiter.join().unwrap(), BagLookup::Closed));
            assert!(remover.join().unwrap());
        });

        // The removed instance is gone; exactly one replacement lives in the bag.
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(bag.bean_ids(), vec![bean.id().clone()]);
        assert_eq!(bag.destroy(), 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_during_creation_reports_closed_and_destroys_instance() {
        let created = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let bean = gated_bean(&created, &destroyed, &entered, &release);
        let bag = BeanBag::new(wid("a"), true);

        std::thread::scope(|scope| {
            let creator = scope.spawn(|| bag.get_or_create(&bean).unwrap());
            entered.wait();
            let closer = scope.spawn(|| bag.destroy());
            while !bag.is_closed() {
                std::thread::yield_now();
            }
            release.wait();

            assert!(matches!(creator.join().unwrap(), BagLookup::Closed));
            assert_eq!(closer.join().unwrap(), 1);
        });
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn new_window_serves_lookups_only_after_eviction_finishes() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let evicted_done = Arc::new(AtomicBool::new(false));
        let slow: Arc<dyn Contextual> = {
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            let done = Arc::clone(&evicted_done);
            Arc::new(FnBean::new("slow", |_| Ok(())).on_destroy(move |_| {
                entered.wait();
                release.wait();
                done.store(true, Ordering::SeqCst);
            }))
        };
        let cart: Arc<dyn Contextual> = Arc::new(FnBean::new("cart", |_| Ok(())));
        let holder = WindowBeanHolder::new(1);
        holder.activate(&wid("a")).bag.get_or_create(&slow).unwrap();

        std::thread::scope(|scope| {
            let evictor = scope.spawn(|| holder.activate(&wid("b")).evicted);
            entered.wait();

            // "b" is already tracked while "a" is still being destroyed.
            let second = holder.activate(&wid("b"));
            assert!(!second.created);
            assert!(!second.bag.state.lock().unwrap().ready);
            let done = Arc::clone(&evicted_done);
            let user = scope.spawn(move || {
                let lookup = second.bag.get_or_create(&cart).unwrap();
                (done.load(Ordering::SeqCst), lookup)
            });
            std::thread::sleep(Duration::from_millis(20));
            release.wait();

            assert_eq!(evictor.join().unwrap(), vec![wid("a")]);
            let (saw_eviction_done, lookup) = user.join().unwrap();
            assert!(saw_eviction_done);
            assert!(matches!(lookup, BagLookup::Created(_)));
        });
    }

    #[test]
    #[should_panic(expected = "max_window_count must be > 0")]
    fn zero_capacity_panics() {
        let _ = WindowBeanHolder::new(0);
    }
}

//! Property-based tests for the window bean holder.
//!
//! Verifies the per-session window table against a reference model:
//! - Capacity bound: size() <= max_window_count() after every operation
//! - Eviction ordering: always evicts the least recently used window
//! - Touch promotion: touch(w) makes w most recently used
//! - Close semantics: closing unknown windows is a no-op
//! - Destruction accounting: every created instance is destroyed at most once,
//!   and exactly once when its window goes away

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use winscope_core::WindowId;
use winscope_core::contextual::{Contextual, FnBean};
use winscope_core::window_bean_holder::WindowBeanHolder;

// ────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────

const BEANS: [&str; 3] = ["cart", "wizard", "prefs"];

fn arb_capacity() -> impl Strategy<Value = usize> {
    1usize..=6
}

fn arb_window() -> impl Strategy<Value = u8> {
    0u8..10
}

#[derive(Debug, Clone)]
enum Op {
    Activate(u8),
    Touch(u8),
    Create(u8, usize),
    Close(u8),
    DestroyAll,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => arb_window().prop_map(Op::Activate),
        2 => arb_window().prop_map(Op::Touch),
        4 => (arb_window(), 0..BEANS.len()).prop_map(|(w, b)| Op::Create(w, b)),
        2 => arb_window().prop_map(Op::Close),
        1 => Just(Op::DestroyAll),
    ]
}

fn arb_ops(max: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(arb_op(), 1..max)
}

fn wid(w: u8) -> WindowId {
    WindowId::parse(&format!("w{w}")).unwrap()
}

/// Reference model: recency order as a Vec (front=LRU, back=MRU).
struct RefModel {
    capacity: usize,
    order: Vec<u8>,
    beans: HashMap<u8, BTreeSet<usize>>,
    destroyed: usize,
}

impl RefModel {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Vec::new(),
            beans: HashMap::new(),
            destroyed: 0,
        }
    }

    fn drop_window(&mut self, w: u8) -> bool {
        let Some(pos) = self.order.iter().position(|&x| x == w) else {
            return false;
        };
        self.order.remove(pos);
        self.destroyed += self.beans.remove(&w).map_or(0, |b| b.len());
        true
    }

    fn touch(&mut self, w: u8) -> bool {
        let Some(pos) = self.order.iter().position(|&x| x == w) else {
            return false;
        };
        self.order.remove(pos);
        self.order.push(w);
        true
    }

    /// Returns evicted windows, LRU first.
    fn activate(&mut self, w: u8) -> Vec<u8> {
        if self.touch(w) {
            return Vec::new();
        }
        self.order.push(w);
        self.beans.insert(w, BTreeSet::new());
        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            let victim = self.order[0];
            self.drop_window(victim);
            evicted.push(victim);
        }
        evicted
    }

    fn create(&mut self, w: u8, bean: usize) -> Vec<u8> {
        let evicted = self.activate(w);
        self.beans.entry(w).or_default().insert(bean);
        evicted
    }

    fn destroy_all(&mut self) {
        for w in self.order.clone() {
            self.drop_window(w);
        }
    }

    fn live_instances(&self) -> usize {
        self.beans.values().map(BTreeSet::len).sum()
    }
}

fn counting_beans(created: &Arc<AtomicUsize>, destroyed: &Arc<AtomicUsize>) -> Vec<Arc<dyn Contextual>> {
    BEANS
        .iter()
        .map(|name| {
            let c = Arc::clone(created);
            let d = Arc::clone(destroyed);
            let bean: Arc<dyn Contextual> = Arc::new(
                FnBean::new(*name, move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .on_destroy(move |_| {
                    d.fetch_add(1, Ordering::SeqCst);
                }),
            );
            bean
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────
// State-machine model checking: real holder vs reference model
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The holder matches the reference model through arbitrary operation sequences.
    #[test]
    fn prop_matches_reference_model(
        capacity in arb_capacity(),
        ops in arb_ops(60),
    ) {
        let created = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let beans = counting_beans(&created, &destroyed);
        let holder = WindowBeanHolder::new(capacity);
        let mut model = RefModel::new(capacity);

        for op in &ops {
            match op {
                Op::Activate(w) => {
                    let activation = holder.activate(&wid(*w));
                    let expected: Vec<WindowId> = model.activate(*w).into_iter().map(wid).collect();
                    prop_assert_eq!(activation.evicted, expected, "Eviction mismatch on activate({})", w);
                }
                Op::Touch(w) => {
                    prop_assert_eq!(holder.touch(&wid(*w)), model.touch(*w), "Touch mismatch for {}", w);
                }
                Op::Create(w, b) => {
                    let activation = holder.activate(&wid(*w));
                    activation.bag.get_or_create(&beans[*b]).unwrap();
                    let expected: Vec<WindowId> = model.create(*w, *b).into_iter().map(wid).collect();
                    prop_assert_eq!(activation.evicted, expected, "Eviction mismatch on create({}, {})", w, b);
                }
                Op::Close(w) => {
                    prop_assert_eq!(holder.close_window(&wid(*w)), model.drop_window(*w), "Close mismatch for {}", w);
                }
                Op::DestroyAll => {
                    holder.destroy_all();
                    model.destroy_all();
                }
            }

            prop_assert!(holder.size() <= holder.max_window_count());
            let expected_order: Vec<WindowId> = model.order.iter().copied().map(wid).collect();
            prop_assert_eq!(holder.window_ids(), expected_order);
            prop_assert_eq!(destroyed.load(Ordering::SeqCst), model.destroyed);
            prop_assert_eq!(
                created.load(Ordering::SeqCst),
                model.destroyed + model.live_instances(),
                "Every created instance is either live or destroyed once"
            );
        }
    }

    /// Filling max+1 windows evicts exactly the first one.
    #[test]
    fn prop_overflow_evicts_exactly_oldest(capacity in arb_capacity()) {
        let holder = WindowBeanHolder::new(capacity);
        for w in 0..capacity {
            prop_assert!(holder.activate(&wid(w as u8)).evicted.is_empty());
        }
        let activation = holder.activate(&wid(capacity as u8));
        prop_assert_eq!(activation.evicted, vec![wid(0)]);
        prop_assert_eq!(holder.size(), capacity);
    }

    /// Closing the same window twice destroys its instances once.
    #[test]
    fn prop_close_is_idempotent(windows in prop::collection::btree_set(arb_window(), 1..6)) {
        let created = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let beans = counting_beans(&created, &destroyed);
        let holder = WindowBeanHolder::new(16);
        for w in &windows {
            let bag = holder.activate(&wid(*w)).bag;
            for bean in &beans {
                bag.get_or_create(bean).unwrap();
            }
        }
        for w in &windows {
            prop_assert!(holder.close_window(&wid(*w)));
            prop_assert!(!holder.close_window(&wid(*w)));
        }
        prop_assert_eq!(destroyed.load(Ordering::SeqCst), windows.len() * BEANS.len());
        prop_assert_eq!(holder.size(), 0);
    }
}

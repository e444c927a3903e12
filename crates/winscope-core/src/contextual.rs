//! Contextual beans: how a window-scoped instance is created and destroyed.
//!
//! The hosting container owns bean definitions; the window scope only needs
//! a way to create an instance on first access and to destroy it again when
//! its window goes away. [`Contextual`] is that contract. Whatever a bean
//! acquires while being created (dependent objects, handles) is registered on
//! its [`CreationalContext`] and released when the instance is destroyed.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A created bean instance. Downcast with [`downcast_instance`].
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// Identity of a bean definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeanId(String);

impl BeanId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BeanId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Bookkeeping for one instance's creation.
///
/// Dependents registered during creation are released in reverse order,
/// exactly once.
#[derive(Default)]
pub struct CreationalContext {
    dependents: Vec<(String, ReleaseFn)>,
}

impl fmt::Debug for CreationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.dependents.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("CreationalContext")
            .field("dependents", &names)
            .finish()
    }
}

impl CreationalContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependent to release when the owning instance is destroyed.
    pub fn push_dependent(&mut self, name: impl Into<String>, release: impl FnOnce() + Send + 'static) {
        self.dependents.push((name.into(), Box::new(release)));
    }

    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.dependents.len()
    }

    /// Release all dependents, most recently registered first.
    pub fn release(self) {
        for (name, release) in self.dependents.into_iter().rev() {
            tracing::trace!(dependent = %name, "Releasing dependent");
            release();
        }
    }
}

/// A bean definition the window scope can instantiate.
pub trait Contextual: Send + Sync {
    /// Identity used as the key inside a window's bag
    fn id(&self) -> &BeanId;

    /// Create a new instance
    fn create(&self, creational: &mut CreationalContext) -> Result<BeanInstance>;

    /// Destroy an instance previously returned by [`Contextual::create`].
    ///
    /// The default releases the creational context.
    fn destroy(&self, instance: BeanInstance, creational: CreationalContext) {
        drop(instance);
        creational.release();
    }
}

impl fmt::Debug for dyn Contextual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contextual").field("id", self.id()).finish()
    }
}

type CreateFn<T> = Box<dyn Fn(&mut CreationalContext) -> Result<T> + Send + Sync>;
type DestroyFn<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Closure-backed [`Contextual`].
///
/// ```
/// use std::sync::Arc;
/// use winscope_core::contextual::{Contextual, FnBean};
///
/// let bean: Arc<dyn Contextual> = Arc::new(FnBean::new("counter", |_| Ok(0_u32)));
/// assert_eq!(bean.id().as_str(), "counter");
/// ```
pub struct FnBean<T> {
    id: BeanId,
    create: CreateFn<T>,
    on_destroy: Option<DestroyFn<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> FnBean<T> {
    pub fn new(
        id: impl Into<BeanId>,
        create: impl Fn(&mut CreationalContext) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            create: Box::new(create),
            on_destroy: None,
            _marker: PhantomData,
        }
    }

    /// Callback invoked with the instance before it is dropped.
    #[must_use]
    pub fn on_destroy(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_destroy = Some(Box::new(f));
        self
    }
}

impl<T: Send + Sync + 'static> Contextual for FnBean<T> {
    fn id(&self) -> &BeanId {
        &self.id
    }

    fn create(&self, creational: &mut CreationalContext) -> Result<BeanInstance> {
        let value = (self.create)(creational)?;
        Ok(Arc::new(value))
    }

    fn destroy(&self, instance: BeanInstance, creational: CreationalContext) {
        if let Some(on_destroy) = &self.on_destroy {
            match instance.downcast_ref::<T>() {
                Some(value) => on_destroy(value),
                None => tracing::warn!(bean_id = %self.id, "Destroy skipped: unexpected instance type"),
            }
        }
        drop(instance);
        creational.release();
    }
}

/// Downcast a stored instance to its concrete type.
pub fn downcast_instance<T: Send + Sync + 'static>(bean: &BeanId, instance: BeanInstance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| Error::TypeMismatch {
        bean: bean.to_string(),
        expected: std::any::type_name::<T>(),
    })
}

/// A created instance together with what is needed to destroy it.
pub struct ContextualInstanceEntry {
    bean: Arc<dyn Contextual>,
    instance: BeanInstance,
    creational: CreationalContext,
}

impl fmt::Debug for ContextualInstanceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualInstanceEntry")
            .field("bean", self.bean.id())
            .field("creational", &self.creational)
            .finish()
    }
}

impl ContextualInstanceEntry {
    /// Run the bean's factory and capture the resulting entry.
    pub fn create(bean: Arc<dyn Contextual>) -> Result<Self> {
        let mut creational = CreationalContext::new();
        let instance = bean.create(&mut creational)?;
        Ok(Self {
            bean,
            instance,
            creational,
        })
    }

    #[must_use]
    pub fn bean_id(&self) -> &BeanId {
        self.bean.id()
    }

    #[must_use]
    pub fn instance(&self) -> BeanInstance {
        Arc::clone(&self.instance)
    }

    /// Destroy the instance through its bean definition. Consumes the entry,
    /// so destruction happens at most once.
    pub fn destroy(self) {
        tracing::trace!(bean_id = %self.bean.id(), "Destroying contextual instance");
        self.bean.destroy(self.instance, self.creational);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dependents_release_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = CreationalContext::new();
        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            ctx.push_dependent(name, move || order.lock().unwrap().push(name));
        }
        assert_eq!(ctx.dependent_count(), 3);
        ctx.release();
        assert_eq!(*order.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn fn_bean_create_and_destroy() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&destroyed);
        let r = Arc::clone(&released);
        let bean: Arc<dyn Contextual> = Arc::new(
            FnBean::new("cart", move |ctx: &mut CreationalContext| {
                let r = Arc::clone(&r);
                ctx.push_dependent("line-items", move || {
                    r.fetch_add(1, Ordering::SeqCst);
                });
                Ok(vec![1_u32, 2, 3])
            })
            .on_destroy(move |items: &Vec<u32>| {
                assert_eq!(items.len(), 3);
                d.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let entry = ContextualInstanceEntry::create(bean).unwrap();
        let typed = downcast_instance::<Vec<u32>>(entry.bean_id(), entry.instance()).unwrap();
        assert_eq!(*typed, vec![1, 2, 3]);

        entry.destroy();
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_creation_propagates() {
        let bean: Arc<dyn Contextual> = Arc::new(FnBean::<u8>::new("broken", |_| {
            Err(Error::Creation {
                bean: "broken".to_string(),
                reason: "no database".to_string(),
            })
        }));
        let err = ContextualInstanceEntry::create(bean).unwrap_err();
        assert!(matches!(err, Error::Creation { .. }));
    }

    #[test]
    fn downcast_mismatch_is_an_error() {
        let instance: BeanInstance = Arc::new(5_u8);
        let err = downcast_instance::<String>(&BeanId::new("n"), instance).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}

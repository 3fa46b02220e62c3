//! Per-instance thread-local values with a registry over all live threads.
//!
//! Unlike `thread_local!`, each [`ThreadSpecific`] instance owns its own
//! value per thread, created on first access from a constructor closure. The
//! instance keeps a registry of every thread's value, so
//! [`for_each_value`](ThreadSpecific::for_each_value) can iterate across
//! threads. When a thread exits, a teardown guard removes that thread's
//! values and invokes the optional finalizer; dropping the instance finalizes
//! whatever values remain.
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

trait Teardown: Send + Sync {
    fn drop_for(&self, thread: ThreadId);
}

thread_local! {
    static TEARDOWN: RefCell<ThreadTeardown> = RefCell::new(ThreadTeardown::new());
}

struct ThreadTeardown {
    thread: ThreadId,
    targets: Vec<Weak<dyn Teardown>>,
}

impl ThreadTeardown {
    fn new() -> Self {
        Self {
            thread: thread::current().id(),
            targets: Vec::new(),
        }
    }
}

impl Drop for ThreadTeardown {
    fn drop(&mut self) {
        for target in self.targets.drain(..) {
            if let Some(target) = target.upgrade() {
                target.drop_for(self.thread);
            }
        }
    }
}

type Constructor<T> = Box<dyn Fn() -> T + Send + Sync>;
type Finalizer<T> = Box<dyn Fn(&mut T) + Send + Sync>;

struct Inner<T> {
    init: Constructor<T>,
    finalize: Option<Finalizer<T>>,
    slots: Mutex<HashMap<ThreadId, Arc<Mutex<T>>>>,
}

impl<T: Send + 'static> Teardown for Inner<T> {
    fn drop_for(&self, thread: ThreadId) {
        let slot = lock(&self.slots).remove(&thread);
        if let (Some(slot), Some(finalize)) = (slot, self.finalize.as_ref()) {
            finalize(&mut lock(&slot));
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(finalize) = self.finalize.as_ref() {
            for (_, slot) in lock(&self.slots).drain() {
                finalize(&mut lock(&slot));
            }
        }
    }
}

/// A value per thread per instance, created lazily from a constructor
/// closure.
pub struct ThreadSpecific<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> ThreadSpecific<T> {
    /// Creates an instance whose per-thread values are built by `init`.
    pub fn new(init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                init: Box::new(init),
                finalize: None,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates an instance that additionally runs `finalize` on each value
    /// when its thread exits or the instance is dropped.
    pub fn with_finalizer(
        init: impl Fn() -> T + Send + Sync + 'static,
        finalize: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                init: Box::new(init),
                finalize: Some(Box::new(finalize)),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Runs `f` with the calling thread's value, constructing it on first
    /// access. Must not be called re-entrantly from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let thread = thread::current().id();
        let slot = {
            let mut slots = lock(&self.inner.slots);
            match slots.get(&thread) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let slot = Arc::new(Mutex::new((self.inner.init)()));
                    slots.insert(thread, Arc::clone(&slot));
                    let inner_dyn: Arc<dyn Teardown> = Arc::clone(&self.inner) as Arc<dyn Teardown>;
                    let target: Weak<dyn Teardown> = Arc::downgrade(&inner_dyn);
                    TEARDOWN.with(|teardown| teardown.borrow_mut().targets.push(target));
                    slot
                }
            }
        };
        let mut value = lock(&slot);
        f(&mut value)
    }

    /// Copies out the calling thread's value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(|v| v.clone())
    }

    /// Replaces the calling thread's value.
    pub fn set(&self, value: T) {
        self.with(|v| *v = value);
    }

    /// Runs `f` over the values of every live thread, including the caller's.
    pub fn for_each_value(&self, mut f: impl FnMut(&mut T)) {
        let slots: Vec<Arc<Mutex<T>>> = lock(&self.inner.slots).values().cloned().collect();
        for slot in slots {
            f(&mut lock(&slot));
        }
    }

    /// Number of threads currently holding a value.
    pub fn thread_count(&self) -> usize {
        lock(&self.inner.slots).len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn values_are_isolated_per_thread() {
        let store = Arc::new(ThreadSpecific::new(|| 10));
        assert_eq!(store.get(), 10);
        store.set(5);
        assert_eq!(store.get(), 5);

        let threads: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.set(i);
                    thread::sleep(std::time::Duration::from_millis(1));
                    assert_eq!(store.get(), i);
                })
            })
            .collect();
        for t in threads {
            t.join().expect("thread does not panic");
        }
        assert_eq!(store.get(), 5);
    }

    #[test]
    fn finalizer_runs_once_per_constructed_value() {
        static UP: AtomicUsize = AtomicUsize::new(0);
        static DOWN: AtomicUsize = AtomicUsize::new(0);
        {
            let store = Arc::new(ThreadSpecific::with_finalizer(
                || {
                    UP.fetch_add(1, Ordering::SeqCst);
                    0usize
                },
                |_| {
                    DOWN.fetch_add(1, Ordering::SeqCst);
                },
            ));
            let threads: Vec<_> = (0..8)
                .map(|i| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || store.set(i))
                })
                .collect();
            for t in threads {
                t.join().expect("thread does not panic");
            }
            // Exited threads already tore their values down.
            assert_eq!(store.thread_count(), 0);
        }
        assert_eq!(UP.load(Ordering::SeqCst), 8);
        assert_eq!(DOWN.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn dropping_the_instance_finalizes_remaining_values() {
        static DOWN: AtomicUsize = AtomicUsize::new(0);
        {
            let store = ThreadSpecific::with_finalizer(
                || 1usize,
                |_| {
                    DOWN.fetch_add(1, Ordering::SeqCst);
                },
            );
            store.set(2);
            assert_eq!(store.thread_count(), 1);
        }
        assert_eq!(DOWN.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn instances_do_not_share_values() {
        let a = ThreadSpecific::new(|| 10);
        let b = ThreadSpecific::new(|| 20);
        a.set(1);
        assert_eq!(b.get(), 20);
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn for_each_value_sees_live_threads() {
        let store = Arc::new(ThreadSpecific::new(|| 0usize));
        store.set(7);
        let mut seen = Vec::new();
        store.for_each_value(|v| seen.push(*v));
        assert_eq!(seen, vec![7]);
    }
}

//! Core trait defining factory behavior.
//!
//! This module provides the `FactoryApi` trait with default implementations for
//! lazily constructing, retrieving, resetting, and tracing singleton instances.
//!
//! The factory is type-based: each concrete type (`TypeId`) owns one slot, and a slot
//! holds at most one instance. The slot's lock is held across check-and-construct, so
//! concurrent first calls for the same type construct exactly once while unrelated
//! types never wait on each other.
//!
//! Because constructors may request other singletons while holding their own slot,
//! every blocking slot acquisition first consults a process-wide wait graph. A request
//! that would wait on its own thread (`Reentrant`) or on a thread that transitively
//! waits on it (`Cycle`) fails instead of deadlocking.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, TryLockError};
use std::thread::{self, ThreadId};

use crate::{FactoryError, FactoryEvent, Singleton};

type Instance = Arc<dyn Any + Send + Sync>;

/// Per-type slot: a lock around the optional instance.
#[doc(hidden)]
#[derive(Default)]
pub struct InstanceSlot {
    instance: Mutex<Option<Instance>>,
}

impl InstanceSlot {
    // Values are written only after a successful construction, so a slot poisoned by a
    // panicking constructor still holds a consistent value.
    fn lock(&self) -> MutexGuard<'_, Option<Instance>> {
        self.instance.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn try_lock(&self) -> Option<MutexGuard<'_, Option<Instance>>> {
        match self.instance.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

/// Storage of a factory: concrete type identity to its slot.
pub type InstanceRegistry = LazyLock<Mutex<HashMap<TypeId, Arc<InstanceSlot>>>>;

/// Type alias for the user-supplied tracing callback.
///
/// The callback receives every `FactoryEvent` of the factory it is installed on. It must
/// be thread-safe because factories are globally shared.
pub type TraceCallback = dyn Fn(&FactoryEvent) + Send + Sync + 'static;

/// Storage for a factory's trace callback.
pub type TraceHook = LazyLock<Mutex<Option<Arc<TraceCallback>>>>;

// -------------------------------------------------------------------------------------------------
// Wait graph
// -------------------------------------------------------------------------------------------------

/// Identity of a slot across all factories: (factory storage address, type).
type SlotKey = (usize, TypeId);

/// Which thread is constructing each slot, and which slot each blocked thread waits on.
///
/// Builders register before their constructor runs and waiters register before they
/// block, both under the graph lock, so the thread adding the last edge of a cycle
/// always sees the whole cycle.
#[derive(Default)]
struct WaitGraph {
    builders: HashMap<SlotKey, ThreadId>,
    waiting: HashMap<ThreadId, SlotKey>,
}

static WAIT_GRAPH: LazyLock<Mutex<WaitGraph>> = LazyLock::new(|| Mutex::new(WaitGraph::default()));

fn wait_graph() -> MutexGuard<'static, WaitGraph> {
    // Every update is a single insert or remove; a poisoned graph is still consistent.
    WAIT_GRAPH.lock().unwrap_or_else(|p| p.into_inner())
}

impl WaitGraph {
    /// Whether blocking `me` on `key` would make it wait, directly or through other
    /// blocked builders, on itself.
    fn closes_cycle(&self, key: SlotKey, me: ThreadId) -> bool {
        let mut next = key;
        // Each hop visits a distinct waiting thread unless a cycle already exists.
        for _ in 0..=self.waiting.len() {
            let Some(&builder) = self.builders.get(&next) else {
                return false;
            };
            if builder == me {
                return true;
            }
            match self.waiting.get(&builder) {
                Some(&key) => next = key,
                None => return false,
            }
        }
        false
    }
}

/// Registers the current thread as the builder of a slot until dropped.
struct BuildGuard {
    key: SlotKey,
    builder: ThreadId,
}

impl BuildGuard {
    fn enter(key: SlotKey) -> Self {
        let builder = thread::current().id();
        wait_graph().builders.insert(key, builder);
        Self { key, builder }
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        let mut graph = wait_graph();
        if graph.builders.get(&self.key) == Some(&self.builder) {
            graph.builders.remove(&self.key);
        }
    }
}

/// Lock a slot, refusing to block when the wait could never end.
///
/// # Errors
///
/// - `Reentrant` if the current thread is constructing this slot.
/// - `Cycle` if the slot's builder is, transitively, waiting on the current thread.
fn lock_slot<'a>(
    slot: &'a InstanceSlot,
    key: SlotKey,
    type_name: &'static str,
) -> Result<MutexGuard<'a, Option<Instance>>, FactoryError> {
    if let Some(guard) = slot.try_lock() {
        return Ok(guard);
    }

    let me = thread::current().id();
    {
        let mut graph = wait_graph();
        if graph.builders.get(&key) == Some(&me) {
            return Err(FactoryError::Reentrant { type_name });
        }
        if graph.closes_cycle(key, me) {
            return Err(FactoryError::Cycle { type_name });
        }
        graph.waiting.insert(me, key);
    }

    let guard = slot.lock();
    wait_graph().waiting.remove(&me);
    Ok(guard)
}

// -------------------------------------------------------------------------------------------------
// Factory
// -------------------------------------------------------------------------------------------------

/// Core trait defining factory behavior.
///
/// Provides default implementations for all factory operations, requiring only
/// two accessor methods (`storage` and `trace`) to be implemented by the implementor.
pub trait FactoryApi {
    // -------------------------------------------------------------------------------------------------
    // Tracing
    // -------------------------------------------------------------------------------------------------

    /// Access the trace callback static.
    fn trace() -> &'static TraceHook;

    /// Set a tracing callback for factory operations.
    ///
    /// Callbacks run with no factory lock held, but they must not install or clear
    /// the trace callback of the same factory.
    fn set_trace_callback(&self, callback: impl Fn(&FactoryEvent) + Send + Sync + 'static) {
        let mut guard = Self::trace().lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::new(callback));
    }

    /// Clear the tracing callback.
    fn clear_trace_callback(&self) {
        let mut guard = Self::trace().lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    /// Emit a factory event to the current callback and, with the `tracing` feature,
    /// to the `tracing` facade.
    fn emit_event(&self, event: &FactoryEvent) {
        #[cfg(feature = "tracing")]
        match event {
            FactoryEvent::Construct { success: false, .. } => {
                tracing::warn!(target: "singleton_factory", %event, "singleton construction failed")
            }
            _ => tracing::debug!(target: "singleton_factory", %event),
        }

        // Clone the callback out so it runs without the trace lock held.
        let callback = Self::trace()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    // -------------------------------------------------------------------------------------------------
    // Instances
    // -------------------------------------------------------------------------------------------------

    /// Access the storage static.
    fn storage() -> &'static InstanceRegistry;

    /// Get the singleton instance of `T`, constructing it on first use.
    ///
    /// `args` are passed to `T::construct` only if no instance exists yet. Once an
    /// instance exists they are dropped unused and the existing instance is returned.
    ///
    /// # Errors
    ///
    /// - `Construction` if `T::construct` fails. Nothing is recorded and the next call
    ///   constructs again.
    /// - `Reentrant` if called for `T` from inside `T::construct` on the same factory.
    /// - `Cycle` if `T` is being constructed by another thread that is itself waiting,
    ///   directly or transitively, on a singleton this thread is constructing.
    fn get_instance<T: Singleton>(&self, args: T::Args) -> Result<Arc<T>, FactoryError<T::Error>> {
        let type_name = std::any::type_name::<T>();
        let key = slot_key::<Self, T>();

        let slot = slot_of::<T>(Self::storage());
        let mut instance =
            lock_slot(&slot, key, type_name).map_err(FactoryError::<T::Error>::widen)?;

        if let Some(existing) = instance.as_ref().cloned() {
            drop(instance);
            self.emit_event(&FactoryEvent::Get {
                type_name,
                constructed: false,
            });
            return downcast(existing).map_err(FactoryError::widen);
        }

        let constructed = {
            let _guard = BuildGuard::enter(key);
            T::construct(args)
        };

        match constructed {
            Ok(value) => {
                let value = Arc::new(value);
                *instance = Some(value.clone() as Instance);
                drop(instance);

                self.emit_event(&FactoryEvent::Construct {
                    type_name,
                    success: true,
                });
                self.emit_event(&FactoryEvent::Get {
                    type_name,
                    constructed: true,
                });
                Ok(value)
            }
            Err(source) => {
                drop(instance);
                self.emit_event(&FactoryEvent::Construct {
                    type_name,
                    success: false,
                });
                Err(FactoryError::Construction { type_name, source })
            }
        }
    }

    /// Get the existing instance of `T` without constructing one.
    ///
    /// Waits if another thread is constructing `T`.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` if `T` has no instance.
    /// - `Reentrant` if called for `T` from inside `T::construct`.
    /// - `Cycle` if waiting for `T` would deadlock across threads.
    fn instance<T: Singleton>(&self) -> Result<Arc<T>, FactoryError> {
        let type_name = std::any::type_name::<T>();
        let slot = slot_of::<T>(Self::storage());
        let existing = lock_slot(&slot, slot_key::<Self, T>(), type_name)?.clone();

        self.emit_event(&FactoryEvent::Contains {
            type_name,
            found: existing.is_some(),
        });

        match existing {
            Some(existing) => downcast(existing),
            None => Err(FactoryError::NotInitialized { type_name }),
        }
    }

    /// Drop the recorded instance of `T` so the next `get_instance` constructs a new one.
    ///
    /// Other types are not affected. `Arc<T>` handles already given out stay valid.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` if `T` has no instance.
    /// - `Reentrant` if called for `T` from inside `T::construct`.
    /// - `Cycle` if waiting for `T` would deadlock across threads.
    fn reset_instance<T: Singleton>(&self) -> Result<(), FactoryError> {
        let type_name = std::any::type_name::<T>();
        let slot = Self::storage()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&TypeId::of::<T>())
            .cloned();

        let removed = match slot {
            Some(slot) => lock_slot(&slot, slot_key::<Self, T>(), type_name)?.take(),
            None => None,
        };

        self.emit_event(&FactoryEvent::Reset {
            type_name,
            found: removed.is_some(),
        });

        match removed {
            Some(_) => Ok(()),
            None => Err(FactoryError::NotInitialized { type_name }),
        }
    }

    /// Check whether `T` currently has an instance.
    ///
    /// A type still being constructed by the calling thread reports `false`.
    ///
    /// # Errors
    ///
    /// - `Cycle` if waiting for `T` would deadlock across threads.
    fn is_initialized<T: Singleton>(&self) -> Result<bool, FactoryError> {
        let type_name = std::any::type_name::<T>();
        let slot = Self::storage()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&TypeId::of::<T>())
            .cloned();

        let found = match slot {
            Some(slot) => match lock_slot(&slot, slot_key::<Self, T>(), type_name) {
                Ok(instance) => instance.is_some(),
                Err(FactoryError::Reentrant { .. }) => false,
                Err(err) => return Err(err),
            },
            None => false,
        };

        self.emit_event(&FactoryEvent::Contains { type_name, found });

        Ok(found)
    }

    /// Clear every instance recorded by this factory.
    ///
    /// Intended for tests. Slots are emptied rather than removed, so a constructor
    /// running concurrently keeps its lock. Must not be called from inside a constructor.
    #[doc(hidden)]
    fn clear(&self) {
        let slots: Vec<Arc<InstanceSlot>> = Self::storage()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        for slot in slots {
            slot.lock().take();
        }

        self.emit_event(&FactoryEvent::Clear {});
    }
}

fn slot_key<F: FactoryApi + ?Sized, T: 'static>() -> SlotKey {
    (F::storage() as *const InstanceRegistry as usize, TypeId::of::<T>())
}

/// Look up the slot of `T`, creating an empty one if needed.
fn slot_of<T: 'static>(storage: &InstanceRegistry) -> Arc<InstanceSlot> {
    storage
        .lock()
        // Only inserts happen under this lock; a poisoned map is still consistent.
        .unwrap_or_else(|p| p.into_inner())
        .entry(TypeId::of::<T>())
        .or_default()
        .clone()
}

fn downcast<T: Singleton>(instance: Instance) -> Result<Arc<T>, FactoryError> {
    instance
        .downcast::<T>()
        .map_err(|_| FactoryError::TypeMismatch {
            type_name: std::any::type_name::<T>(),
        })
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{FactoryApi, InstanceRegistry, TraceHook, WaitGraph};
    use crate::{FactoryError, Singleton};

    use serial_test::serial;
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, LazyLock, Mutex};
    use std::thread;

    static STORAGE: InstanceRegistry = LazyLock::new(|| Mutex::new(HashMap::new()));

    static TRACE: TraceHook = LazyLock::new(|| Mutex::new(None));

    struct Api;

    impl FactoryApi for Api {
        fn storage() -> &'static InstanceRegistry {
            &STORAGE
        }

        fn trace() -> &'static TraceHook {
            &TRACE
        }
    }

    const API: Api = Api;

    #[derive(Debug)]
    struct Counter {
        start: u32,
    }

    impl Singleton for Counter {
        type Args = u32;
        type Error = Infallible;

        fn construct(start: u32) -> Result<Self, Infallible> {
            Ok(Self { start })
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("flaky constructor failed")]
    struct FlakyError;

    static FLAKY_ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

    /// Fails on its first construction attempt only.
    #[derive(Debug)]
    struct Flaky;

    impl Singleton for Flaky {
        type Args = ();
        type Error = FlakyError;

        fn construct(_: ()) -> Result<Self, FlakyError> {
            if FLAKY_ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FlakyError)
            } else {
                Ok(Flaky)
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_instance_constructs_once() -> Result<(), FactoryError> {
        API.clear();

        let first = API.get_instance::<Counter>(5)?;
        let second = API.get_instance::<Counter>(99)?;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.start, 5);

        Ok(())
    }

    #[test]
    #[serial]
    fn test_instance_without_construction() {
        API.clear();

        assert_eq!(
            API.instance::<Counter>().unwrap_err(),
            FactoryError::NotInitialized {
                type_name: std::any::type_name::<Counter>()
            }
        );

        let built = API.get_instance::<Counter>(1).unwrap();
        let looked_up = API.instance::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&built, &looked_up));
    }

    #[test]
    #[serial]
    fn test_failed_construction_is_retried() {
        API.clear();
        FLAKY_ATTEMPTS.store(0, Ordering::SeqCst);

        let err = API.get_instance::<Flaky>(()).unwrap_err();
        assert!(matches!(err, FactoryError::Construction { .. }));
        assert!(!API.is_initialized::<Flaky>().unwrap());

        API.get_instance::<Flaky>(()).unwrap();
        assert!(API.is_initialized::<Flaky>().unwrap());
        assert_eq!(FLAKY_ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[serial]
    fn test_reset_instance() {
        API.clear();

        let before = API.get_instance::<Counter>(1).unwrap();
        API.reset_instance::<Counter>().unwrap();
        assert!(!API.is_initialized::<Counter>().unwrap());

        let after = API.get_instance::<Counter>(2).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.start, 1);
        assert_eq!(after.start, 2);
    }

    #[test]
    #[serial]
    fn test_reset_uninitialized_is_misuse() {
        API.clear();

        let err = API.reset_instance::<Counter>().unwrap_err();
        assert_eq!(
            err,
            FactoryError::NotInitialized {
                type_name: std::any::type_name::<Counter>()
            }
        );
    }

    #[test]
    #[serial]
    fn test_clear_empties_every_slot() {
        API.clear();

        API.get_instance::<Counter>(3).unwrap();
        FLAKY_ATTEMPTS.store(1, Ordering::SeqCst);
        API.get_instance::<Flaky>(()).unwrap();

        API.clear();

        assert!(!API.is_initialized::<Counter>().unwrap());
        assert!(!API.is_initialized::<Flaky>().unwrap());
    }

    #[test]
    #[serial]
    fn test_trace_callback_events() {
        API.clear();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        API.set_trace_callback(move |e| {
            events_clone.lock().unwrap().push(e.to_string());
        });

        API.get_instance::<Counter>(7).unwrap();
        API.get_instance::<Counter>(8).unwrap();
        API.reset_instance::<Counter>().unwrap();

        API.clear_trace_callback();

        let name = std::any::type_name::<Counter>();
        let captured = events.lock().unwrap();
        assert_eq!(
            *captured,
            vec![
                format!("construct {{ type_name: {name}, success: true }}"),
                format!("get {{ type_name: {name}, constructed: true }}"),
                format!("get {{ type_name: {name}, constructed: false }}"),
                format!("reset {{ type_name: {name}, found: true }}"),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_is_initialized_recovers_poisoned_registry() {
        API.clear();
        API.get_instance::<Counter>(4).unwrap();

        let _ = thread::spawn(|| {
            let _map = STORAGE.lock().unwrap();
            panic!("poison the registry map");
        })
        .join();
        assert!(STORAGE.is_poisoned());

        assert_eq!(API.is_initialized::<Counter>(), Ok(true));
        assert_eq!(API.is_initialized::<Flaky>(), Ok(false));
        assert_eq!(API.instance::<Counter>().unwrap().start, 4);

        STORAGE.clear_poison();
    }

    fn spawned_thread_id() -> thread::ThreadId {
        thread::spawn(|| thread::current().id()).join().unwrap()
    }

    #[test]
    fn test_wait_graph_detects_cycles() {
        let me = thread::current().id();
        let other = spawned_thread_id();
        let third = spawned_thread_id();
        let mine = (1, std::any::TypeId::of::<Counter>());
        let theirs = (1, std::any::TypeId::of::<Flaky>());
        let unrelated = (2, std::any::TypeId::of::<Counter>());

        let mut graph = WaitGraph::default();
        graph.builders.insert(mine, me);
        graph.builders.insert(theirs, other);

        // `other` builds `theirs` but is not blocked yet
        assert!(!graph.closes_cycle(theirs, me));

        graph.waiting.insert(other, mine);
        assert!(graph.closes_cycle(theirs, me));

        // A chain through a third thread is still a cycle
        graph.builders.insert(unrelated, third);
        graph.waiting.insert(other, unrelated);
        assert!(!graph.closes_cycle(theirs, me));
        graph.waiting.insert(third, mine);
        assert!(graph.closes_cycle(theirs, me));

        // Slots nobody is building never block
        assert!(!graph.closes_cycle((3, std::any::TypeId::of::<Counter>()), me));
    }
}

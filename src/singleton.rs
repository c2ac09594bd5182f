//! The `Singleton` capability and the process-wide default factory.
//!
//! A type opts in by implementing [`Singleton`]; its provided methods go through
//! [`GLOBAL`], a factory whose storage lives for the whole process.
//!
//! # Examples
//!
//! ```
//! use singleton_factory::Singleton;
//! use std::convert::Infallible;
//! use std::sync::Arc;
//!
//! struct Config {
//!     value: i32,
//! }
//!
//! impl Singleton for Config {
//!     type Args = i32;
//!     type Error = Infallible;
//!
//!     fn construct(value: i32) -> Result<Self, Infallible> {
//!         Ok(Config { value })
//!     }
//! }
//!
//! let first = Config::get_instance(5).unwrap();
//! let second = Config::get_instance(99).unwrap();
//!
//! assert!(Arc::ptr_eq(&first, &second));
//! assert_eq!(second.value, 5);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use crate::{FactoryApi, FactoryError, FactoryEvent, InstanceRegistry, TraceHook};

/// Global storage backing the default factory.
static GLOBAL_STORAGE: InstanceRegistry = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Holds an optional user-defined tracing callback for the default factory.
static GLOBAL_TRACE: TraceHook = LazyLock::new(|| Mutex::new(None));

/// The process-wide factory used by [`Singleton`]'s provided methods.
pub struct GlobalFactory;

impl FactoryApi for GlobalFactory {
    fn storage() -> &'static InstanceRegistry {
        &GLOBAL_STORAGE
    }

    fn trace() -> &'static TraceHook {
        &GLOBAL_TRACE
    }
}

/// Convenient constant for accessing the default factory.
pub const GLOBAL: GlobalFactory = GlobalFactory;

/// Capability marker for types that have at most one instance per factory.
///
/// Identity is the concrete type: two types implementing `Singleton` never share an
/// instance, and a newtype around a singleton is a singleton of its own.
pub trait Singleton: Send + Sync + Sized + 'static {
    /// Arguments consumed by the first, constructing call.
    type Args;

    /// Error returned by a failing constructor.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build the instance. Called at most once per successful initialization.
    fn construct(args: Self::Args) -> Result<Self, Self::Error>;

    /// Get the instance from the default factory, constructing it with `args` on
    /// first use. Later calls ignore `args`.
    fn get_instance(args: Self::Args) -> Result<Arc<Self>, FactoryError<Self::Error>> {
        GLOBAL.get_instance::<Self>(args)
    }

    /// Get the existing instance, if any.
    fn instance() -> Result<Arc<Self>, FactoryError> {
        GLOBAL.instance::<Self>()
    }

    /// Drop the instance so the next `get_instance` constructs again.
    fn reset_instance() -> Result<(), FactoryError> {
        GLOBAL.reset_instance::<Self>()
    }

    /// Check whether the instance exists. A type still being constructed reports
    /// `false` to its own constructor.
    fn is_initialized() -> Result<bool, FactoryError> {
        GLOBAL.is_initialized::<Self>()
    }
}

/// Sets a tracing callback on the default factory.
///
/// # Example
/// ```rust
/// use singleton_factory::{set_trace_callback, FactoryEvent};
///
/// set_trace_callback(|event: &FactoryEvent| println!("[factory-trace] {event}"));
/// ```
pub fn set_trace_callback(callback: impl Fn(&FactoryEvent) + Send + Sync + 'static) {
    GLOBAL.set_trace_callback(callback)
}

/// Clears the tracing callback of the default factory.
pub fn clear_trace_callback() {
    GLOBAL.clear_trace_callback()
}

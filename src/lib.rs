//! # Singleton Factory
//!
//! A thread-safe generic singleton factory: any type can opt in to having at most one
//! instance per concrete type, constructed lazily on first request.
//!
//! ## Quick Start
//!
//! ```rust
//! use singleton_factory::Singleton;
//! use std::convert::Infallible;
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! impl Singleton for Logger {
//!     type Args = ();
//!     type Error = Infallible;
//!
//!     fn construct(_: ()) -> Result<Self, Infallible> {
//!         Ok(Logger)
//!     }
//! }
//!
//! let a = Logger::get_instance(()).unwrap();
//! let b = Logger::get_instance(()).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! ```
//!
//! ## Features
//!
//! - **Per-type isolation**: instances are keyed by the concrete type's `TypeId`
//! - **First call wins**: construction arguments are honored only on the first call
//! - **Failure rollback**: a failing constructor records nothing; the next call retries
//! - **Thread-safe**: concurrent first calls construct exactly once, and each type has its own lock
//! - **Tracing support**: event callbacks per factory, plus `tracing` logs behind the `tracing` feature
//!
//! ## Main Items
//!
//! - [`Singleton`] - the capability a type implements to opt in
//! - [`FactoryApi`] - factory operations, implemented by [`GlobalFactory`] and by [`define_factory!`]
//! - [`FactoryError`] - construction and misuse errors
//! - [`FactoryEvent`] - events delivered to trace callbacks

mod factory_error;
mod factory_event;
mod factory_trait;
mod macros;
mod singleton;

pub use factory_error::FactoryError;
pub use factory_event::FactoryEvent;
pub use factory_trait::{FactoryApi, InstanceRegistry, InstanceSlot, TraceCallback, TraceHook};
pub use singleton::{clear_trace_callback, set_trace_callback, GlobalFactory, Singleton, GLOBAL};

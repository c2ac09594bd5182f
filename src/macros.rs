//! Macros for creating isolated singleton factories.

/// Creates a complete, isolated singleton factory with a single macro invocation.
///
/// The macro generates a module containing:
/// - Storage static (hidden)
/// - Trace callback static (hidden)
/// - An `Api` struct that implements `FactoryApi`
/// - Free functions delegating to it
///
/// A type gets one instance per factory, so the same `Singleton` type can live in
/// several factories at once.
///
/// # Examples
///
/// ```rust
/// use singleton_factory::{define_factory, Singleton};
/// use std::convert::Infallible;
/// use std::sync::Arc;
///
/// struct Pool {
///     size: usize,
/// }
///
/// impl Singleton for Pool {
///     type Args = usize;
///     type Error = Infallible;
///
///     fn construct(size: usize) -> Result<Self, Infallible> {
///         Ok(Pool { size })
///     }
/// }
///
/// define_factory!(primary);
/// define_factory!(replica);
///
/// let a: Arc<Pool> = primary::get_instance(8).unwrap();
/// let b: Arc<Pool> = replica::get_instance(2).unwrap();
///
/// assert_eq!(a.size, 8);
/// assert_eq!(b.size, 2);
/// assert!(!Arc::ptr_eq(&a, &b));
/// ```
#[macro_export]
macro_rules! define_factory {
    ($name:ident) => {
        pub mod $name {
            use std::sync::Arc;

            // Storage for constructed instances (module-private)
            static STORAGE: $crate::InstanceRegistry = ::std::sync::LazyLock::new(|| {
                ::std::sync::Mutex::new(::std::collections::HashMap::new())
            });

            // Trace callback storage (module-private)
            static TRACE: $crate::TraceHook =
                ::std::sync::LazyLock::new(|| ::std::sync::Mutex::new(None));

            /// Zero-sized type that implements the factory API.
            pub struct Api;

            impl $crate::FactoryApi for Api {
                fn storage() -> &'static $crate::InstanceRegistry {
                    &STORAGE
                }

                fn trace() -> &'static $crate::TraceHook {
                    &TRACE
                }
            }

            /// Convenient constant for trait-based access.
            pub const API: Api = Api;

            /// Get the instance of `T`, constructing it with `args` on first use.
            pub fn get_instance<T: $crate::Singleton>(
                args: T::Args,
            ) -> Result<Arc<T>, $crate::FactoryError<T::Error>> {
                use $crate::FactoryApi;
                API.get_instance::<T>(args)
            }

            /// Get the existing instance of `T` without constructing it.
            pub fn instance<T: $crate::Singleton>() -> Result<Arc<T>, $crate::FactoryError> {
                use $crate::FactoryApi;
                API.instance::<T>()
            }

            /// Drop the instance of `T`.
            pub fn reset_instance<T: $crate::Singleton>() -> Result<(), $crate::FactoryError> {
                use $crate::FactoryApi;
                API.reset_instance::<T>()
            }

            /// Check whether `T` has an instance in this factory.
            pub fn is_initialized<T: $crate::Singleton>() -> Result<bool, $crate::FactoryError> {
                use $crate::FactoryApi;
                API.is_initialized::<T>()
            }

            /// Set a tracing callback for this factory.
            pub fn set_trace_callback(
                callback: impl Fn(&$crate::FactoryEvent) + Send + Sync + 'static,
            ) {
                use $crate::FactoryApi;
                API.set_trace_callback(callback)
            }

            /// Clear the tracing callback.
            pub fn clear_trace_callback() {
                use $crate::FactoryApi;
                API.clear_trace_callback()
            }

            #[doc(hidden)]
            pub fn clear() {
                use $crate::FactoryApi;
                API.clear()
            }
        }
    };
}

use std::convert::Infallible;

use thiserror::Error;

/// Errors returned by factory operations.
///
/// `E` is the construction error of the singleton type. Operations that never
/// run a constructor (`instance`, `reset_instance`, `is_initialized`) use the
/// default `Infallible`.
#[derive(Debug, Error, PartialEq)]
pub enum FactoryError<E = Infallible> {
    /// The constructor failed. Nothing was recorded, so the next call retries.
    #[error("failed to construct singleton {type_name}: {source}")]
    Construction { type_name: &'static str, source: E },

    /// The type has no instance yet.
    #[error("singleton {type_name} has not been initialized")]
    NotInitialized { type_name: &'static str },

    /// The type's constructor called back into its own slot.
    #[error("singleton {type_name} was requested while it was being constructed")]
    Reentrant { type_name: &'static str },

    /// Waiting for the type would close a cycle of constructors blocked on each other
    /// across threads.
    #[error("singleton {type_name} is being constructed by a thread that waits on this one")]
    Cycle { type_name: &'static str },

    #[error("type mismatch in factory for {type_name}")]
    TypeMismatch { type_name: &'static str },
}

impl<E> FactoryError<E> {
    /// Returns the constructor's error, if this is a construction failure.
    pub fn into_construction(self) -> Option<E> {
        match self {
            FactoryError::Construction { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Name of the singleton type the error refers to.
    pub fn type_name(&self) -> &'static str {
        match self {
            FactoryError::Construction { type_name, .. }
            | FactoryError::NotInitialized { type_name }
            | FactoryError::Reentrant { type_name }
            | FactoryError::Cycle { type_name }
            | FactoryError::TypeMismatch { type_name } => type_name,
        }
    }

    /// Re-types an error that cannot carry a construction failure.
    pub(crate) fn widen(err: FactoryError) -> Self {
        match err {
            FactoryError::Construction { source, .. } => match source {},
            FactoryError::NotInitialized { type_name } => FactoryError::NotInitialized { type_name },
            FactoryError::Reentrant { type_name } => FactoryError::Reentrant { type_name },
            FactoryError::Cycle { type_name } => FactoryError::Cycle { type_name },
            FactoryError::TypeMismatch { type_name } => FactoryError::TypeMismatch { type_name },
        }
    }
}

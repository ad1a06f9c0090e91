#![forbid(unsafe_code)]

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectError>;

#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    #[error(
        "could not find a store in either the context or props of \"{display_name}\"; \
         either wrap the root component in a Provider, or pass a store explicitly to \"{display_name}\""
    )]
    MissingStore { display_name: String },

    #[error("{option} has been removed: {hint}")]
    RemovedOption {
        option: &'static str,
        hint: &'static str,
    },

    #[error("invalid connect option: {message}")]
    InvalidOption { message: String },

    #[error("selector for \"{display_name}\" failed: {source}")]
    Selector {
        display_name: String,
        source: SelectorError,
    },

    #[error("selector for \"{display_name}\" has not produced props")]
    NoProps { display_name: String },
}

impl ConnectError {
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }

    /// The captured mapping-function error, if this is a selector failure.
    #[must_use]
    pub fn selector_error(&self) -> Option<&SelectorError> {
        match self {
            Self::Selector { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the error was raised while constructing a connector or an
    /// instance.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingStore { .. } | Self::RemovedOption { .. } | Self::InvalidOption { .. }
        )
    }
}

/// An error produced by a mapping function.
///
/// Cheap to clone; clones share the underlying error so the exact value that
/// the mapping function returned can be re-raised at render time.
#[derive(Clone)]
pub struct SelectorError {
    inner: Rc<dyn StdError + 'static>,
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl SelectorError {
    pub fn new<E: StdError + 'static>(error: E) -> Self {
        Self {
            inner: Rc::new(error),
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Whether both values share the same underlying error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn get_ref(&self) -> &(dyn StdError + 'static) {
        &*self.inner
    }

    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl fmt::Debug for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SelectorError").field(&self.inner).finish()
    }
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for SelectorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

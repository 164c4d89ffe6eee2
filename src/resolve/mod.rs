//! Resolution protocol and the default property resolver
//!
//! Both document engines only ever talk to a [`Resolver`]: a narrow capability
//! that maps a placeholder name to optional [`Data`]. Resolvers are scoped; a
//! resolver over a container yields child resolvers for its elements, and
//! scoping is the only way a name changes meaning between nesting levels.
//!
//! Returning `Ok(None)` means "not found" and is always recoverable. A broken
//! accessor is a [`ResolveError`] instead, so callers can keep using emptiness
//! for fallback logic without hiding real faults.

mod format;
mod property;
mod registry;
mod scope;
mod value;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use format::{Formatter, Formatters, Locale, Translator};
pub use property::{PropertyResolver, ResolutionSettings};
pub use registry::{CustomPlaceholder, CustomRegistry, RegistryError};
pub use scope::IterationScope;
pub use value::{
    AccessError, Completer, Deferred, DeferredOutcome, DynamicMethod, Properties, Record, Value,
    ValueKind,
};

/// Capability contract consumed by both engines
pub trait Resolver: Send + Sync {
    /// Resolve a placeholder name in this scope
    fn resolve(&self, name: &str) -> Result<Option<Data>, ResolveError>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn resolve(&self, name: &str) -> Result<Option<Data>, ResolveError> {
        (**self).resolve(name)
    }
}

/// Result of resolving a name
#[derive(Clone)]
pub enum Data {
    /// Plain text; never mutates anything
    Scalar(String),
    /// Ordered child scopes; the only valid loop target
    Set(ResolverSet),
    /// A handler that edits the document itself
    Custom(Custom),
}

impl Data {
    pub fn scalar(text: impl Into<String>) -> Self {
        Data::Scalar(text.into())
    }

    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Data::Scalar(_) => "scalar",
            Data::Set(_) => "set",
            Data::Custom(_) => "custom",
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Data::Scalar(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::Scalar(text) => f.debug_tuple("Scalar").field(text).finish(),
            Data::Set(set) => f.debug_struct("Set").field("count", &set.count()).finish(),
            Data::Custom(custom) => f.debug_struct("Custom").field("name", &custom.name).finish(),
        }
    }
}

/// Ordered child resolvers of a [`Data::Set`]
#[derive(Clone, Default)]
pub struct ResolverSet {
    children: Vec<Arc<dyn Resolver>>,
}

impl ResolverSet {
    pub fn new(children: Vec<Arc<dyn Resolver>>) -> Self {
        Self { children }
    }

    /// A set wrapping exactly one scope
    pub fn single(child: Arc<dyn Resolver>) -> Self {
        Self {
            children: vec![child],
        }
    }

    /// Number of children
    pub fn count(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self) -> &[Arc<dyn Resolver>] {
        &self.children
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Resolver>> {
        self.children.iter()
    }
}

/// A custom placeholder bound to the scope it was resolved in
#[derive(Clone)]
pub struct Custom {
    name: String,
    handler: Arc<dyn CustomPlaceholder>,
    scope: Arc<dyn Resolver>,
}

impl Custom {
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn CustomPlaceholder>,
        scope: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            scope,
        }
    }

    /// Placeholder name the handler was registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Arc<dyn CustomPlaceholder> {
        &self.handler
    }

    /// Scope without the custom registry, so the handler can read its own data
    pub fn scope(&self) -> &Arc<dyn Resolver> {
        &self.scope
    }
}

/// A failure while reading data, distinct from "not found"
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to read property '{name}': {source}")]
    Fault {
        name: String,
        #[source]
        source: AccessError,
    },
}

impl ResolveError {
    pub fn fault(name: impl Into<String>, source: AccessError) -> Self {
        Self::Fault {
            name: name.into(),
            source,
        }
    }
}

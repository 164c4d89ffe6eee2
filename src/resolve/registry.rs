//! Registry of custom placeholder handlers

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::GenerateError;
use crate::sheet::{CellContext, Modification};
use crate::word::BlockContext;

/// Errors that can occur while registering handlers
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A handler is already registered under this name
    #[error("duplicate custom placeholder: {name}")]
    Duplicate { name: String },
}

/// A placeholder whose replacement is produced by a handler
///
/// Each engine calls its own entry point; a handler only implements the ones
/// that make sense for it.
pub trait CustomPlaceholder: Send + Sync {
    /// Edit the word document around the marker block
    ///
    /// The handler owns the tree edits, including removing the marker block.
    fn transform_block(&self, ctx: &mut BlockContext<'_>) -> Result<(), GenerateError> {
        Err(GenerateError::unsupported(format!(
            "custom placeholder '{}' in a word document",
            ctx.name()
        )))
    }

    /// Write the cells replacing a spreadsheet marker cell
    fn transform_cell(&self, ctx: &mut CellContext<'_>) -> Result<Modification, GenerateError> {
        Err(GenerateError::unsupported(format!(
            "custom placeholder '{}' in a spreadsheet",
            ctx.name()
        )))
    }
}

type HandlerFactory = Arc<dyn Fn() -> Box<dyn CustomPlaceholder> + Send + Sync>;

/// Maps placeholder names to handler constructors
#[derive(Clone, Default)]
pub struct CustomRegistry {
    handlers: HashMap<String, HandlerFactory>,
}

impl CustomRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler type, constructed with no arguments on every use
    pub fn register<H>(&mut self, name: impl Into<String>) -> Result<(), RegistryError>
    where
        H: CustomPlaceholder + Default + 'static,
    {
        self.register_factory(name, || Box::new(H::default()) as Box<dyn CustomPlaceholder>)
    }

    /// Register a handler constructor
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn CustomPlaceholder> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.handlers.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Builder form of [`register`](Self::register); a later entry replaces an earlier one
    pub fn with<H>(mut self, name: impl Into<String>) -> Self
    where
        H: CustomPlaceholder + Default + 'static,
    {
        self.handlers
            .insert(name.into(), Arc::new(|| Box::new(H::default()) as Box<dyn CustomPlaceholder>));
        self
    }

    /// Construct the handler registered under an exact name
    pub fn create(&self, name: &str) -> Option<Arc<dyn CustomPlaceholder>> {
        self.handlers.get(name).map(|factory| Arc::from(factory()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Get all registered names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for CustomRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("CustomRegistry").field("handlers", &names).finish()
    }
}

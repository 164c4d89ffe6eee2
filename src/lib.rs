//! docstamp - fill Word and Excel templates from structured data
//!
//! Templates carry `{{name}}` placeholders. Inline placeholders are replaced
//! with resolved text; a paragraph or row holding only `{{name}}` opens a
//! loop that repeats everything up to `{{/name}}` once per element of a set,
//! or hands the block to a registered custom handler.
//!
//! # Example
//!
//! ```rust,no_run
//! use docstamp::resolve::Record;
//! use docstamp::{generate, GenerateConfig, Template};
//!
//! let template = Template::from_path("invoice.docx").unwrap();
//! let config = GenerateConfig::new();
//! let resolver = config.resolver(Record::new("invoice").with("number", "2024-001"));
//! let path = generate(&template, &resolver, &config).unwrap();
//! println!("{}", path.display());
//! ```

pub mod error;
pub mod generation;
pub mod image;
pub mod options;
pub mod package;
pub mod placeholder;
pub mod resolve;
pub mod sheet;
pub mod template;
pub mod word;
pub mod xml;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use error::{GenerateError, TemplateError};
pub use generation::{
    generate, render, spawn, GeneratedDocument, GenerationHandle, GenerationStatus, PostProcessor,
};
pub use image::{DefaultImageStrategy, ImageStrategy};
pub use options::{GenerationOptions, OptionsError};
pub use resolve::{CustomRegistry, Data, PropertyResolver, Resolver, Value};
pub use template::{Template, TemplateFormat};

/// Everything a generation run needs besides the template and the data
#[derive(Clone)]
pub struct GenerateConfig {
    /// Locale, value formats and translations
    pub options: GenerationOptions,
    /// Loads and embeds images for image placeholders
    pub images: Arc<dyn ImageStrategy>,
    /// Custom placeholder handlers, by name
    pub registry: CustomRegistry,
    /// Hook run on the finished document
    pub post_processor: Option<Arc<dyn PostProcessor>>,
    /// Directory for the generated file; the system temp directory when unset
    pub output_dir: Option<PathBuf>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            options: GenerationOptions::default(),
            images: Arc::new(DefaultImageStrategy::default()),
            registry: CustomRegistry::default(),
            post_processor: None,
            output_dir: None,
        }
    }
}

impl fmt::Debug for GenerateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateConfig")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("post_processor", &self.post_processor.is_some())
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl GenerateConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the image strategy
    pub fn with_images(mut self, images: impl ImageStrategy + 'static) -> Self {
        self.images = Arc::new(images);
        self
    }

    pub fn with_registry(mut self, registry: CustomRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the hook run on the finished document
    pub fn with_post_processor(mut self, hook: impl PostProcessor + 'static) -> Self {
        self.post_processor = Some(Arc::new(hook));
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// A root resolver over `value` using these options and this registry
    pub fn resolver(&self, value: impl Into<Value>) -> PropertyResolver {
        let settings = self.options.resolution_settings(self.registry.clone());
        PropertyResolver::with_settings(value, Arc::new(settings))
    }
}

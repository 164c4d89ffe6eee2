//! Error types for template generation

use thiserror::Error;

use crate::image::ImageError;
use crate::package::PackageError;
use crate::resolve::ResolveError;
use crate::xml::XmlError;

/// Template and data disagree about loop structure
///
/// These are fatal: continuing would leave a half-unrolled document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A loop start marker with no matching end marker
    #[error("loop '{name}' has no matching end marker '{{{{/{name}}}}}'")]
    MissingLoopEnd { name: String },

    /// A loop marker pair whose name resolves to something other than a set
    #[error("loop '{name}' must resolve to a set, found {found}")]
    NotASet { name: String, found: &'static str },

    /// An end marker with no start marker before it
    #[error("end marker '{{{{/{name}}}}}' has no matching start marker")]
    UnmatchedLoopEnd { name: String },
}

/// Errors that can occur during a generation run
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("malformed template: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("package error: {0}")]
    Package(#[from] PackageError),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported: {what}")]
    Unsupported { what: String },

    /// The direct sink only accepts strictly increasing row indices
    #[error("row {row} written after row {last}")]
    RowOrder { row: u32, last: u32 },

    #[error("post-processing failed: {0}")]
    Hook(String),

    #[error("generation worker stopped before reporting a result")]
    WorkerLost,
}

impl GenerateError {
    /// Create an I/O error tagged with the operation that failed
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// Whether the failure comes from the template/data loop structure
    pub fn is_malformed_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_text_in_messages() {
        let err = TemplateError::MissingLoopEnd {
            name: "items".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "loop 'items' has no matching end marker '{{/items}}'"
        );

        let err = TemplateError::UnmatchedLoopEnd {
            name: "rows".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "end marker '{{/rows}}' has no matching start marker"
        );
    }

    #[test]
    fn test_malformed_classification() {
        let err = GenerateError::from(TemplateError::NotASet {
            name: "x".to_string(),
            found: "scalar",
        });
        assert!(err.is_malformed_template());
        assert!(!GenerateError::unsupported("thing").is_malformed_template());
    }
}

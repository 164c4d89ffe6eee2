//! Template bytes and their declared format

use std::fs;
use std::path::Path;

use crate::error::GenerateError;

/// Document family a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateFormat {
    /// WordprocessingML (`.docx`)
    Word,
    /// SpreadsheetML (`.xlsx`)
    Spreadsheet,
}

impl TemplateFormat {
    /// Detect the format from a file extension, case-insensitively
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "docx" | "dotx" | "docm" => Some(TemplateFormat::Word),
            "xlsx" | "xltx" | "xlsm" => Some(TemplateFormat::Spreadsheet),
            _ => None,
        }
    }

    /// Extension used for generated artifacts
    pub fn output_extension(self) -> &'static str {
        match self {
            TemplateFormat::Word => "docx",
            TemplateFormat::Spreadsheet => "xlsx",
        }
    }
}

/// Immutable template content plus its format
#[derive(Debug, Clone)]
pub struct Template {
    bytes: Vec<u8>,
    format: TemplateFormat,
}

impl Template {
    pub fn new(bytes: impl Into<Vec<u8>>, format: TemplateFormat) -> Self {
        Self {
            bytes: bytes.into(),
            format,
        }
    }

    /// Read a template file, detecting the format from its extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GenerateError> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(TemplateFormat::from_extension)
            .ok_or_else(|| {
                GenerateError::unsupported(format!("template file type of {}", path.display()))
            })?;
        let bytes = fs::read(path)
            .map_err(|e| GenerateError::io(format!("reading template {}", path.display()), e))?;
        Ok(Self::new(bytes, format))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> TemplateFormat {
        self.format
    }
}

//! Word-processing engine
//!
//! Walks the content blocks of the main document part and of every header and
//! footer. Paragraphs get inline substitution; a paragraph holding only
//! `{{name}}` either opens a loop (when `name` resolves to a set and a
//! matching `{{/name}}` follows at the same level) or hands the block to a
//! custom handler. Tables recurse into the blocks of each cell.

mod document;
mod engine;
mod image;
mod text;

pub use document::WordDocument;
pub use engine::{BlockContext, WordEngine};
pub use image::ImagePlaceholder;

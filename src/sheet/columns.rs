//! Lazy capture of template column definitions

use super::model::{Column, Worksheet};
use super::styles::StyleCopier;

/// Tracks the column span rows have touched and the definitions captured for it
///
/// Column formats are only copied for columns some row actually reaches,
/// and each column is captured once, when the span first grows over it.
#[derive(Debug, Default)]
pub struct ColumnTracker {
    span: Option<(u32, u32)>,
    captured: Vec<Column>,
}

impl ColumnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a row wrote to `column`
    pub fn touch(&mut self, column: u32, sheet: &Worksheet, styles: &mut StyleCopier) {
        let fresh = match self.span {
            None => {
                self.span = Some((column, column));
                column..=column
            }
            Some((min, max)) if column < min => {
                self.span = Some((column, max));
                column..=min - 1
            }
            Some((min, max)) if column > max => {
                self.span = Some((min, column));
                max + 1..=column
            }
            Some(_) => return,
        };
        for c in fresh {
            if let Some(def) = sheet.column_at(c) {
                self.captured.push(Column {
                    min: c,
                    max: c,
                    width: def.width.clone(),
                    style: def.style.map(|s| styles.map(s)),
                    hidden: def.hidden,
                });
            }
        }
    }

    /// Captured definitions in column order, adjacent equal columns merged
    pub fn columns(&self) -> Vec<Column> {
        let mut sorted = self.captured.clone();
        sorted.sort_by_key(|c| c.min);
        let mut merged: Vec<Column> = Vec::with_capacity(sorted.len());
        for column in sorted {
            match merged.last_mut() {
                Some(last)
                    if last.max + 1 == column.min
                        && last.width == column.width
                        && last.style == column.style
                        && last.hidden == column.hidden =>
                {
                    last.max = column.max;
                }
                _ => merged.push(column),
            }
        }
        merged
    }
}

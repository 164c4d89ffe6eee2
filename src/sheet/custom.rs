//! Custom placeholders in spreadsheet cells

use super::model::{Cell, CellValue};
use crate::error::GenerateError;
use crate::resolve::{Custom, CustomPlaceholder, Data, Resolver};

/// Column span a custom cell consumed or produced
///
/// Records fold left to right across a row: offsets add up and the latest
/// skip bound wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modification {
    /// Skip template cells left of this template column
    pub skip_until: Option<u32>,
    /// Shift applied to every later cell in the row
    pub column_offset: i32,
}

impl Modification {
    pub fn offset(column_offset: i32) -> Self {
        Self {
            skip_until: None,
            column_offset,
        }
    }

    pub fn skip_until(column: u32) -> Self {
        Self {
            skip_until: Some(column),
            column_offset: 0,
        }
    }

    /// Combine with the record of a cell further right
    pub fn then(self, next: Modification) -> Self {
        Self {
            skip_until: next.skip_until.or(self.skip_until),
            column_offset: self.column_offset + next.column_offset,
        }
    }
}

/// What a custom handler sees of the spreadsheet row being written
pub struct CellContext<'a> {
    pub(crate) custom: &'a Custom,
    pub(crate) template: &'a Cell,
    pub(crate) row: u32,
    pub(crate) column: u32,
    pub(crate) style: u32,
    pub(crate) fallback: &'a str,
    pub(crate) cells: &'a mut Vec<Cell>,
}

impl<'a> CellContext<'a> {
    /// Name of the placeholder being replaced
    pub fn name(&self) -> &str {
        self.custom.name()
    }

    /// Scope the placeholder was resolved in, without custom handlers
    pub fn scope(&self) -> &dyn Resolver {
        self.custom.scope().as_ref()
    }

    /// Output row being written
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Output column of the marker cell
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Output format of the marker cell
    pub fn style(&self) -> u32 {
        self.style
    }

    /// The marker cell as it appears in the template
    pub fn template_cell(&self) -> &Cell {
        self.template
    }

    pub fn fallback(&self) -> &'a str {
        self.fallback
    }

    /// Write a value `delta` columns right of the marker, in the marker's format
    pub fn write(&mut self, delta: u32, value: CellValue) {
        let cell = Cell::new(self.column + delta, value).with_style(self.style);
        self.cells.push(cell);
    }

    pub fn write_text(&mut self, delta: u32, text: impl Into<String>) {
        self.write(delta, CellValue::Text(text.into()));
    }
}

/// Spreads a set over consecutive columns, one element per cell
///
/// Each element renders its `this` text. A scalar fills the marker cell
/// alone, and anything else renders the fallback text.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListColumns;

impl CustomPlaceholder for ListColumns {
    fn transform_cell(&self, ctx: &mut CellContext<'_>) -> Result<Modification, GenerateError> {
        match ctx.scope().resolve(ctx.name())? {
            Some(Data::Set(set)) => {
                for (i, element) in set.iter().enumerate() {
                    let text = match element.resolve("this")? {
                        Some(Data::Scalar(text)) => text,
                        _ => ctx.fallback().to_string(),
                    };
                    ctx.write_text(i as u32, text);
                }
                Ok(Modification::offset(set.count() as i32 - 1))
            }
            Some(Data::Scalar(text)) => {
                ctx.write_text(0, text);
                Ok(Modification::default())
            }
            _ => {
                let fallback = ctx.fallback();
                ctx.write_text(0, fallback);
                Ok(Modification::default())
            }
        }
    }
}

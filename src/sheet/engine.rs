//! Streaming row rewrite with loop buffering and replay

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::columns::ColumnTracker;
use super::custom::{CellContext, Modification};
use super::ledger::RowLedger;
use super::model::{Cell, CellValue, Row, RowFormat, Worksheet};
use super::reader::Workbook;
use super::sink::{DirectSink, LoopBuffer, SinkStack};
use super::styles::StyleCopier;
use super::writer::SpreadsheetDocument;
use crate::error::{GenerateError, TemplateError};
use crate::placeholder::{self, Marker};
use crate::resolve::{Data, IterationScope, Resolver, ResolverSet};

/// Renders spreadsheet templates against a resolver
pub struct SpreadsheetEngine<'a> {
    fallback: &'a str,
}

impl Default for SpreadsheetEngine<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SpreadsheetEngine<'a> {
    pub fn new() -> Self {
        Self {
            fallback: placeholder::FALLBACK,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a str) -> Self {
        self.fallback = fallback;
        self
    }

    /// Render every sheet, in workbook order, into a new document
    pub fn render(&self, workbook: &Workbook, resolver: &dyn Resolver) -> Result<SpreadsheetDocument, GenerateError> {
        let mut styles = StyleCopier::new(workbook.styles.clone());
        let mut stack = SinkStack::new(DirectSink::new());

        for sheet in &workbook.sheets {
            debug!(sheet = %sheet.name, rows = sheet.rows.len(), "processing sheet");
            let mut run = SheetRun {
                sheet,
                stack: &mut stack,
                styles: &mut styles,
                ledger: RowLedger::new(),
                columns: ColumnTracker::new(),
                loop_ends: loop_ends(sheet),
                fallback: self.fallback,
            };
            run.stack.active().begin_sheet(&sheet.name)?;
            for row in &sheet.rows {
                run.feed_row(row, resolver)?;
            }
            if let Some(open) = run.stack.pop() {
                return Err(TemplateError::MissingLoopEnd { name: open.name }.into());
            }
            run.stack.active().complete()?;

            let columns = run.columns.columns();
            if let Some(out) = run.stack.direct_mut().sheet_mut() {
                out.columns = columns;
            }
        }

        debug!(created_styles = styles.cache().created_count(), "spreadsheet rendered");
        Ok(SpreadsheetDocument {
            sheets: stack.into_direct().into_sheets(),
            styles: styles.finish(),
        })
    }
}

/// Loop marker of a row that holds nothing else
fn row_marker(row: &Row) -> Option<Marker<'_>> {
    row.sole_text().and_then(placeholder::sole_marker)
}

/// Start row index to matching end row index, for every well-formed pair
fn loop_ends(sheet: &Worksheet) -> HashMap<u32, u32> {
    let mut ends = HashMap::new();
    for (i, row) in sheet.rows.iter().enumerate() {
        let Some(Marker::Start(name)) = row_marker(row) else {
            continue;
        };
        let mut depth = 0usize;
        for later in &sheet.rows[i + 1..] {
            match row_marker(later) {
                Some(Marker::Start(inner)) if inner == name => depth += 1,
                Some(Marker::End(inner)) if inner == name => {
                    if depth == 0 {
                        ends.insert(row.index, later.index);
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }
    ends
}

/// What to do with a row while a loop body is being recorded
enum Recording {
    Record,
    Close,
}

/// State of one sheet being rendered
struct SheetRun<'r> {
    sheet: &'r Worksheet,
    stack: &'r mut SinkStack,
    styles: &'r mut StyleCopier,
    ledger: RowLedger,
    columns: ColumnTracker,
    loop_ends: HashMap<u32, u32>,
    fallback: &'r str,
}

impl SheetRun<'_> {
    fn feed_row(&mut self, row: &Row, resolver: &dyn Resolver) -> Result<(), GenerateError> {
        let marker = row_marker(row);

        if let Some(buffer) = self.stack.recording() {
            let action = match marker {
                Some(Marker::Start(name)) if name == buffer.name => {
                    buffer.nesting += 1;
                    Recording::Record
                }
                Some(Marker::End(name)) if name == buffer.name => {
                    if buffer.nesting == 0 {
                        Recording::Close
                    } else {
                        buffer.nesting -= 1;
                        Recording::Record
                    }
                }
                _ => Recording::Record,
            };
            return match action {
                Recording::Record => self.record(row),
                Recording::Close => self.close_loop(row),
            };
        }

        match marker {
            Some(Marker::End(name)) => Err(TemplateError::UnmatchedLoopEnd {
                name: name.to_string(),
            }
            .into()),
            Some(Marker::Start(name)) => {
                let end = self.loop_ends.get(&row.index).copied();
                match (resolver.resolve(name)?, end) {
                    (Some(Data::Set(set)), Some(end)) => self.open_loop(row, name, set, end),
                    (None, Some(end)) => self.open_loop(row, name, ResolverSet::default(), end),
                    (Some(Data::Set(_)), None) => Err(TemplateError::MissingLoopEnd {
                        name: name.to_string(),
                    }
                    .into()),
                    (Some(other), Some(_)) => Err(TemplateError::NotASet {
                        name: name.to_string(),
                        found: other.kind_name(),
                    }
                    .into()),
                    _ => self.emit_row(row, resolver),
                }
            }
            None => self.emit_row(row, resolver),
        }
    }

    /// Copy a template row into the open loop buffer as is
    fn record(&mut self, row: &Row) -> Result<(), GenerateError> {
        let sink = self.stack.active();
        sink.begin_row(row.index, &row.format)?;
        for cell in &row.cells {
            sink.add_cell(cell.clone())?;
        }
        Ok(())
    }

    fn open_loop(&mut self, row: &Row, name: &str, set: ResolverSet, end: u32) -> Result<(), GenerateError> {
        self.emit_marker_row(row)?;
        debug!(name, iterations = set.count(), start = row.index, end, "buffering loop body");
        self.stack.push(LoopBuffer::new(name, set, row.index, end));
        Ok(())
    }

    /// Replay the buffered body once per element, then write the end marker slot
    fn close_loop(&mut self, end_row: &Row) -> Result<(), GenerateError> {
        let Some(buffer) = self.stack.pop() else {
            return Ok(());
        };
        let body_len = buffer.body_len();
        let LoopBuffer { name, set, sink, .. } = buffer;
        let rows = sink.into_rows();

        self.ledger.open(body_len);
        for (index, element) in set.iter().enumerate() {
            self.ledger.begin_iteration();
            trace!(name = %name, index, offset = self.ledger.offset(), "replaying loop iteration");
            let scope = IterationScope::new(Arc::clone(element), &name);
            for row in &rows {
                self.feed_row(row, &scope)?;
            }
            self.ledger.end_iteration();
        }
        if let Some(closed) = self.ledger.close() {
            debug!(name = %name, iterations = set.count(), row_delta = closed.rows_written_delta, "loop closed");
        }
        self.emit_marker_row(end_row)
    }

    fn begin_output_row(&mut self, row: &Row) -> Result<Option<u32>, GenerateError> {
        let index = self.ledger.output_row(row.index);
        let Ok(index) = u32::try_from(index) else {
            return Err(GenerateError::unsupported(format!(
                "template row {} moved above the first row",
                row.index + 1
            )));
        };
        if !self.ledger.consume(row.index) {
            debug!(row = row.index, "template row already written in this iteration");
            return Ok(None);
        }
        let format = RowFormat {
            style: row.format.style.map(|s| self.styles.map(s)),
            ..row.format.clone()
        };
        self.stack.active().begin_row(index, &format)?;

        let merges: Vec<_> = self
            .sheet
            .merges
            .iter()
            .filter(|m| m.first_row == row.index)
            .map(|m| m.moved_to(index))
            .collect();
        if let Some(out) = self.stack.direct_mut().sheet_mut() {
            out.merges.extend(merges);
        }
        Ok(Some(index))
    }

    /// Loop marker rows keep their slot but lose their content
    fn emit_marker_row(&mut self, row: &Row) -> Result<(), GenerateError> {
        self.begin_output_row(row).map(|_| ())
    }

    fn emit_row(&mut self, row: &Row, resolver: &dyn Resolver) -> Result<(), GenerateError> {
        let Some(index) = self.begin_output_row(row)? else {
            return Ok(());
        };

        let mut modification = Modification::default();
        let mut cells = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            if modification.skip_until.is_some_and(|limit| cell.column < limit) {
                continue;
            }
            let column = i64::from(cell.column) + i64::from(modification.column_offset);
            let Ok(column) = u32::try_from(column) else {
                continue;
            };
            let style = self.styles.map(cell.style);
            if let Some(next) = self.render_cell(cell, index, column, style, resolver, &mut cells)? {
                modification = modification.then(next);
            }
        }

        for cell in cells {
            self.columns.touch(cell.column, self.sheet, self.styles);
            self.stack.active().add_cell(cell)?;
        }
        Ok(())
    }

    /// Write one template cell; custom placeholders report their column span
    fn render_cell(
        &mut self,
        cell: &Cell,
        row: u32,
        column: u32,
        style: u32,
        resolver: &dyn Resolver,
        out: &mut Vec<Cell>,
    ) -> Result<Option<Modification>, GenerateError> {
        let text = cell.value.as_text();
        let text_has = text.is_some_and(placeholder::has_placeholder);
        let formula_has = cell.formula.as_deref().is_some_and(placeholder::has_placeholder);
        let mut rendered = Cell {
            column,
            style,
            ..cell.clone()
        };
        if !text_has && !formula_has {
            out.push(rendered);
            return Ok(None);
        }

        if cell.formula.is_none() {
            if let Some(Marker::Start(name)) = text.and_then(placeholder::sole_marker) {
                if let Some(Data::Custom(custom)) = resolver.resolve(name)? {
                    trace!(name, row, column, "running custom cell handler");
                    let mut ctx = CellContext {
                        custom: &custom,
                        template: cell,
                        row,
                        column,
                        style,
                        fallback: self.fallback,
                        cells: &mut *out,
                    };
                    return custom.handler().transform_cell(&mut ctx).map(Some);
                }
            }
        }

        let fallback = self.fallback;
        let lookup = |name: &str| -> Result<Option<String>, GenerateError> {
            Ok(match resolver.resolve(name)? {
                Some(Data::Scalar(text)) => Some(text),
                _ => None,
            })
        };
        if let Some(formula) = cell.formula.as_deref().filter(|_| formula_has) {
            rendered.formula = Some(placeholder::replace_inline(formula, fallback, lookup)?);
            // The cached result belongs to the template formula.
            rendered.value = CellValue::Empty;
        } else if let Some(text) = text.filter(|_| text_has) {
            rendered.value = CellValue::Text(placeholder::replace_inline(text, fallback, lookup)?);
        }
        out.push(rendered);
        Ok(None)
    }
}

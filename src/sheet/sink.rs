//! Output sinks and the stack that switches between them

use std::collections::BTreeMap;

use super::model::{Cell, Column, Merge, Row, RowFormat};
use crate::error::GenerateError;
use crate::resolve::ResolverSet;

/// Destination of emitted rows
pub trait RowSink {
    fn begin_sheet(&mut self, name: &str) -> Result<(), GenerateError>;

    fn begin_row(&mut self, index: u32, format: &RowFormat) -> Result<(), GenerateError>;

    /// Add a cell to the current row
    fn add_cell(&mut self, cell: Cell) -> Result<(), GenerateError>;

    fn complete(&mut self) -> Result<(), GenerateError>;
}

/// A finished output row; cells are keyed by column, so a later write wins
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub index: u32,
    pub format: RowFormat,
    pub cells: BTreeMap<u32, Cell>,
}

/// A finished output sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSheet {
    pub name: String,
    pub rows: Vec<OutputRow>,
    pub columns: Vec<Column>,
    pub merges: Vec<Merge>,
}

impl OutputSheet {
    pub fn row(&self, index: u32) -> Option<&OutputRow> {
        self.rows.iter().find(|r| r.index == index)
    }

    /// Value text of a cell, for inspection
    pub fn cell(&self, row: u32, column: u32) -> Option<&Cell> {
        self.row(row)?.cells.get(&column)
    }
}

/// Appends straight to the output in strictly increasing row order
#[derive(Debug, Default)]
pub struct DirectSink {
    sheets: Vec<OutputSheet>,
    last_row: Option<u32>,
}

impl DirectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sheet currently being written
    pub fn sheet_mut(&mut self) -> Option<&mut OutputSheet> {
        self.sheets.last_mut()
    }

    pub fn last_row(&self) -> Option<u32> {
        self.last_row
    }

    pub fn into_sheets(self) -> Vec<OutputSheet> {
        self.sheets
    }
}

impl RowSink for DirectSink {
    fn begin_sheet(&mut self, name: &str) -> Result<(), GenerateError> {
        self.sheets.push(OutputSheet {
            name: name.to_string(),
            ..OutputSheet::default()
        });
        self.last_row = None;
        Ok(())
    }

    fn begin_row(&mut self, index: u32, format: &RowFormat) -> Result<(), GenerateError> {
        if let Some(last) = self.last_row {
            if index <= last {
                return Err(GenerateError::RowOrder { row: index, last });
            }
        }
        let sheet = self
            .sheets
            .last_mut()
            .ok_or_else(|| GenerateError::unsupported("row written before any sheet"))?;
        sheet.rows.push(OutputRow {
            index,
            format: format.clone(),
            cells: BTreeMap::new(),
        });
        self.last_row = Some(index);
        Ok(())
    }

    fn add_cell(&mut self, cell: Cell) -> Result<(), GenerateError> {
        let row = self
            .sheets
            .last_mut()
            .and_then(|s| s.rows.last_mut())
            .ok_or_else(|| GenerateError::unsupported("cell written before any row"))?;
        row.cells.insert(cell.column, cell);
        Ok(())
    }

    fn complete(&mut self) -> Result<(), GenerateError> {
        self.last_row = None;
        Ok(())
    }
}

/// Records template rows of a loop body for later replay
#[derive(Debug, Default)]
pub struct BufferingSink {
    rows: Vec<Row>,
}

impl BufferingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl RowSink for BufferingSink {
    fn begin_sheet(&mut self, name: &str) -> Result<(), GenerateError> {
        Err(GenerateError::unsupported(format!(
            "sheet '{name}' started inside a loop"
        )))
    }

    fn begin_row(&mut self, index: u32, format: &RowFormat) -> Result<(), GenerateError> {
        let mut row = Row::new(index);
        row.format = format.clone();
        self.rows.push(row);
        Ok(())
    }

    fn add_cell(&mut self, cell: Cell) -> Result<(), GenerateError> {
        let row = self
            .rows
            .last_mut()
            .ok_or_else(|| GenerateError::unsupported("cell buffered before any row"))?;
        row.cells.push(cell);
        Ok(())
    }

    fn complete(&mut self) -> Result<(), GenerateError> {
        Ok(())
    }
}

/// An open loop: the resolved set plus the body recorded so far
pub struct LoopBuffer {
    pub name: String,
    pub set: ResolverSet,
    pub start_row: u32,
    pub end_row: u32,
    /// Same-name loop starts seen inside the body
    pub nesting: u32,
    pub sink: BufferingSink,
}

impl LoopBuffer {
    pub fn new(name: impl Into<String>, set: ResolverSet, start_row: u32, end_row: u32) -> Self {
        Self {
            name: name.into(),
            set,
            start_row,
            end_row,
            nesting: 0,
            sink: BufferingSink::new(),
        }
    }

    /// Template rows strictly between the markers
    pub fn body_len(&self) -> u32 {
        self.end_row.saturating_sub(self.start_row + 1)
    }
}

/// Which sink receives rows right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Direct,
    Buffering { depth: usize },
}

/// The direct sink under a stack of loop buffers
///
/// Entering a loop pushes a buffer; leaving pops it so its rows can be
/// replayed against whatever is on top afterwards.
pub struct SinkStack {
    direct: DirectSink,
    buffers: Vec<LoopBuffer>,
}

impl SinkStack {
    pub fn new(direct: DirectSink) -> Self {
        Self {
            direct,
            buffers: Vec::new(),
        }
    }

    pub fn state(&self) -> SinkState {
        match self.buffers.len() {
            0 => SinkState::Direct,
            depth => SinkState::Buffering { depth },
        }
    }

    /// The sink rows currently go to
    pub fn active(&mut self) -> &mut dyn RowSink {
        match self.buffers.last_mut() {
            Some(buffer) => &mut buffer.sink,
            None => &mut self.direct,
        }
    }

    /// Innermost open loop, if any
    pub fn recording(&mut self) -> Option<&mut LoopBuffer> {
        self.buffers.last_mut()
    }

    pub fn push(&mut self, buffer: LoopBuffer) {
        self.buffers.push(buffer);
    }

    pub fn pop(&mut self) -> Option<LoopBuffer> {
        self.buffers.pop()
    }

    pub fn direct(&self) -> &DirectSink {
        &self.direct
    }

    pub fn direct_mut(&mut self) -> &mut DirectSink {
        &mut self.direct
    }

    pub fn into_direct(self) -> DirectSink {
        self.direct
    }
}

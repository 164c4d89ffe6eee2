//! Spreadsheet engine
//!
//! Rows stream from the template through a [`SinkStack`]: the direct sink
//! writes output rows in strictly increasing order, and a loop start row
//! pushes a buffering sink that records the loop body until the matching end
//! row. Closing a loop replays the recorded rows once per element of the
//! resolved set, while the [`RowLedger`] keeps every emitted row at its
//! template index plus the growth of all loops before it.
//!
//! Cell formats are copied into a fresh stylesheet on first use, so a format
//! referenced from any number of loop iterations is created exactly once.

mod columns;
mod custom;
mod engine;
mod formula;
mod ledger;
mod model;
mod reader;
mod sink;
mod styles;
mod writer;

pub use columns::ColumnTracker;
pub use custom::{CellContext, ListColumns, Modification};
pub use engine::SpreadsheetEngine;
pub use formula::shift_references;
pub use ledger::{LoopContext, RowLedger};
pub use model::{
    cell_ref, column_name, parse_cell_ref, ArrayRange, Cell, CellValue, Column, Hyperlink, Merge,
    Row, RowFormat, Worksheet,
};
pub use reader::Workbook;
pub use sink::{
    BufferingSink, DirectSink, LoopBuffer, OutputRow, OutputSheet, RowSink, SinkStack, SinkState,
};
pub use styles::{StyleCache, StyleCopier};
pub use writer::SpreadsheetDocument;

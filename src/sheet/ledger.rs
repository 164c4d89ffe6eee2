//! Row-offset bookkeeping for nested loop replay
//!
//! Output rows are addressed absolutely and cannot be inserted, so every
//! template row is written at `template index + section offset`. Each open
//! loop keeps its own context; closing it folds the rows it added (or
//! removed) into the enclosing offset.

use std::collections::BTreeSet;

/// Counters of one open loop
#[derive(Debug, Clone, PartialEq)]
pub struct LoopContext {
    /// Offset applied to rows emitted while this context is on top
    pub section_offset: i64,
    /// Rows written so far minus the rows the template body spans
    pub rows_written_delta: i64,
    /// Template rows already written in the current iteration
    pub consumed: BTreeSet<u32>,
    base: i64,
    body_len: i64,
    iteration_start: i64,
}

impl LoopContext {
    fn new(base: i64, body_len: u32) -> Self {
        let body_len = i64::from(body_len);
        Self {
            section_offset: base,
            rows_written_delta: -body_len,
            consumed: BTreeSet::new(),
            base,
            body_len,
            iteration_start: base,
        }
    }
}

/// Stack of open loop contexts over the sheet-level offset
#[derive(Debug, Default)]
pub struct RowLedger {
    sheet_offset: i64,
    stack: Vec<LoopContext>,
}

impl RowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset for rows emitted now
    pub fn offset(&self) -> i64 {
        self.stack
            .last()
            .map(|c| c.section_offset)
            .unwrap_or(self.sheet_offset)
    }

    /// Output index of a template row
    pub fn output_row(&self, template_row: u32) -> i64 {
        i64::from(template_row) + self.offset()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a loop whose body spans `body_len` template rows
    pub fn open(&mut self, body_len: u32) {
        let base = self.offset();
        self.stack.push(LoopContext::new(base, body_len));
    }

    /// Position the next iteration right after everything written so far
    pub fn begin_iteration(&mut self) {
        if let Some(ctx) = self.stack.last_mut() {
            ctx.section_offset = ctx.base + ctx.rows_written_delta + ctx.body_len;
            ctx.iteration_start = ctx.section_offset;
            ctx.consumed.clear();
        }
    }

    /// Account for the body plus whatever nested loops added inside it
    pub fn end_iteration(&mut self) {
        if let Some(ctx) = self.stack.last_mut() {
            let nested_growth = ctx.section_offset - ctx.iteration_start;
            ctx.rows_written_delta += ctx.body_len + nested_growth;
        }
    }

    /// Mark a template row as written; false when it already was this iteration
    pub fn consume(&mut self, template_row: u32) -> bool {
        match self.stack.last_mut() {
            Some(ctx) => ctx.consumed.insert(template_row),
            None => true,
        }
    }

    /// Close the innermost loop and shift everything after it
    pub fn close(&mut self) -> Option<LoopContext> {
        let ctx = self.stack.pop()?;
        match self.stack.last_mut() {
            Some(parent) => parent.section_offset += ctx.rows_written_delta,
            None => self.sheet_offset += ctx.rows_written_delta,
        }
        Some(ctx)
    }

    /// Forget all state before the next sheet
    pub fn reset(&mut self) {
        self.sheet_offset = 0;
        self.stack.clear();
    }
}

//! In-memory worksheet model

use std::fmt;

/// Stored value of a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    /// Numeric value, kept as written so it is copied exactly
    Number(String),
    Bool(bool),
    Error(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// Target of a cell hyperlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hyperlink {
    /// A URL outside the workbook
    External(String),
    /// A location inside the workbook, such as `Sheet2!A1`
    Location(String),
}

/// Size of the block an array formula fills, anchored at its owning cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    pub rows: u32,
    pub columns: u32,
}

impl ArrayRange {
    /// Parse the `ref` of an array formula, either `A1` or `A1:B2`
    pub fn parse(range: &str) -> Option<Self> {
        let merge = match range.split_once(':') {
            Some(_) => Merge::parse(range)?,
            None => {
                let (row, column) = parse_cell_ref(range)?;
                Merge {
                    first_row: row,
                    first_column: column,
                    last_row: row,
                    last_column: column,
                }
            }
        };
        Some(Self {
            rows: merge.last_row.checked_sub(merge.first_row)? + 1,
            columns: merge.last_column.checked_sub(merge.first_column)? + 1,
        })
    }

    /// The block when its top-left cell sits at `(row, column)`
    pub fn anchored_at(self, row: u32, column: u32) -> Merge {
        Merge {
            first_row: row,
            first_column: column,
            last_row: row.saturating_add(self.rows - 1),
            last_column: column.saturating_add(self.columns - 1),
        }
    }
}

/// A single cell; `column` is zero-based
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub column: u32,
    pub value: CellValue,
    /// Index into the cell formats of the owning workbook
    pub style: u32,
    pub formula: Option<String>,
    /// Set when `formula` is an array formula
    pub array: Option<ArrayRange>,
    pub hyperlink: Option<Hyperlink>,
}

impl Cell {
    pub fn new(column: u32, value: CellValue) -> Self {
        Self {
            column,
            value,
            style: 0,
            formula: None,
            array: None,
            hyperlink: None,
        }
    }

    pub fn text(column: u32, text: impl Into<String>) -> Self {
        Self::new(column, CellValue::Text(text.into()))
    }

    pub fn with_style(mut self, style: u32) -> Self {
        self.style = style;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Whether the cell carries neither value nor formula
    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && self.formula.is_none()
    }
}

/// Row attributes carried over from the template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFormat {
    pub height: Option<String>,
    pub hidden: bool,
    /// Row-level cell format, when the row sets one
    pub style: Option<u32>,
}

/// A row; `index` is zero-based
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: u32,
    pub format: RowFormat,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            format: RowFormat::default(),
            cells: Vec::new(),
        }
    }

    pub fn with_cell(mut self, cell: Cell) -> Self {
        self.cells.push(cell);
        self
    }

    /// Text of the only non-blank cell, if the row has exactly one
    pub fn sole_text(&self) -> Option<&str> {
        let mut filled = self.cells.iter().filter(|c| !c.is_blank());
        let only = filled.next()?;
        if filled.next().is_some() || only.formula.is_some() {
            return None;
        }
        only.value.as_text()
    }
}

/// Column range definition; bounds are zero-based and inclusive
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub min: u32,
    pub max: u32,
    pub width: Option<String>,
    pub style: Option<u32>,
    pub hidden: bool,
}

impl Column {
    pub fn covers(&self, column: u32) -> bool {
        self.min <= column && column <= self.max
    }
}

/// Merged region; bounds are zero-based and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub first_row: u32,
    pub first_column: u32,
    pub last_row: u32,
    pub last_column: u32,
}

impl Merge {
    /// Parse an `A1:B2` range
    pub fn parse(range: &str) -> Option<Self> {
        let (from, to) = range.split_once(':')?;
        let (first_row, first_column) = parse_cell_ref(from)?;
        let (last_row, last_column) = parse_cell_ref(to)?;
        Some(Self {
            first_row,
            first_column,
            last_row,
            last_column,
        })
    }

    /// Same region starting at row `first_row`
    pub fn moved_to(self, first_row: u32) -> Self {
        Self {
            first_row,
            last_row: first_row.saturating_add(self.last_row.saturating_sub(self.first_row)),
            ..self
        }
    }
}

impl fmt::Display for Merge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            cell_ref(self.first_row, self.first_column),
            cell_ref(self.last_row, self.last_column)
        )
    }
}

/// One template sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Worksheet {
    pub name: String,
    /// Rows in ascending index order
    pub rows: Vec<Row>,
    pub columns: Vec<Column>,
    pub merges: Vec<Merge>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column_at(&self, column: u32) -> Option<&Column> {
        self.columns.iter().find(|c| c.covers(column))
    }
}

/// Column letters for a zero-based column index
pub fn column_name(column: u32) -> String {
    let mut n = u64::from(column) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// `A1`-style reference for zero-based coordinates
pub fn cell_ref(row: u32, column: u32) -> String {
    format!("{}{}", column_name(column), row + 1)
}

/// Zero-based `(row, column)` of an `A1`-style reference; `$` anchors are ignored
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut column: u32 = 0;
    for c in letters.chars() {
        column = column
            .checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, column - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_refs() {
        assert_eq!(cell_ref(0, 0), "A1");
        assert_eq!(cell_ref(9, 25), "Z10");
        assert_eq!(cell_ref(0, 26), "AA1");
        assert_eq!(cell_ref(0, 701), "ZZ1");
        assert_eq!(cell_ref(0, 702), "AAA1");
        assert_eq!(parse_cell_ref("AA1"), Some((0, 26)));
        assert_eq!(parse_cell_ref("$B$3"), Some((2, 1)));
        assert_eq!(parse_cell_ref("B0"), None);
        assert_eq!(parse_cell_ref("12"), None);
    }

    #[test]
    fn test_overlong_refs_are_rejected() {
        assert_eq!(parse_cell_ref("XFD1048576"), Some((1_048_575, 16_383)));
        assert_eq!(parse_cell_ref("AAAAAAAAA1"), None);
        assert_eq!(parse_cell_ref("A99999999999"), None);
        assert_eq!(Merge::parse("A1:ZZZZZZZZZZ2"), None);
    }

    #[test]
    fn test_merge_round_trip_and_shift() {
        let merge = Merge::parse("B2:C4").unwrap();
        assert_eq!(merge.moved_to(4).to_string(), "B5:C7");
    }

    #[test]
    fn test_array_range_moves_with_its_cell() {
        let range = ArrayRange::parse("C2:D4").unwrap();
        assert_eq!(range, ArrayRange { rows: 3, columns: 2 });
        assert_eq!(range.anchored_at(9, 2).to_string(), "C10:D12");
        assert_eq!(ArrayRange::parse("B7"), Some(ArrayRange { rows: 1, columns: 1 }));
        assert_eq!(ArrayRange::parse("D4:C2"), None);
    }

    #[test]
    fn test_sole_text() {
        let row = Row::new(0)
            .with_cell(Cell::text(0, "{{items}}"))
            .with_cell(Cell::new(1, CellValue::Empty).with_style(3));
        assert_eq!(row.sole_text(), Some("{{items}}"));

        let row = row.with_cell(Cell::text(2, "x"));
        assert_eq!(row.sole_text(), None);
    }
}

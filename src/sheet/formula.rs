//! Relative reference arithmetic for formulas shared across a range

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::model::{column_name, parse_cell_ref};

/// Last addressable row and column, zero-based
const MAX_ROW: i64 = 1_048_575;
const MAX_COLUMN: i64 = 16_383;

/// String literals, quoted sheet names, numbers, cell references and other
/// names, in that order of preference. A reference followed by more name
/// characters or `(` is part of a name or a function call.
static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#""[^"]*"|'[^']*'|[0-9]+(?:\.[0-9]*)?(?:[eE][+-]?[0-9]+)?|(\$?)([A-Za-z]{1,3})(\$?)([0-9]+)([A-Za-z0-9_.(]*)|[A-Za-z_\\][A-Za-z0-9_.]*"#,
    )
    .unwrap()
});

/// Move every relative reference in `formula` by `rows` and `columns`
///
/// `$`-anchored parts stay put. A reference pushed off the grid becomes
/// `#REF!`.
pub fn shift_references(formula: &str, rows: i64, columns: i64) -> String {
    if rows == 0 && columns == 0 {
        return formula.to_string();
    }
    TOKEN
        .replace_all(formula, |caps: &Captures<'_>| {
            let whole = &caps[0];
            let is_reference = caps.get(2).is_some() && caps.get(5).is_some_and(|tail| tail.as_str().is_empty());
            if !is_reference {
                return whole.to_string();
            }
            let Some((row, column)) = parse_cell_ref(whole) else {
                return whole.to_string();
            };
            let (column_anchor, row_anchor) = (&caps[1], &caps[3]);
            let row = i64::from(row) + if row_anchor.is_empty() { rows } else { 0 };
            let column = i64::from(column) + if column_anchor.is_empty() { columns } else { 0 };
            if !(0..=MAX_ROW).contains(&row) || !(0..=MAX_COLUMN).contains(&column) {
                return "#REF!".to_string();
            }
            format!(
                "{column_anchor}{}{row_anchor}{}",
                column_name(column as u32),
                row + 1
            )
        })
        .into_owned()
}

//! Reading `.xlsx` templates into the worksheet model

use std::collections::HashMap;

use tracing::debug;

use super::formula::shift_references;
use super::model::{
    parse_cell_ref, ArrayRange, Cell, CellValue, Column, Hyperlink, Merge, Row, RowFormat, Worksheet,
};
use crate::error::GenerateError;
use crate::package::{resolve_part_name, Package, REL_HYPERLINK};
use crate::xml::{NodeId, XmlTree};

pub(crate) const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub(crate) const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub(crate) const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// A parsed template workbook
#[derive(Debug, Clone)]
pub struct Workbook {
    /// Sheets in workbook order
    pub sheets: Vec<Worksheet>,
    /// The template stylesheet, when the package has one
    pub styles: Option<XmlTree>,
}

impl Workbook {
    /// Parse an `.xlsx` package
    pub fn read(bytes: &[u8]) -> Result<Self, GenerateError> {
        let package = Package::read(bytes)?;
        let main = package.main_part()?;
        let workbook = package.xml_part(&main)?;
        let rels = package.relationships(&main)?;

        let shared = match rels.first_of_type(REL_SHARED_STRINGS) {
            Some((_, target)) => read_shared_strings(&package.xml_part(&resolve_part_name(&main, &target))?),
            None => Vec::new(),
        };
        let styles = match rels.first_of_type(REL_STYLES) {
            Some((_, target)) => Some(package.xml_part(&resolve_part_name(&main, &target))?),
            None => None,
        };

        let mut sheets = Vec::new();
        let root = workbook.root_element();
        let sheet_list = root.and_then(|r| workbook.first_child_named(r, "sheets"));
        for entry in sheet_list
            .map(|s| workbook.children_named(s, "sheet"))
            .unwrap_or_default()
        {
            let name = workbook.attr(entry, "name").unwrap_or("Sheet").to_string();
            let Some(target) = workbook.attr(entry, "r:id").and_then(|id| rels.target(id)) else {
                debug!(sheet = %name, "sheet without a part, skipping");
                continue;
            };
            let part = resolve_part_name(&main, target);
            let tree = package.xml_part(&part)?;
            let sheet_rels = package.relationships(&part)?;
            let links: HashMap<String, String> = sheet_rels
                .of_type(REL_HYPERLINK)
                .into_iter()
                .collect();
            sheets.push(read_sheet(&tree, name, &shared, &links));
        }
        Ok(Self { sheets, styles })
    }
}

fn read_shared_strings(tree: &XmlTree) -> Vec<String> {
    let Some(root) = tree.root_element() else {
        return Vec::new();
    };
    tree.children_named(root, "si")
        .into_iter()
        .map(|si| string_item_text(tree, si))
        .collect()
}

/// Text of a string item: its own `t`, or the `t` of each rich-text run
fn string_item_text(tree: &XmlTree, item: NodeId) -> String {
    let mut text = String::new();
    for child in tree.child_elements(item) {
        if tree.is_element(child, "t") {
            text.push_str(&tree.text_content(child));
        } else if tree.is_element(child, "r") {
            for t in tree.children_named(child, "t") {
                text.push_str(&tree.text_content(t));
            }
        }
    }
    text
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

fn read_sheet(
    tree: &XmlTree,
    name: String,
    shared: &[String],
    links: &HashMap<String, String>,
) -> Worksheet {
    let mut sheet = Worksheet::new(name);
    let Some(root) = tree.root_element() else {
        return sheet;
    };

    if let Some(cols) = tree.first_child_named(root, "cols") {
        for col in tree.children_named(cols, "col") {
            let bound = |key: &str| tree.attr(col, key).and_then(|v| v.parse::<u32>().ok());
            let (Some(min), Some(max)) = (bound("min"), bound("max")) else {
                continue;
            };
            sheet.columns.push(Column {
                min: min.saturating_sub(1),
                max: max.saturating_sub(1),
                width: tree.attr(col, "width").map(str::to_string),
                style: tree.attr(col, "style").and_then(|s| s.parse().ok()),
                hidden: is_true(tree.attr(col, "hidden")),
            });
        }
    }

    let mut hyperlinks = HashMap::new();
    if let Some(list) = tree.first_child_named(root, "hyperlinks") {
        for link in tree.children_named(list, "hyperlink") {
            let Some(first) = tree
                .attr(link, "ref")
                .and_then(|r| parse_cell_ref(r.split(':').next().unwrap_or(r)))
            else {
                continue;
            };
            let target = match tree.attr(link, "r:id").and_then(|id| links.get(id)) {
                Some(url) => Hyperlink::External(url.clone()),
                None => match tree.attr(link, "location") {
                    Some(location) => Hyperlink::Location(location.to_string()),
                    None => continue,
                },
            };
            hyperlinks.insert(first, target);
        }
    }

    // Shared formula index to the master cell and its text
    let mut masters: HashMap<u32, (u32, u32, String)> = HashMap::new();
    // Dependent cells as (row position, cell position, shared index)
    let mut dependents = Vec::new();

    if let Some(data) = tree.first_child_named(root, "sheetData") {
        let mut next_row = 0;
        for row_node in tree.children_named(data, "row") {
            let index = tree
                .attr(row_node, "r")
                .and_then(|r| r.parse::<u32>().ok())
                .map(|r| r.saturating_sub(1))
                .unwrap_or(next_row);
            next_row = index + 1;

            let mut row = Row::new(index);
            row.format = RowFormat {
                height: tree.attr(row_node, "ht").map(str::to_string),
                hidden: is_true(tree.attr(row_node, "hidden")),
                style: is_true(tree.attr(row_node, "customFormat"))
                    .then(|| tree.attr(row_node, "s").and_then(|s| s.parse().ok()))
                    .flatten(),
            };

            let mut next_column = 0;
            for c in tree.children_named(row_node, "c") {
                let column = tree
                    .attr(c, "r")
                    .and_then(parse_cell_ref)
                    .map(|(_, col)| col)
                    .unwrap_or(next_column);
                next_column = column + 1;
                let mut cell = read_cell(tree, c, column, shared);
                cell.hyperlink = hyperlinks.remove(&(index, column));
                if let Some(si) = shared_index(tree, c) {
                    match &cell.formula {
                        Some(text) => {
                            masters.entry(si).or_insert_with(|| (index, column, text.clone()));
                        }
                        None => dependents.push((sheet.rows.len(), row.cells.len(), si)),
                    }
                }
                row.cells.push(cell);
            }
            sheet.rows.push(row);
        }
    }

    // Each dependent gets its own copy of the master formula.
    for (row_pos, cell_pos, si) in dependents {
        let Some((master_row, master_column, text)) = masters.get(&si) else {
            debug!(si, "shared formula without a master cell");
            continue;
        };
        let row = &mut sheet.rows[row_pos];
        let index = row.index;
        let cell = &mut row.cells[cell_pos];
        let rows = i64::from(index) - i64::from(*master_row);
        let columns = i64::from(cell.column) - i64::from(*master_column);
        cell.formula = Some(shift_references(text, rows, columns));
    }
    sheet.rows.sort_by_key(|r| r.index);

    if let Some(merges) = tree.first_child_named(root, "mergeCells") {
        sheet.merges = tree
            .children_named(merges, "mergeCell")
            .into_iter()
            .filter_map(|m| tree.attr(m, "ref").and_then(Merge::parse))
            .collect();
    }
    sheet
}

fn read_cell(tree: &XmlTree, c: NodeId, column: u32, shared: &[String]) -> Cell {
    let raw = tree.first_child_named(c, "v").map(|v| tree.text_content(v));
    let value = match (tree.attr(c, "t"), raw) {
        (Some("inlineStr"), _) => tree
            .first_child_named(c, "is")
            .map(|is| CellValue::Text(string_item_text(tree, is)))
            .unwrap_or(CellValue::Empty),
        (_, None) => CellValue::Empty,
        (Some("s"), Some(raw)) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .map(|s| CellValue::Text(s.clone()))
            .unwrap_or(CellValue::Empty),
        (Some("str"), Some(raw)) => CellValue::Text(raw),
        (Some("b"), Some(raw)) => CellValue::Bool(raw.trim() == "1"),
        (Some("e"), Some(raw)) => CellValue::Error(raw),
        (_, Some(raw)) => CellValue::Number(raw),
    };
    let f = tree.first_child_named(c, "f");
    let formula = f.map(|f| tree.text_content(f)).filter(|f| !f.is_empty());
    let array = f
        .filter(|f| tree.attr(*f, "t") == Some("array"))
        .and_then(|f| tree.attr(f, "ref"))
        .and_then(ArrayRange::parse)
        .filter(|_| formula.is_some());

    Cell {
        column,
        value,
        style: tree.attr(c, "s").and_then(|s| s.parse().ok()).unwrap_or(0),
        formula,
        array,
        hyperlink: None,
    }
}

/// The `si` of a cell taking part in a shared formula
fn shared_index(tree: &XmlTree, c: NodeId) -> Option<u32> {
    let f = tree.first_child_named(c, "f")?;
    if tree.attr(f, "t") != Some("shared") {
        return None;
    }
    tree.attr(f, "si")?.parse().ok()
}

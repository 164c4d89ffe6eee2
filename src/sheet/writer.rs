//! Serializing rendered sheets into a fresh `.xlsx` package

use std::fmt::Write as _;

use quick_xml::escape::escape;

use super::model::{cell_ref, Cell, CellValue, Hyperlink};
use super::reader::{REL_STYLES, REL_WORKSHEET};
use super::sink::{OutputRow, OutputSheet};
use crate::error::GenerateError;
use crate::package::{Package, Relationships, CONTENT_TYPES_PART, REL_HYPERLINK, REL_OFFICE_DOCUMENT};
use crate::xml::XmlTree;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const CT_WORKBOOK: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const CT_WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
const CT_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";

/// A rendered workbook, before it is packaged
#[derive(Debug, Clone)]
pub struct SpreadsheetDocument {
    pub sheets: Vec<OutputSheet>,
    pub styles: XmlTree,
}

impl SpreadsheetDocument {
    pub fn sheet(&self, name: &str) -> Option<&OutputSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Build the `.xlsx` package
    pub fn to_package(&self) -> Result<Package, GenerateError> {
        let mut package = Package::new();
        package.set_part(
            CONTENT_TYPES_PART,
            format!(
                r#"{DECLARATION}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="{CT_RELS}"/><Default Extension="xml" ContentType="application/xml"/></Types>"#
            )
            .into_bytes(),
        );

        let mut root_rels = Relationships::empty();
        root_rels.add(REL_OFFICE_DOCUMENT, "xl/workbook.xml", false);
        package.set_relationships("", &root_rels);
        package.add_override("xl/workbook.xml", CT_WORKBOOK)?;

        let mut workbook_rels = Relationships::empty();
        let mut sheet_entries = String::new();
        for (i, sheet) in self.sheets.iter().enumerate() {
            let number = i + 1;
            let part = format!("xl/worksheets/sheet{number}.xml");
            let rel_id = workbook_rels.add(REL_WORKSHEET, &format!("worksheets/sheet{number}.xml"), false);
            write!(
                sheet_entries,
                r#"<sheet name="{}" sheetId="{number}" r:id="{rel_id}"/>"#,
                escape(sheet.name.as_str())
            )
            .ok();

            let mut sheet_rels = Relationships::empty();
            package.set_part(&part, worksheet_xml(sheet, &mut sheet_rels).into_bytes());
            if !sheet_rels.is_empty() {
                package.set_relationships(&part, &sheet_rels);
            }
            package.add_override(&part, CT_WORKSHEET)?;
        }
        workbook_rels.add(REL_STYLES, "styles.xml", false);
        package.set_xml_part("xl/styles.xml", &self.styles);
        package.add_override("xl/styles.xml", CT_STYLES)?;

        package.set_part(
            "xl/workbook.xml",
            format!(
                r#"{DECLARATION}<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>{sheet_entries}</sheets><calcPr fullCalcOnLoad="1"/></workbook>"#
            )
            .into_bytes(),
        );
        package.set_relationships("xl/workbook.xml", &workbook_rels);
        Ok(package)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GenerateError> {
        Ok(self.to_package()?.to_bytes()?)
    }
}

fn worksheet_xml(sheet: &OutputSheet, rels: &mut Relationships) -> String {
    let mut out = String::new();
    write!(out, r#"{DECLARATION}<worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}">"#).ok();

    if !sheet.columns.is_empty() {
        out.push_str("<cols>");
        for col in &sheet.columns {
            write!(out, r#"<col min="{}" max="{}""#, col.min + 1, col.max + 1).ok();
            if let Some(width) = &col.width {
                write!(out, r#" width="{}" customWidth="1""#, escape(width.as_str())).ok();
            }
            if let Some(style) = col.style {
                write!(out, r#" style="{style}""#).ok();
            }
            if col.hidden {
                out.push_str(r#" hidden="1""#);
            }
            out.push_str("/>");
        }
        out.push_str("</cols>");
    }

    let mut links = Vec::new();
    out.push_str("<sheetData>");
    for row in &sheet.rows {
        write_row(&mut out, row, &mut links);
    }
    out.push_str("</sheetData>");

    if !sheet.merges.is_empty() {
        write!(out, r#"<mergeCells count="{}">"#, sheet.merges.len()).ok();
        for merge in &sheet.merges {
            write!(out, r#"<mergeCell ref="{merge}"/>"#).ok();
        }
        out.push_str("</mergeCells>");
    }

    if !links.is_empty() {
        out.push_str("<hyperlinks>");
        for (reference, link) in links {
            match link {
                Hyperlink::External(url) => {
                    let id = rels.add(REL_HYPERLINK, url, true);
                    write!(out, r#"<hyperlink ref="{reference}" r:id="{id}"/>"#).ok();
                }
                Hyperlink::Location(location) => {
                    write!(
                        out,
                        r#"<hyperlink ref="{reference}" location="{}"/>"#,
                        escape(location.as_str())
                    )
                    .ok();
                }
            }
        }
        out.push_str("</hyperlinks>");
    }
    out.push_str("</worksheet>");
    out
}

fn write_row<'s>(out: &mut String, row: &'s OutputRow, links: &mut Vec<(String, &'s Hyperlink)>) {
    write!(out, r#"<row r="{}""#, row.index + 1).ok();
    if let Some(height) = &row.format.height {
        write!(out, r#" ht="{}" customHeight="1""#, escape(height.as_str())).ok();
    }
    if row.format.hidden {
        out.push_str(r#" hidden="1""#);
    }
    if let Some(style) = row.format.style {
        write!(out, r#" s="{style}" customFormat="1""#).ok();
    }
    if row.cells.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for cell in row.cells.values() {
        let reference = cell_ref(row.index, cell.column);
        write_cell(out, row.index, &reference, cell);
        if let Some(link) = &cell.hyperlink {
            links.push((reference, link));
        }
    }
    out.push_str("</row>");
}

fn write_cell(out: &mut String, row: u32, reference: &str, cell: &Cell) {
    write!(out, r#"<c r="{reference}""#).ok();
    if cell.style != 0 {
        write!(out, r#" s="{}""#, cell.style).ok();
    }
    let kind = match (&cell.value, &cell.formula) {
        (CellValue::Text(_), Some(_)) => Some("str"),
        (CellValue::Text(_), None) => Some("inlineStr"),
        (CellValue::Bool(_), _) => Some("b"),
        (CellValue::Error(_), _) => Some("e"),
        _ => None,
    };
    if let Some(kind) = kind {
        write!(out, r#" t="{kind}""#).ok();
    }
    if cell.is_blank() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    match (&cell.formula, cell.array) {
        (Some(formula), Some(array)) => {
            let range = array.anchored_at(row, cell.column);
            write!(out, r#"<f t="array" ref="{range}">{}</f>"#, escape(formula.as_str())).ok();
        }
        (Some(formula), None) => {
            write!(out, "<f>{}</f>", escape(formula.as_str())).ok();
        }
        (None, _) => {}
    }
    match &cell.value {
        CellValue::Empty => {}
        CellValue::Text(text) if cell.formula.is_none() => {
            write!(out, r#"<is><t xml:space="preserve">{}</t></is>"#, escape(text.as_str())).ok();
        }
        CellValue::Text(text) | CellValue::Number(text) | CellValue::Error(text) => {
            write!(out, "<v>{}</v>", escape(text.as_str())).ok();
        }
        CellValue::Bool(value) => {
            write!(out, "<v>{}</v>", u8::from(*value)).ok();
        }
    }
    out.push_str("</c>");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::sheet::model::{ArrayRange, RowFormat};
    use crate::sheet::reader::Workbook;
    use crate::sheet::styles::StyleCopier;

    fn document() -> SpreadsheetDocument {
        let mut cells = BTreeMap::new();
        cells.insert(0, Cell::text(0, "a & b"));
        cells.insert(1, Cell::new(1, CellValue::Number("1.50".to_string())).with_formula("SUM(A3:A4)"));
        let mut link = Cell::new(2, CellValue::Bool(true));
        link.hyperlink = Some(Hyperlink::External("https://example.com/?a=1&b=2".to_string()));
        cells.insert(2, link);
        SpreadsheetDocument {
            sheets: vec![OutputSheet {
                name: "Data & more".to_string(),
                rows: vec![OutputRow {
                    index: 4,
                    format: RowFormat {
                        height: Some("30".to_string()),
                        hidden: false,
                        style: None,
                    },
                    cells,
                }],
                columns: Vec::new(),
                merges: vec![crate::sheet::model::Merge::parse("A5:B5").unwrap()],
            }],
            styles: StyleCopier::new(None).finish(),
        }
    }

    #[test]
    fn test_written_package_reads_back() {
        let bytes = document().to_bytes().unwrap();
        let workbook = Workbook::read(&bytes).unwrap();
        assert_eq!(workbook.sheets.len(), 1);
        let sheet = &workbook.sheets[0];
        assert_eq!(sheet.name, "Data & more");
        let row = &sheet.rows[0];
        assert_eq!(row.index, 4);
        assert_eq!(row.format.height.as_deref(), Some("30"));
        assert_eq!(row.cells[0].value, CellValue::Text("a & b".to_string()));
        assert_eq!(row.cells[1].formula.as_deref(), Some("SUM(A3:A4)"));
        assert_eq!(row.cells[1].value, CellValue::Number("1.50".to_string()));
        assert_eq!(
            row.cells[2].hyperlink,
            Some(Hyperlink::External("https://example.com/?a=1&b=2".to_string()))
        );
        assert_eq!(sheet.merges[0].to_string(), "A5:B5");
    }

    #[test]
    fn test_cell_markup() {
        let mut out = String::new();
        write_cell(&mut out, 1, "B2", &Cell::text(1, "x<y").with_style(3));
        insta::assert_snapshot!(out, @r#"<c r="B2" s="3" t="inlineStr"><is><t xml:space="preserve">x&lt;y</t></is></c>"#);
    }

    #[test]
    fn test_array_formula_markup() {
        let mut cell = Cell::new(2, CellValue::Number("3".to_string())).with_formula("A1:A2*B1:B2");
        cell.array = ArrayRange::parse("C1:C2");
        let mut out = String::new();
        write_cell(&mut out, 6, "C7", &cell);
        insta::assert_snapshot!(out, @r#"<c r="C7"><f t="array" ref="C7:C8">A1:A2*B1:B2</f><v>3</v></c>"#);
    }
}

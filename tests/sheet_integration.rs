//! Integration tests for spreadsheet templates, read back from the written package

mod common;

use docstamp::resolve::{Record, Value};
use docstamp::package::Package;
use docstamp::sheet::{ArrayRange, Cell, CellValue, Hyperlink, ListColumns, Workbook, Worksheet};
use docstamp::xml::XmlTree;
use docstamp::{render, CustomRegistry, GenerateConfig, GeneratedDocument, Template, TemplateFormat};
use pretty_assertions::assert_eq;

use common::{row, shared_cell, text_cell, xlsx};

/// Header, a one-row loop over `items`, then a total row with a formula
fn invoice_template() -> Vec<u8> {
    let rows = [
        row(1, &[shared_cell("A1", 0, 1), text_cell("B1", "{{customer}}", 0)]),
        row(2, &[text_cell("A2", "{{items}}", 0)]),
        row(3, &[text_cell("A3", "{{label}}", 1), text_cell("B3", "{{qty}}", 2)]),
        row(4, &[text_cell("A4", "{{/items}}", 0)]),
        row(
            5,
            &[
                text_cell("A5", "Total", 1),
                r#"<c r="B5" s="2"><f>SUM(B3:B3)</f><v>1</v></c>"#.to_string(),
            ],
        ),
    ]
    .concat();
    let tail = concat!(
        r#"<mergeCells count="1"><mergeCell ref="A5:B5"/></mergeCells>"#,
        r#"<hyperlinks><hyperlink ref="A5" location="Report!A1"/></hyperlinks>"#
    );
    xlsx(&rows, tail, &["Invoice {{number}}"])
}

fn invoice(items: usize) -> Record {
    Record::new("invoice")
        .with("number", 7)
        .with("customer", "Grace Hopper")
        .with(
            "items",
            Value::list((1..=items).map(|i| {
                Record::new("item")
                    .with("label", format!("Item {i}"))
                    .with("qty", i as i64)
            })),
        )
}

/// Render and read the written package back
fn roundtrip(template: Vec<u8>, data: Record, config: &GenerateConfig) -> Workbook {
    let template = Template::new(template, TemplateFormat::Spreadsheet);
    let document = render(&template, &config.resolver(data), config).unwrap();
    assert!(matches!(document, GeneratedDocument::Spreadsheet(_)));
    Workbook::read(&document.to_bytes().unwrap()).unwrap()
}

fn cell(sheet: &Worksheet, row: u32, column: u32) -> Option<&Cell> {
    sheet
        .rows
        .iter()
        .find(|r| r.index == row)
        .and_then(|r| r.cells.iter().find(|c| c.column == column))
}

fn text(sheet: &Worksheet, row: u32, column: u32) -> Option<String> {
    cell(sheet, row, column).and_then(|c| c.value.as_text().map(str::to_string))
}

fn collection_count(styles: &XmlTree, name: &str) -> usize {
    let root = styles.root_element().unwrap();
    styles
        .first_child_named(root, name)
        .map(|list| styles.child_elements(list).count())
        .unwrap_or(0)
}

#[test]
fn test_loop_shifts_following_rows() {
    let workbook = roundtrip(invoice_template(), invoice(3), &GenerateConfig::new());
    let sheet = &workbook.sheets[0];
    assert_eq!(sheet.name, "Report");

    assert_eq!(text(sheet, 0, 0).as_deref(), Some("Invoice 7"));
    assert_eq!(text(sheet, 0, 1).as_deref(), Some("Grace Hopper"));
    for (i, index) in (2..=4).enumerate() {
        assert_eq!(text(sheet, index, 0), Some(format!("Item {}", i + 1)));
        assert_eq!(text(sheet, index, 1), Some(format!("{}", i + 1)));
    }

    // Total moves from row 5 to row 7; its formula text is left alone
    assert_eq!(text(sheet, 6, 0).as_deref(), Some("Total"));
    let total = cell(sheet, 6, 1).expect("total cell");
    assert_eq!(total.formula.as_deref(), Some("SUM(B3:B3)"));
    assert_eq!(sheet.merges.iter().map(|m| m.to_string()).collect::<Vec<_>>(), vec!["A7:B7"]);
    assert_eq!(
        cell(sheet, 6, 0).and_then(|c| c.hyperlink.clone()),
        Some(Hyperlink::Location("Report!A1".to_string()))
    );
}

#[test]
fn test_no_marker_text_remains() {
    let workbook = roundtrip(invoice_template(), invoice(2), &GenerateConfig::new());
    let markers: Vec<_> = workbook.sheets[0]
        .rows
        .iter()
        .flat_map(|r| r.cells.iter())
        .filter_map(|c| c.value.as_text())
        .filter(|t| t.contains("{{"))
        .map(str::to_string)
        .collect();
    assert!(markers.is_empty(), "leftover markers: {markers:?}");
}

#[test]
fn test_styles_created_once_per_source_format() {
    for items in [1, 3, 25] {
        let workbook = roundtrip(invoice_template(), invoice(items), &GenerateConfig::new());
        let styles = workbook.styles.expect("styles part");
        // Default format plus template formats 0, 1 and 2
        assert_eq!(collection_count(&styles, "cellXfs"), 4, "{items} iterations");
        assert_eq!(collection_count(&styles, "fonts"), 2);
        assert_eq!(collection_count(&styles, "numFmts"), 1);
    }
}

#[test]
fn test_copied_formats_are_remapped() {
    let workbook = roundtrip(invoice_template(), invoice(2), &GenerateConfig::new());
    let styles = workbook.styles.expect("styles part");
    let xml = String::from_utf8(styles.to_bytes()).unwrap();

    assert!(xml.contains(r##"<numFmt numFmtId="164" formatCode="#,##0.00"/>"##));
    assert!(xml.contains(r#"rgb="FFFFFFFF""#));
    assert!(!xml.contains(r#"indexed="64""#));

    let sheet = &workbook.sheets[0];
    let label = cell(sheet, 2, 0).unwrap().style;
    let header = cell(sheet, 0, 0).unwrap().style;
    assert_eq!(label, header);
    assert_ne!(label, cell(sheet, 2, 1).unwrap().style);
}

#[test]
fn test_empty_set_keeps_marker_slots() {
    let workbook = roundtrip(invoice_template(), invoice(0), &GenerateConfig::new());
    let sheet = &workbook.sheets[0];
    // One body row removed: Total moves up from row 5 to row 4
    assert_eq!(text(sheet, 3, 0).as_deref(), Some("Total"));
    assert!(cell(sheet, 2, 0).is_none());
}

#[test]
fn test_list_columns_spread_over_row() {
    let rows = row(
        1,
        &[
            text_cell("A1", "Month", 0),
            text_cell("B1", "{{months}}", 1),
            text_cell("C1", "Sum", 0),
        ],
    );
    let config = GenerateConfig::new().with_registry(CustomRegistry::new().with::<ListColumns>("months"));
    let data = Record::new("report").with("months", vec!["Jan", "Feb", "Mar"]);
    let workbook = roundtrip(xlsx(&rows, "", &[]), data, &config);

    let sheet = &workbook.sheets[0];
    let texts: Vec<_> = (0..5).map(|c| text(sheet, 0, c)).collect();
    assert_eq!(
        texts,
        vec![
            Some("Month".to_string()),
            Some("Jan".to_string()),
            Some("Feb".to_string()),
            Some("Mar".to_string()),
            Some("Sum".to_string()),
        ]
    );
    assert_eq!(cell(sheet, 0, 3).unwrap().style, cell(sheet, 0, 1).unwrap().style);
    assert!(matches!(cell(sheet, 0, 4).map(|c| &c.value), Some(CellValue::Text(_))));
}

fn number_cell(reference: &str, value: u32) -> String {
    format!(r#"<c r="{reference}"><v>{value}</v></c>"#)
}

fn formula_cell(reference: &str, formula: &str, value: u32) -> String {
    format!(r#"<c r="{reference}">{formula}<v>{value}</v></c>"#)
}

fn rendered_sheet_xml(template: Vec<u8>, data: Record) -> String {
    let template = Template::new(template, TemplateFormat::Spreadsheet);
    let config = GenerateConfig::new();
    let bytes = render(&template, &config.resolver(data), &config)
        .unwrap()
        .to_bytes()
        .unwrap();
    let package = Package::read(&bytes).unwrap();
    String::from_utf8(package.part("xl/worksheets/sheet1.xml").unwrap().to_vec()).unwrap()
}

#[test]
fn test_shared_formula_reaches_every_cell() {
    let rows = [
        row(
            1,
            &[
                number_cell("A1", 2),
                formula_cell("B1", r#"<f t="shared" ref="B1:C2" si="0">A1*2</f>"#, 4),
                formula_cell("C1", r#"<f t="shared" si="0"/>"#, 8),
            ],
        ),
        row(
            2,
            &[
                number_cell("A2", 3),
                formula_cell("B2", r#"<f t="shared" si="0"/>"#, 6),
                formula_cell("C2", r#"<f t="shared" si="0"/>"#, 12),
            ],
        ),
    ]
    .concat();
    let workbook = roundtrip(xlsx(&rows, "", &[]), Record::new("r"), &GenerateConfig::new());
    let sheet = &workbook.sheets[0];

    let formula = |r, c| cell(sheet, r, c).and_then(|c| c.formula.clone());
    assert_eq!(formula(0, 1).as_deref(), Some("A1*2"));
    assert_eq!(formula(0, 2).as_deref(), Some("B1*2"));
    assert_eq!(formula(1, 1).as_deref(), Some("A2*2"));
    assert_eq!(formula(1, 2).as_deref(), Some("B2*2"));
    assert_eq!(cell(sheet, 1, 1).map(|c| &c.value), Some(&CellValue::Number("6".to_string())));
}

#[test]
fn test_shared_and_array_formulas_in_loops() {
    let rows = [
        row(1, &[text_cell("A1", "{{items}}", 0)]),
        row(
            2,
            &[
                text_cell("A2", "{{label}}", 0),
                formula_cell("B2", r#"<f t="shared" ref="B2:B3" si="1">LEN(A2)</f>"#, 0),
            ],
        ),
        row(
            3,
            &[
                text_cell("A3", "{{label}}", 0),
                formula_cell("B3", r#"<f t="shared" si="1"/>"#, 0),
            ],
        ),
        row(4, &[text_cell("A4", "{{/items}}", 0)]),
        row(5, &[formula_cell("C5", r#"<f t="array" ref="C5:C6">B2:B3*2</f>"#, 0)]),
    ]
    .concat();
    let template = xlsx(&rows, "", &[]);
    let workbook = roundtrip(template.clone(), invoice(2), &GenerateConfig::new());
    let sheet = &workbook.sheets[0];

    let formulas: Vec<_> = (1..=4)
        .map(|r| cell(sheet, r, 1).and_then(|c| c.formula.clone()))
        .collect();
    let expected = ["LEN(A2)", "LEN(A3)", "LEN(A2)", "LEN(A3)"];
    assert_eq!(formulas, expected.map(|f| Some(f.to_string())).to_vec());

    // Two extra body rows push the array block from row 5 to row 7
    let array = cell(sheet, 6, 2).expect("array cell");
    assert_eq!(array.formula.as_deref(), Some("B2:B3*2"));
    assert_eq!(array.array, Some(ArrayRange { rows: 2, columns: 1 }));

    let xml = rendered_sheet_xml(template, invoice(2));
    assert!(xml.contains(r#"<f t="array" ref="C7:C8">B2:B3*2</f>"#));
    assert!(!xml.contains("shared"));
}

#[test]
fn test_overlong_cell_reference_does_not_abort() {
    let rows = row(1, &[text_cell("AAAAAAAAA1", "{{title}}", 0), text_cell("B1", "after", 0)]);
    let data = Record::new("r").with("title", "Q3");
    let workbook = roundtrip(xlsx(&rows, "", &[]), data, &GenerateConfig::new());
    let sheet = &workbook.sheets[0];
    assert_eq!(text(sheet, 0, 0).as_deref(), Some("Q3"));
    assert_eq!(text(sheet, 0, 1).as_deref(), Some("after"));
}

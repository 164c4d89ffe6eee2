//! In-memory template fixtures shared by the integration tests

#![allow(dead_code)]

use docstamp::package::{Package, REL_OFFICE_DOCUMENT};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const S_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

pub fn paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
}

/// A paragraph whose text is split over several runs
pub fn split_paragraph(pieces: &[&str]) -> String {
    let runs: String = pieces
        .iter()
        .map(|p| format!("<w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">{p}</w:t></w:r>"))
        .collect();
    format!("<w:p>{runs}</w:p>")
}

/// A single-cell table holding one paragraph per entry
pub fn table(paragraphs: &[&str]) -> String {
    let blocks: String = paragraphs.iter().map(|p| paragraph(p)).collect();
    format!("<w:tbl><w:tr><w:tc>{blocks}</w:tc></w:tr></w:tbl>")
}

fn content_types(overrides: &[(&str, &str)]) -> Vec<u8> {
    let overrides: String = overrides
        .iter()
        .map(|(part, ct)| format!(r#"<Override PartName="/{part}" ContentType="{ct}"/>"#))
        .collect();
    format!(
        r#"{DECLARATION}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
    )
    .into_bytes()
}

fn relationships(entries: &[(&str, &str, &str)]) -> Vec<u8> {
    let entries: String = entries
        .iter()
        .map(|(id, rel_type, target)| {
            format!(r#"<Relationship Id="{id}" Type="{rel_type}" Target="{target}"/>"#)
        })
        .collect();
    format!(
        r#"{DECLARATION}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{entries}</Relationships>"#
    )
    .into_bytes()
}

/// A `.docx` with the given body and, optionally, one header
pub fn docx(body: &str, header: Option<&str>) -> Vec<u8> {
    let mut package = Package::new();
    let mut overrides = vec![(
        "word/document.xml",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
    )];
    if header.is_some() {
        overrides.push((
            "word/header1.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml",
        ));
    }
    package.set_part("[Content_Types].xml", content_types(&overrides));
    package.set_part(
        "_rels/.rels",
        relationships(&[("rId1", REL_OFFICE_DOCUMENT, "word/document.xml")]),
    );
    package.set_part(
        "word/document.xml",
        format!(
            r#"{DECLARATION}<w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        )
        .into_bytes(),
    );
    if let Some(header) = header {
        package.set_part(
            "word/_rels/document.xml.rels",
            relationships(&[(
                "rId7",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header",
                "header1.xml",
            )]),
        );
        package.set_part(
            "word/header1.xml",
            format!(r#"{DECLARATION}<w:hdr xmlns:w="{W_NS}">{header}</w:hdr>"#).into_bytes(),
        );
    }
    package.to_bytes().unwrap()
}

/// Stylesheet with a bold font, a solid fill using the system color and a
/// custom number format
pub const STYLES: &str = concat!(
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r##"<numFmts count="1"><numFmt numFmtId="165" formatCode="#,##0.00"/></numFmts>"##,
    r#"<fonts count="2"><font><sz val="11"/><name val="Arial"/></font><font><b/><sz val="11"/><name val="Arial"/></font></fonts>"#,
    r#"<fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill>"#,
    r#"<fill><patternFill patternType="solid"><fgColor indexed="64"/></patternFill></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
    r#"<xf numFmtId="0" fontId="1" fillId="2" borderId="0" xfId="0"/>"#,
    r#"<xf numFmtId="165" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>"#,
    r#"</styleSheet>"#
);

/// A single-sheet `.xlsx`; `sheet_data` is the inner XML of `sheetData`,
/// `tail` goes after it (merges, hyperlinks)
pub fn xlsx(sheet_data: &str, tail: &str, shared_strings: &[&str]) -> Vec<u8> {
    let mut package = Package::new();
    package.set_part(
        "[Content_Types].xml",
        content_types(&[
            (
                "xl/workbook.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
            ),
            (
                "xl/worksheets/sheet1.xml",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            ),
        ]),
    );
    package.set_part(
        "_rels/.rels",
        relationships(&[("rId1", REL_OFFICE_DOCUMENT, "xl/workbook.xml")]),
    );
    package.set_part(
        "xl/workbook.xml",
        format!(
            r#"{DECLARATION}<workbook xmlns="{S_NS}" xmlns:r="{R_NS}"><sheets><sheet name="Report" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        )
        .into_bytes(),
    );
    package.set_part(
        "xl/_rels/workbook.xml.rels",
        relationships(&[
            (
                "rId1",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
                "worksheets/sheet1.xml",
            ),
            (
                "rId2",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
                "styles.xml",
            ),
            (
                "rId3",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings",
                "sharedStrings.xml",
            ),
        ]),
    );
    package.set_part(
        "xl/worksheets/sheet1.xml",
        format!(
            r#"{DECLARATION}<worksheet xmlns="{S_NS}" xmlns:r="{R_NS}"><sheetData>{sheet_data}</sheetData>{tail}</worksheet>"#
        )
        .into_bytes(),
    );
    package.set_part("xl/styles.xml", format!("{DECLARATION}{STYLES}").into_bytes());
    let items: String = shared_strings
        .iter()
        .map(|s| format!("<si><t>{s}</t></si>"))
        .collect();
    package.set_part(
        "xl/sharedStrings.xml",
        format!(
            r#"{DECLARATION}<sst xmlns="{S_NS}" count="{n}" uniqueCount="{n}">{items}</sst>"#,
            n = shared_strings.len()
        )
        .into_bytes(),
    );
    package.to_bytes().unwrap()
}

/// An inline-string cell
pub fn text_cell(reference: &str, text: &str, style: u32) -> String {
    format!(r#"<c r="{reference}" s="{style}" t="inlineStr"><is><t>{text}</t></is></c>"#)
}

/// A shared-string cell
pub fn shared_cell(reference: &str, index: usize, style: u32) -> String {
    format!(r#"<c r="{reference}" s="{style}" t="s"><v>{index}</v></c>"#)
}

pub fn row(number: u32, cells: &[String]) -> String {
    format!(r#"<row r="{number}">{}</row>"#, cells.concat())
}

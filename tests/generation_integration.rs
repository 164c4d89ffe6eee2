//! Integration tests for full generation runs writing temporary files

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use docstamp::resolve::{Deferred, Record};
use docstamp::sheet::{Cell, Workbook};
use docstamp::word::WordDocument;
use docstamp::{
    generate, spawn, GenerateConfig, GenerateError, GeneratedDocument, GenerationOptions, GenerationStatus,
    Resolver, Template, TemplateFormat,
};
use pretty_assertions::assert_eq;

use common::{docx, paragraph, row, text_cell, xlsx};

fn files_in(dir: &std::path::Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[test]
fn test_template_loaded_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("letter.DOCX");
    fs::write(&path, docx(&paragraph("Hi {{name}}"), None)).unwrap();

    let template = Template::from_path(&path).unwrap();
    assert_eq!(template.format(), TemplateFormat::Word);

    let unknown = dir.path().join("letter.odt");
    fs::write(&unknown, b"").unwrap();
    assert!(matches!(
        Template::from_path(&unknown),
        Err(GenerateError::Unsupported { .. })
    ));
    assert!(matches!(
        Template::from_path(dir.path().join("missing.docx")),
        Err(GenerateError::Io { .. })
    ));
}

#[test]
fn test_spreadsheet_artifact_keeps_format() {
    let dir = tempfile::tempdir().unwrap();
    let config = GenerateConfig::new().with_output_dir(dir.path());
    let template = Template::new(
        xlsx(&row(1, &[text_cell("A1", "{{title}}", 0)]), "", &[]),
        TemplateFormat::Spreadsheet,
    );

    let path = generate(&template, &config.resolver(Record::new("r").with("title", "Q3")), &config).unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("xlsx"));

    let workbook = Workbook::read(&fs::read(&path).unwrap()).unwrap();
    let first = &workbook.sheets[0].rows[0].cells[0];
    assert_eq!(first.value.as_text(), Some("Q3"));
}

#[test]
fn test_malformed_template_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = GenerateConfig::new().with_output_dir(dir.path());
    let body = [paragraph("{{items}}"), paragraph("{{label}}")].concat();
    let template = Template::new(docx(&body, None), TemplateFormat::Word);
    let data = Record::new("r").with("items", vec![Record::new("i").with("label", "x")]);

    let err = generate(&template, &config.resolver(data), &config).unwrap_err();
    assert!(err.is_malformed_template());
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn test_post_processor_edits_before_write() {
    let dir = tempfile::tempdir().unwrap();
    let config = GenerateConfig::new()
        .with_output_dir(dir.path())
        .with_post_processor(|document: &mut GeneratedDocument, resolver: &dyn Resolver| -> Result<(), GenerateError> {
            let GeneratedDocument::Spreadsheet(doc) = document else {
                return Err(GenerateError::Hook("expected a spreadsheet".to_string()));
            };
            let stamp = resolver
                .resolve("stamp")?
                .and_then(|d| d.as_scalar().map(str::to_string))
                .unwrap_or_default();
            if let Some(first) = doc.sheets[0].rows.first_mut() {
                first.cells.insert(5, Cell::text(5, stamp));
            }
            Ok(())
        });
    let template = Template::new(
        xlsx(&row(1, &[text_cell("A1", "report", 0)]), "", &[]),
        TemplateFormat::Spreadsheet,
    );

    let data = Record::new("r").with("stamp", "approved");
    let path = generate(&template, &config.resolver(data), &config).unwrap();
    let workbook = Workbook::read(&fs::read(&path).unwrap()).unwrap();
    let cells = &workbook.sheets[0].rows[0].cells;
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[1].column, 5);
    assert_eq!(cells[1].value.as_text(), Some("approved"));
}

#[test]
fn test_background_run_with_deferred_value() {
    let dir = tempfile::tempdir().unwrap();
    let options = GenerationOptions::default().with_deferred_timeout(Duration::from_millis(50));
    let config = GenerateConfig::new()
        .with_options(options)
        .with_output_dir(dir.path());

    // Never completed, so it times out and renders the fallback text
    let (_completer, pending) = Deferred::channel();
    let data = Record::new("r")
        .with("ready", Deferred::ready("now"))
        .with("pending", pending);
    let resolver: Arc<dyn Resolver> = Arc::new(config.resolver(data));
    let template = Template::new(
        docx(&paragraph("{{ready}}/{{pending}}"), None),
        TemplateFormat::Word,
    );

    let handle = spawn(template, resolver, config).unwrap();
    assert!(handle.wait_timeout(Duration::from_secs(30)));
    assert_eq!(handle.status(), GenerationStatus::Succeeded);

    let path = handle.wait().unwrap();
    let doc = WordDocument::open(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(doc.paragraphs(), vec!["now/-"]);
}

#[test]
fn test_background_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = GenerateConfig::new().with_output_dir(dir.path());
    let template = Template::new(b"not a zip".to_vec(), TemplateFormat::Word);
    let resolver: Arc<dyn Resolver> = Arc::new(config.resolver(Record::new("r")));

    let handle = spawn(template, resolver, config).unwrap();
    let result = handle.wait();
    assert!(matches!(result, Err(GenerateError::Package(_))));
    assert_eq!(files_in(dir.path()), 0);
}

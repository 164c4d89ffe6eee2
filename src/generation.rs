//! End-to-end generation runs
//!
//! A run picks the engine from the template format, applies the optional
//! post-processing hook to the finished document and writes the result to a
//! fresh temporary file. The file is only kept once every byte is on disk, so
//! a failed run never leaves an artifact behind.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::GenerateError;
use crate::resolve::Resolver;
use crate::sheet::{SpreadsheetDocument, SpreadsheetEngine, Workbook};
use crate::template::{Template, TemplateFormat};
use crate::word::{WordDocument, WordEngine};
use crate::GenerateConfig;

/// A rendered document in its native model
#[derive(Debug)]
pub enum GeneratedDocument {
    Word(WordDocument),
    Spreadsheet(SpreadsheetDocument),
}

impl GeneratedDocument {
    pub fn format(&self) -> TemplateFormat {
        match self {
            GeneratedDocument::Word(_) => TemplateFormat::Word,
            GeneratedDocument::Spreadsheet(_) => TemplateFormat::Spreadsheet,
        }
    }

    /// Serialize into package bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, GenerateError> {
        match self {
            GeneratedDocument::Word(doc) => doc.to_bytes(),
            GeneratedDocument::Spreadsheet(doc) => doc.to_bytes(),
        }
    }
}

/// Hook run once on the finished document, before it is written
pub trait PostProcessor: Send + Sync {
    fn process(&self, document: &mut GeneratedDocument, resolver: &dyn Resolver) -> Result<(), GenerateError>;
}

impl<F> PostProcessor for F
where
    F: Fn(&mut GeneratedDocument, &dyn Resolver) -> Result<(), GenerateError> + Send + Sync,
{
    fn process(&self, document: &mut GeneratedDocument, resolver: &dyn Resolver) -> Result<(), GenerateError> {
        self(document, resolver)
    }
}

/// Render a template into its native document model
pub fn render(
    template: &Template,
    resolver: &dyn Resolver,
    config: &GenerateConfig,
) -> Result<GeneratedDocument, GenerateError> {
    let fallback = config.options.fallback.as_str();
    let mut document = match template.format() {
        TemplateFormat::Word => {
            let mut doc = WordDocument::open(template.bytes())?;
            WordEngine::new(config.images.as_ref())
                .with_fallback(fallback)
                .render(&mut doc, resolver)?;
            GeneratedDocument::Word(doc)
        }
        TemplateFormat::Spreadsheet => {
            let workbook = Workbook::read(template.bytes())?;
            let doc = SpreadsheetEngine::new()
                .with_fallback(fallback)
                .render(&workbook, resolver)?;
            GeneratedDocument::Spreadsheet(doc)
        }
    };

    if let Some(hook) = &config.post_processor {
        hook.process(&mut document, resolver)?;
    }
    Ok(document)
}

/// Render a template and write it to a new temporary file
///
/// The file lands in `config.output_dir` (the system temp directory by
/// default) and is named `docstamp-*.docx` or `docstamp-*.xlsx`.
pub fn generate(
    template: &Template,
    resolver: &dyn Resolver,
    config: &GenerateConfig,
) -> Result<PathBuf, GenerateError> {
    let started = Instant::now();
    info!(format = ?template.format(), "generation started");

    let result = render(template, resolver, config)
        .and_then(|document| document.to_bytes())
        .and_then(|bytes| write_artifact(&bytes, template.format(), config.output_dir.as_deref()));

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(path) => info!(path = %path.display(), elapsed_ms, "generation finished"),
        Err(e) => warn!(error = %e, elapsed_ms, "generation failed"),
    }
    result
}

fn write_artifact(bytes: &[u8], format: TemplateFormat, dir: Option<&Path>) -> Result<PathBuf, GenerateError> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
    let suffix = format!(".{}", format.output_extension());

    let mut file = tempfile::Builder::new()
        .prefix("docstamp-")
        .suffix(&suffix)
        .tempfile_in(&dir)
        .map_err(|e| GenerateError::io("create temporary output", e))?;
    file.write_all(bytes)
        .map_err(|e| GenerateError::io("write temporary output", e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| GenerateError::io("sync temporary output", e))?;

    let (_, path) = file
        .keep()
        .map_err(|e| GenerateError::io("keep temporary output", e.error))?;
    Ok(path)
}

/// Observable state of a background run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Running,
    Succeeded,
    Failed,
}

type Outcome = Result<PathBuf, GenerateError>;

#[derive(Default)]
struct Shared {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

/// Publishes the run outcome, or `WorkerLost` if the worker unwinds first
struct Completion(Arc<Shared>);

impl Completion {
    fn finish(&self, outcome: Outcome) {
        let mut slot = self.0.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.0.done.notify_all();
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.finish(Err(GenerateError::WorkerLost));
    }
}

/// Handle to a generation running on its own thread
///
/// There is no cancellation: a started run ends in a result or a failure.
pub struct GenerationHandle {
    shared: Arc<Shared>,
}

impl GenerationHandle {
    pub fn status(&self) -> GenerationStatus {
        match &*self.lock() {
            None => GenerationStatus::Running,
            Some(Ok(_)) => GenerationStatus::Succeeded,
            Some(Err(_)) => GenerationStatus::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status() != GenerationStatus::Running
    }

    /// Block for at most `timeout`; returns whether the run has finished
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let slot = self.lock();
        let (slot, _) = self
            .shared
            .done
            .wait_timeout_while(slot, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.is_some()
    }

    /// Block until the run finishes and take its result
    pub fn wait(self) -> Result<PathBuf, GenerateError> {
        let slot = self.lock();
        let mut slot = self
            .shared
            .done
            .wait_while(slot, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take().unwrap_or(Err(GenerateError::WorkerLost))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Outcome>> {
        self.shared.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run [`generate`] on a background thread
pub fn spawn(
    template: Template,
    resolver: Arc<dyn Resolver>,
    config: GenerateConfig,
) -> Result<GenerationHandle, GenerateError> {
    let shared = Arc::new(Shared::default());
    let completion = Completion(Arc::clone(&shared));
    thread::Builder::new()
        .name("docstamp-generation".to_string())
        .spawn(move || {
            let outcome = generate(&template, resolver.as_ref(), &config);
            completion.finish(outcome);
        })
        .map_err(|e| GenerateError::io("spawn generation thread", e))?;
    Ok(GenerationHandle { shared })
}

//! docstamp CLI
//!
//! Usage:
//!   docstamp [OPTIONS] --data <FILE> <TEMPLATE>
//!
//! Options:
//!   -d, --data <FILE>      Data file (TOML) the placeholders resolve against
//!   -c, --options <FILE>   Generation options (TOML): locale, formats, translations
//!   -o, --output <FILE>    Copy the generated document here
//!       --image <NAME>     Render placeholder NAME as an image (repeatable)
//!       --columns <NAME>   Spread set NAME over columns (repeatable)
//!   -h, --help             Print help
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use docstamp::sheet::ListColumns;
use docstamp::word::ImagePlaceholder;
use docstamp::{generate, CustomRegistry, GenerateConfig, GenerationOptions, Template, Value};

#[derive(Parser)]
#[command(name = "docstamp")]
#[command(about = "Fill Word and Excel templates from structured data")]
struct Cli {
    /// Template file (.docx or .xlsx)
    template: PathBuf,

    /// Data file (TOML) the placeholders resolve against
    #[arg(short, long)]
    data: PathBuf,

    /// Generation options file (TOML)
    #[arg(short = 'c', long = "options")]
    options: Option<PathBuf>,

    /// Copy the generated document to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Placeholder names rendered as images
    #[arg(long = "image", value_name = "NAME")]
    images: Vec<String>,

    /// Set names spread over consecutive columns
    #[arg(long = "columns", value_name = "NAME")]
    columns: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docstamp=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let options = match &cli.options {
        Some(path) => match GenerationOptions::from_file(path) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("Error loading options '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => GenerationOptions::default(),
    };

    let data = match load_data(&cli.data) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error loading data '{}': {}", cli.data.display(), e);
            std::process::exit(1);
        }
    };

    let registry = match build_registry(&cli.images, &cli.columns) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let template = match Template::from_path(&cli.template) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error reading template '{}': {}", cli.template.display(), e);
            std::process::exit(1);
        }
    };

    let config = GenerateConfig::new()
        .with_options(options)
        .with_registry(registry);
    let resolver = config.resolver(data);

    let generated = match generate(&template, &resolver, &config) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match &cli.output {
        Some(target) => {
            if let Err(e) = fs::copy(&generated, target) {
                eprintln!("Error writing '{}': {}", target.display(), e);
                std::process::exit(1);
            }
            let _ = fs::remove_file(&generated);
            println!("{}", target.display());
        }
        None => println!("{}", generated.display()),
    }
}

fn load_data(path: &Path) -> Result<Value, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let table: toml::Value = toml::from_str(&content).map_err(|e| e.to_string())?;
    Ok(Value::from(table))
}

fn build_registry(images: &[String], columns: &[String]) -> Result<CustomRegistry, String> {
    let mut registry = CustomRegistry::new();
    for name in images {
        registry
            .register::<ImagePlaceholder>(name.as_str())
            .map_err(|e| e.to_string())?;
    }
    for name in columns {
        registry
            .register::<ListColumns>(name.as_str())
            .map_err(|e| e.to_string())?;
    }
    Ok(registry)
}

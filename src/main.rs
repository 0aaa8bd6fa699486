//! Command-line interface for xsdcheck

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::sync::Arc;

#[cfg(feature = "cli")]
use xsdcheck::documents::Document;
#[cfg(feature = "cli")]
use xsdcheck::limits::Limits;
#[cfg(feature = "cli")]
use xsdcheck::loaders::FileSchemaLoader;
#[cfg(feature = "cli")]
use xsdcheck::namespaces::{NamespaceContext, QName};
#[cfg(feature = "cli")]
use xsdcheck::validators::{Schema, TypeChecker, TypeRef, ValidatingReader, ValidatorOptions};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xsdcheck")]
#[command(author, version, about = "Validate XML documents against compiled XML schemas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an XML document against a compiled schema
    Validate {
        /// Path to the compiled schema (JSON)
        #[arg(short, long, value_name = "SCHEMA")]
        schema: Option<PathBuf>,

        /// Path to the XML file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Ignore xsi:schemaLocation and xsi:noNamespaceSchemaLocation
        #[arg(long)]
        no_hints: bool,

        /// Use strict resource limits
        #[arg(long)]
        strict: bool,

        /// Output errors as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Check a single value against a simple type
    #[command(name = "check-value")]
    CheckValue {
        /// Path to the compiled schema (JSON); built-in types only without it
        #[arg(short, long, value_name = "SCHEMA")]
        schema: Option<PathBuf>,

        /// Type name, `xs:NAME` or Clark notation `{namespace}name`
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// The value to check
        value: String,
    },

    /// Print the content automaton of a complex type in DOT format
    Dot {
        /// Path to the compiled schema (JSON)
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Complex type name in Clark notation
        #[arg(short = 't', long = "type")]
        type_name: String,
    },
}

#[cfg(feature = "cli")]
fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            schema,
            file,
            no_hints,
            strict,
            json,
        } => cmd_validate(schema, file, no_hints, strict, json),
        Commands::CheckValue {
            schema,
            type_name,
            value,
        } => cmd_check_value(schema, type_name, value),
        Commands::Dot { schema, type_name } => cmd_dot(schema, type_name),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

#[cfg(feature = "cli")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn load_schema(path: Option<&Path>) -> Result<Schema, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Schema::from_json(&fs::read_to_string(path)?)?),
        None => Ok(Schema::new()),
    }
}

#[cfg(feature = "cli")]
fn parse_type_name(name: &str) -> Result<QName, Box<dyn std::error::Error>> {
    if let Some(local) = name.strip_prefix("xs:").or_else(|| name.strip_prefix("xsd:")) {
        return Ok(QName::xsd(local));
    }
    Ok(name.parse()?)
}

#[cfg(feature = "cli")]
fn cmd_validate(
    schema_path: Option<PathBuf>,
    file: PathBuf,
    no_hints: bool,
    strict: bool,
    json_output: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let limits = if strict { Limits::strict() } else { Limits::default() };
    let schema = Arc::new(load_schema(schema_path.as_deref())?);

    let xml_content = fs::read_to_string(&file)?;
    limits.check_xml_size(xml_content.len())?;
    let uri = url::Url::from_file_path(fs::canonicalize(&file)?)
        .map_err(|_| format!("Cannot build a file URL for '{}'", file.display()))?;
    let doc = Document::from_string_with_uri(&xml_content, uri)?;

    let loader = FileSchemaLoader::new().with_limits(limits.clone());
    let options = ValidatorOptions::new()
        .with_limits(limits)
        .with_location_hints(!no_hints);
    let report = ValidatingReader::new(schema, &doc)
        .with_options(options)
        .with_loader(&loader)
        .read()?;

    if json_output {
        let errors: Vec<serde_json::Value> = report
            .errors
            .iter()
            .map(|e| {
                serde_json::json!({
                    "kind": e.kind.to_string(),
                    "message": e.message,
                    "location": e.location.as_ref().map(|l| l.to_string()),
                    "path": e.path,
                    "reason": e.reason,
                })
            })
            .collect();
        let output = serde_json::json!({
            "file": file.display().to_string(),
            "valid": report.is_valid(),
            "errors": errors,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if report.is_valid() {
        println!("✓ {} is valid", file.display());
    } else {
        println!("✗ {} is invalid", file.display());
        println!();
        println!("Errors:");
        for error in &report.errors {
            println!("  - {}", error);
        }
    }

    Ok(report.is_valid())
}

#[cfg(feature = "cli")]
fn cmd_check_value(
    schema_path: Option<PathBuf>,
    type_name: String,
    value: String,
) -> Result<bool, Box<dyn std::error::Error>> {
    let schema = load_schema(schema_path.as_deref())?;
    let name = parse_type_name(&type_name)?;
    let type_ref = schema
        .type_by_name(&name)
        .filter(TypeRef::is_simple)
        .ok_or_else(|| format!("Simple type '{}' not found", name))?;

    let normalized = xsdcheck::validators::facets::normalized_value(&value, &schema.merged_facets(type_ref));
    let namespaces = NamespaceContext::new();
    match TypeChecker::new(&schema, &namespaces).typed_value(&normalized, type_ref) {
        Ok((bound, typed)) => {
            println!("✓ '{}' is valid: {} ({})", normalized, typed, schema.type_name(bound));
            Ok(true)
        }
        Err(e) => {
            println!("✗ {}", e);
            Ok(false)
        }
    }
}

#[cfg(feature = "cli")]
fn cmd_dot(schema_path: PathBuf, type_name: String) -> Result<bool, Box<dyn std::error::Error>> {
    let schema = load_schema(Some(&schema_path))?;
    let name = parse_type_name(&type_name)?;
    let TypeRef::Complex(id) = schema
        .type_by_name(&name)
        .ok_or_else(|| format!("Type '{}' not found in schema", name))?
    else {
        return Err(format!("Type '{}' is not a complex type", name).into());
    };
    let automaton = schema.content_automaton(id, &Limits::default())?;
    println!("{}", automaton.to_dot());
    Ok(true)
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}

#![doc = include_str!("../README.md")]
//! Trellis CLI tool
//!
//! Every subcommand takes file paths; `-` reads standard input.

use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use trellis_tree::{
    Config, ConfigError, Error, FormatError, FormatOptions, LoadOptions, Mapping, SearchPath,
    Value, default_merge_resolve, format_mapping, overwrite_merge_resolve,
};

// ============================================================================
// Exit codes
// ============================================================================

const EXIT_SUCCESS: i32 = 0;
const EXIT_SYNTAX_ERROR: i32 = 1;
const EXIT_RESOLUTION_ERROR: i32 = 2;
const EXIT_IO_ERROR: i32 = 3;

// ============================================================================
// CLI argument structures
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Read, flatten and merge Trellis configuration files")]
#[command(version)]
struct Cli {
    /// Folder searched by `@<name>` includes (repeatable)
    #[arg(short = 'I', long = "include-dir", global = true)]
    include_dir: Vec<PathBuf>,

    /// Single-line mappings and sequences
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a file and write it back in canonical layout
    Fmt {
        /// Input file
        file: String,
    },

    /// Resolve one dotted path, such as `server.ports[0]`
    Get {
        /// Input file
        file: String,

        /// Path to read
        path: String,

        /// Print the value as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve `extends` and templated repetition, then write the result
    Flatten {
        /// Input file
        file: String,
    },

    /// Merge `source` into `target` and write the result
    Merge {
        /// File merged into
        target: String,

        /// File merged from
        source: String,

        /// Let the source replace values of another type instead of failing
        #[arg(long)]
        overwrite: bool,
    },

    /// Print the fully resolved tree as JSON
    Json {
        /// Input file
        file: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let format = if cli.compact {
        FormatOptions::default().inline()
    } else {
        FormatOptions::default()
    };
    let mut loader = Loader::new(&cli.include_dir);

    let result = match &cli.command {
        Command::Fmt { file } => run_fmt(&mut loader, file, format),
        Command::Get { file, path, json } => run_get(&mut loader, file, path, *json, format),
        Command::Flatten { file } => run_flatten(&mut loader, file, format),
        Command::Merge {
            target,
            source,
            overwrite,
        } => run_merge(&mut loader, target, source, *overwrite, format),
        Command::Json { file } => run_json(&mut loader, file),
    };

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            match &e {
                CliError::Diagnostic(error) => loader.report(error),
                _ => eprintln!("error: {e}"),
            }
            std::process::exit(e.exit_code());
        }
    }
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_fmt(loader: &mut Loader, file: &str, format: FormatOptions) -> Result<(), CliError> {
    let config = loader.load(file)?;
    print!("{}", format_mapping(&config, format));
    Ok(())
}

fn run_get(
    loader: &mut Loader,
    file: &str,
    path: &str,
    json: bool,
    format: FormatOptions,
) -> Result<(), CliError> {
    let config = loader.load(file)?.instantiate()?;
    let value = config.get_by_path(path)?;
    if json {
        println!("{}", to_json_string(&value)?);
        return Ok(());
    }
    match value {
        Value::Str(s) => println!("{s}"),
        Value::Mapping(m) => print!("{}", format_mapping(&m, format)),
        other => println!("{other}"),
    }
    Ok(())
}

fn run_flatten(loader: &mut Loader, file: &str, format: FormatOptions) -> Result<(), CliError> {
    let config = loader.load(file)?.instantiate()?;
    print!("{}", format_mapping(&config, format));
    Ok(())
}

fn run_merge(
    loader: &mut Loader,
    target: &str,
    source: &str,
    overwrite: bool,
    format: FormatOptions,
) -> Result<(), CliError> {
    let merged = loader.load(target)?;
    let source = loader.load(source)?;
    if overwrite {
        merged.merge(&source, &overwrite_merge_resolve)?;
    } else {
        merged.merge(&source, &default_merge_resolve)?;
    }
    print!("{}", format_mapping(&merged, format));
    Ok(())
}

fn run_json(loader: &mut Loader, file: &str) -> Result<(), CliError> {
    let config = loader.load(file)?.instantiate()?;
    println!("{}", to_json_string(&Value::Mapping(config.mapping().clone()))?);
    Ok(())
}

// ============================================================================
// Loading
// ============================================================================

/// Loads input files and remembers their text for diagnostics.
struct Loader {
    search: SearchPath,
    sources: Vec<(String, String)>,
}

impl Loader {
    fn new(include_dirs: &[PathBuf]) -> Self {
        let search = include_dirs
            .iter()
            .fold(SearchPath::new(), |search, dir| search.with_global(dir));
        Self {
            search,
            sources: Vec::new(),
        }
    }

    fn load(&mut self, file: &str) -> Result<Config, CliError> {
        let source = read_input(file)?;
        let mut options = LoadOptions::default().resolver(self.search.clone());
        let name = if file == "-" {
            "<stdin>".to_string()
        } else {
            options = options.path(file);
            file.to_string()
        };
        debug!(%name, bytes = source.len(), "loading");
        let loaded = Config::parse_with(&source, &options);
        self.sources.push((name, source));
        Ok(loaded?)
    }

    /// Render a format error against the text it came from. Errors inside
    /// included files are rendered against that file when it can be read.
    fn report(&self, error: &FormatError) {
        let source = self
            .sources
            .iter()
            .find(|(name, _)| *name == error.file)
            .map(|(_, source)| source.clone())
            .or_else(|| std::fs::read_to_string(&error.file).ok());
        match source {
            Some(source) => error.write_report(&source, io::stderr()),
            None => eprintln!("error: {error}"),
        }
    }
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug)]
enum CliError {
    Io(io::Error),
    Diagnostic(FormatError),
    Config(Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Io(_) => EXIT_IO_ERROR,
            CliError::Diagnostic(_) => EXIT_SYNTAX_ERROR,
            CliError::Config(Error::Config(ConfigError::Io(_) | ConfigError::Include { .. })) => {
                EXIT_IO_ERROR
            }
            CliError::Config(_) => EXIT_RESOLUTION_ERROR,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "{e}"),
            CliError::Diagnostic(e) => write!(f, "{e}"),
            CliError::Config(e) => write!(f, "{e}"),
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        match e {
            Error::Format(e) => CliError::Diagnostic(e),
            other => CliError::Config(other),
        }
    }
}

// ============================================================================
// JSON output
// ============================================================================

fn to_json_string(value: &Value) -> Result<String, CliError> {
    let json = value_to_json(value)?;
    serde_json::to_string_pretty(&json).map_err(|e| CliError::Io(io::Error::other(e)))
}

/// Convert a value to JSON, evaluating everything below it.
fn value_to_json(value: &Value) -> Result<serde_json::Value, Error> {
    Ok(match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Mapping(m) => mapping_to_json(m)?,
        Value::Sequence(s) => serde_json::Value::Array(
            s.values()?
                .iter()
                .map(value_to_json)
                .collect::<Result<_, _>>()?,
        ),
        placeholder => serde_json::Value::String(placeholder.to_string()),
    })
}

fn mapping_to_json(mapping: &Mapping) -> Result<serde_json::Value, Error> {
    let mut obj = serde_json::Map::new();
    for key in mapping.keys() {
        let value = value_to_json(&mapping.get(&key)?)?;
        obj.insert(key, value);
    }
    Ok(serde_json::Value::Object(obj))
}

// ============================================================================
// I/O helpers
// ============================================================================

fn read_input(file: &str) -> Result<String, io::Error> {
    if file == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_json_evaluates() {
        let config = Config::parse("n: 2\nm: {a: $n * 2, s: [1..$n], f: 0.5, z: None}").unwrap();
        let json = value_to_json(&config.get("m").unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"a": 4, "s": [1, 2], "f": 0.5, "z": null})
        );
    }

    #[test]
    fn test_exit_codes() {
        let syntax: CliError = Config::parse("a: [").unwrap_err().into();
        assert_eq!(syntax.exit_code(), EXIT_SYNTAX_ERROR);

        let resolution: CliError = Config::parse("a: $b")
            .unwrap()
            .get("a")
            .unwrap_err()
            .into();
        assert_eq!(resolution.exit_code(), EXIT_RESOLUTION_ERROR);

        let include: CliError = Config::parse("a: @'x.cfg'").unwrap_err().into();
        assert_eq!(include.exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from(["trellis", "-I", "shared", "get", "app.cfg", "db.port", "--json"])
            .unwrap();
        assert_eq!(cli.include_dir, vec![PathBuf::from("shared")]);
        assert!(matches!(
            cli.command,
            Command::Get { ref path, json: true, .. } if path == "db.port"
        ));
    }
}

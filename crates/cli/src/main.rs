mod migrate;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pkgsplit_core::{MappingConfig, MappingTable, Site, SourceUnit, SpanKind};

/// Exit code for an invalid mapping or unreadable input.
pub(crate) const EXIT_CONFIG: i32 = 2;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Split a Go package into sub-packages.
#[derive(Parser)]
#[command(name = "pkgsplit", version, about = "Split a Go package into sub-packages")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move files and rewrite references according to a mapping
    Migrate {
        /// Root of the source tree
        root: PathBuf,
        /// Mapping file (.toml or .json)
        #[arg(long)]
        mapping: PathBuf,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Abort before writing if any unit conflicts
        #[arg(long)]
        fail_on_conflict: bool,
        /// Worker threads (default: one per core)
        #[arg(long, default_value = "0")]
        jobs: usize,
    },

    /// Validate a mapping file and print it in precedence order
    Check {
        /// Mapping file (.toml or .json)
        #[arg(long)]
        mapping: PathBuf,
    },

    /// Print the classified spans of one source file
    Scan {
        /// Path to a .go file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Migrate {
            root,
            mapping,
            dry_run,
            fail_on_conflict,
            jobs,
        } => {
            migrate::cmd_migrate(
                migrate::MigrateArgs {
                    root: &root,
                    mapping: &mapping,
                    dry_run,
                    fail_on_conflict,
                    jobs,
                },
                cli.output,
                cli.quiet,
            );
        }
        Commands::Check { mapping } => {
            cmd_check(&mapping, cli.output, cli.quiet);
        }
        Commands::Scan { file } => {
            cmd_scan(&file, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load and validate a mapping, exiting with [`EXIT_CONFIG`] on error.
pub(crate) fn load_mapping(
    path: &Path,
    output: OutputFormat,
    quiet: bool,
) -> (MappingConfig, MappingTable) {
    let config = match MappingConfig::from_path(path) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(EXIT_CONFIG);
        }
    };
    match MappingTable::load(&config) {
        Ok(table) => (config, table),
        Err(e) => {
            report_error(
                &format!("error: invalid mapping '{}': {}", path.display(), e),
                output,
                quiet,
            );
            process::exit(EXIT_CONFIG);
        }
    }
}

fn cmd_check(mapping_path: &Path, output: OutputFormat, quiet: bool) {
    let (config, table) = load_mapping(mapping_path, output, quiet);

    match output {
        OutputFormat::Json => {
            let files: Vec<serde_json::Value> = table
                .files()
                .map(|(path, package)| serde_json::json!({ "path": path, "package": package }))
                .collect();
            let json = serde_json::json!({
                "valid": true,
                "module": table.module(),
                "include_tests": table.include_tests(),
                "exclude": config.exclude,
                "packages": table.packages().collect::<Vec<_>>(),
                "files": files,
                "symbols": table.symbols().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            println!("valid mapping");
            if !table.module().is_empty() {
                println!("module: {}", table.module());
            }
            println!("packages:");
            for p in table.packages() {
                let dir = if p.dir.is_empty() { "." } else { p.dir.as_str() };
                println!("  {:<12} {}  ({})", p.name, dir, p.import_path);
            }
            if table.files().next().is_some() {
                println!("files:");
                for (path, package) in table.files() {
                    println!("  {} -> {}", path, package);
                }
            }
            if table.symbols().next().is_some() {
                println!("symbols (precedence order):");
                for e in table.symbols() {
                    if e.is_renamed() {
                        println!("  {} -> {}.{}", e.symbol, e.package, e.exported);
                    } else {
                        println!("  {} -> {}", e.symbol, e.package);
                    }
                }
            }
        }
    }
}

fn cmd_scan(file: &Path, output: OutputFormat, quiet: bool) {
    let text = match std::fs::read_to_string(file) {
        Ok(t) => t,
        Err(e) => {
            report_error(
                &format!("error reading file '{}': {}", file.display(), e),
                output,
                quiet,
            );
            process::exit(EXIT_CONFIG);
        }
    };
    let unit = match SourceUnit::parse(file.display().to_string(), text) {
        Ok(u) => u,
        Err(e) => {
            report_error(
                &format!("parse ambiguity in '{}': {}", file.display(), e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };
    let sites = unit.sites();

    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": unit.original_path,
                "package": unit.package_name,
                "spans": unit.spans,
                "sites": sites,
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            println!("package {}", unit.package_name);
            let mut sites = sites.iter().peekable();
            for span in &unit.spans {
                if span.is_whitespace(&unit.text) {
                    continue;
                }
                let line = pkgsplit_core::scanner::line_of(&unit.text, span.start);
                let site = match sites.peek() {
                    Some(s) if span.kind == SpanKind::Identifier && s.start == span.start => {
                        sites.next().map(|s| site_label(&s.site))
                    }
                    _ => None,
                };
                let kind = format!("{:?}", span.kind);
                match site {
                    Some(label) => println!(
                        "{:>5}  {:<14} {:<24} {}",
                        line,
                        kind,
                        span.text(&unit.text),
                        label
                    ),
                    None => println!("{:>5}  {:<14} {:?}", line, kind, span.text(&unit.text)),
                }
            }
        }
    }
}

fn site_label(site: &Site) -> String {
    match site {
        Site::Reference => "reference".to_string(),
        Site::Selected { .. } => "selected".to_string(),
        Site::Declaration { kind } => format!("declaration ({:?})", kind),
    }
}

/// Report an error message, respecting output format and quiet mode.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

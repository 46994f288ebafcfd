//! CLI migrate subcommand.
//!
//! Loads the mapping, runs the pipeline over the tree and renders the
//! report. Exit codes: 0 for success (with or without warnings), 1 for a
//! partial failure, 2 when the mapping or the tree cannot be used.

use std::path::Path;
use std::process;

use pkgsplit_core::{DiskTree, MigrationReport, Outcome, RunOptions, RunStatus, UnitReport};

use tracing::info;

use crate::{load_mapping, report_error, OutputFormat, EXIT_CONFIG};

pub struct MigrateArgs<'a> {
    pub root: &'a Path,
    pub mapping: &'a Path,
    pub dry_run: bool,
    pub fail_on_conflict: bool,
    pub jobs: usize,
}

pub fn cmd_migrate(args: MigrateArgs<'_>, output: OutputFormat, quiet: bool) {
    let (_, table) = load_mapping(args.mapping, output, quiet);
    info!(
        mapping = %args.mapping.display(),
        packages = table.packages().count(),
        "migrate: mapping loaded"
    );

    let tree = match DiskTree::new(args.root) {
        Ok(t) => t,
        Err(e) => {
            report_error(
                &format!("error: cannot open source tree '{}': {}", args.root.display(), e),
                output,
                quiet,
            );
            process::exit(EXIT_CONFIG);
        }
    };

    let options = RunOptions {
        dry_run: args.dry_run,
        fail_on_conflict: args.fail_on_conflict,
        jobs: args.jobs,
    };
    let report = match pkgsplit_core::run(&tree, &table, &options) {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(EXIT_CONFIG);
        }
    };

    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            if !quiet {
                display_report_text(&report);
            }
        }
    }

    if report.status == RunStatus::PartialFailure {
        process::exit(1);
    }
}

fn display_report_text(report: &MigrationReport) {
    if report.dry_run {
        println!("dry run: no files written");
        println!();
    }

    for unit in &report.units {
        println!("{}", unit_line(unit));
        for warning in &unit.warnings {
            println!("    warning: {}", warning);
        }
    }

    let s = &report.summary;
    println!();
    println!(
        "{} units: {} moved, {} rewritten, {} unchanged, {} skipped, {} conflicts, {} failed",
        s.units, s.moved, s.rewritten, s.unchanged, s.skipped, s.conflicts, s.failed
    );
    if s.qualified > 0 || s.imports_added > 0 {
        println!("{} references qualified, {} imports added", s.qualified, s.imports_added);
    }
    if s.unscannable > 0 {
        println!("{} units could not be scanned and were left as they are", s.unscannable);
    }
    if report.aborted {
        println!("run aborted: --fail-on-conflict");
    }
    println!("status: {}", status_label(report.status));
}

fn unit_line(unit: &UnitReport) -> String {
    let mut line = format!("{:<10} {}", unit.outcome.label(), unit.path);
    if let Some(dest) = &unit.destination {
        line.push_str(&format!(" -> {}", dest));
    }

    let mut details = Vec::new();
    match &unit.outcome {
        Outcome::Skipped { reason } => details.push(reason.clone()),
        Outcome::Conflict { detail } => details.push(detail.clone()),
        Outcome::Failed { stage, reason } => details.push(format!("at {}: {}", stage, reason)),
        _ => {}
    }
    if let Some(change) = &unit.package_change {
        details.push(format!("package {} -> {}", change.from, change.to));
    }
    if unit.qualified > 0 {
        details.push(format!("{} qualified", unit.qualified));
    }
    if unit.renamed > 0 {
        details.push(format!("{} renamed", unit.renamed));
    }
    if !unit.imports_added.is_empty() {
        details.push(format!("+{} imports", unit.imports_added.len()));
    }
    if !details.is_empty() {
        line.push_str(&format!(" ({})", details.join(", ")));
    }
    line
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::SuccessWithWarnings => "success with warnings",
        RunStatus::PartialFailure => "partial failure",
    }
}

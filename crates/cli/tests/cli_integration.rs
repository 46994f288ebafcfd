//! CLI integration tests for the `pkgsplit` subcommands.
//!
//! Uses `assert_cmd` to spawn the binary against temporary trees and
//! verify exit codes, stdout content, and stderr content.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MAPPING: &str = r#"
module = "example.com/app"
source = "internal/cli"

[[packages]]
dir = "internal/cli"

[[packages]]
dir = "internal/cli/base"

[[packages]]
dir = "internal/cli/drive"

[[files]]
path = "files.go"
package = "drive"

[[symbols]]
name = "NewOutputWriter"
package = "base"

[[symbols]]
name = "handleCLIError"
package = "base"
rename = "HandleCLIError"
"#;

const FILES_GO: &str = "package cli\n\nfunc Bar() { NewOutputWriter() }\n";

fn pkgsplit() -> Command {
    cargo_bin_cmd!("pkgsplit")
}

/// A tree with one unit to move plus a mapping file next to it.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let cli = dir.path().join("src/internal/cli");
    fs::create_dir_all(&cli).unwrap();
    fs::write(cli.join("files.go"), FILES_GO).unwrap();
    fs::write(dir.path().join("mapping.toml"), MAPPING).unwrap();
    dir
}

fn root(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("src")
}

fn mapping(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("mapping.toml")
}

fn write_mapping(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    pkgsplit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Split a Go package into sub-packages"));
}

#[test]
fn version_exits_0() {
    pkgsplit()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pkgsplit"));
}

// ──────────────────────────────────────────────
// 2. migrate
// ──────────────────────────────────────────────

#[test]
fn migrate_moves_and_requalifies() {
    let dir = fixture();
    pkgsplit()
        .arg("migrate")
        .arg(root(&dir))
        .arg("--mapping")
        .arg(mapping(&dir))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "moved      internal/cli/files.go -> internal/cli/drive/files.go",
        ))
        .stdout(predicate::str::contains("status: success"));

    let moved = fs::read_to_string(root(&dir).join("internal/cli/drive/files.go")).unwrap();
    assert_eq!(
        moved,
        "package drive\n\nimport (\n\t\"example.com/app/internal/cli/base\"\n)\n\nfunc Bar() { base.NewOutputWriter() }\n"
    );
    assert!(!root(&dir).join("internal/cli/files.go").exists());
}

#[test]
fn migrate_twice_reports_no_changes() {
    let dir = fixture();
    for _ in 0..2 {
        pkgsplit()
            .args(["--output", "json", "migrate"])
            .arg(root(&dir))
            .arg("--mapping")
            .arg(mapping(&dir))
            .assert()
            .success();
    }
    let out = pkgsplit()
        .args(["--output", "json", "migrate"])
        .arg(root(&dir))
        .arg("--mapping")
        .arg(mapping(&dir))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["summary"]["moved"], 0);
    assert_eq!(report["summary"]["rewritten"], 0);
    assert_eq!(report["status"], "success");
}

#[test]
fn migrate_dry_run_leaves_tree_untouched() {
    let dir = fixture();
    pkgsplit()
        .arg("migrate")
        .arg(root(&dir))
        .arg("--mapping")
        .arg(mapping(&dir))
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("dry run: no files written"));
    assert_eq!(
        fs::read_to_string(root(&dir).join("internal/cli/files.go")).unwrap(),
        FILES_GO
    );
}

#[test]
fn migrate_json_report_has_units() {
    let dir = fixture();
    let out = pkgsplit()
        .args(["--output", "json", "migrate"])
        .arg(root(&dir))
        .arg("--mapping")
        .arg(mapping(&dir))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let unit = &report["units"][0];
    assert_eq!(unit["path"], "internal/cli/files.go");
    assert_eq!(unit["outcome"]["kind"], "moved");
    assert_eq!(unit["package_change"]["to"], "drive");
    assert_eq!(unit["imports_added"][0]["path"], "example.com/app/internal/cli/base");
}

#[test]
fn migrate_conflict_with_fail_on_conflict_exits_1() {
    let dir = fixture();
    let drive = root(&dir).join("internal/cli/drive");
    fs::create_dir_all(&drive).unwrap();
    fs::write(drive.join("files.go"), "package drive\n\nvar taken = 1\n").unwrap();

    pkgsplit()
        .arg("migrate")
        .arg(root(&dir))
        .arg("--mapping")
        .arg(mapping(&dir))
        .arg("--fail-on-conflict")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("conflict"))
        .stdout(predicate::str::contains("status: partial failure"));
    assert!(root(&dir).join("internal/cli/files.go").exists());
}

#[test]
fn migrate_conflict_without_fail_on_conflict_exits_0() {
    let dir = fixture();
    let drive = root(&dir).join("internal/cli/drive");
    fs::create_dir_all(&drive).unwrap();
    fs::write(drive.join("files.go"), "package drive\n\nvar taken = 1\n").unwrap();

    pkgsplit()
        .arg("migrate")
        .arg(root(&dir))
        .arg("--mapping")
        .arg(mapping(&dir))
        .assert()
        .success()
        .stdout(predicate::str::contains("status: success with warnings"));
}

#[test]
fn migrate_ambiguous_mapping_exits_2() {
    let dir = fixture();
    let bad = write_mapping(
        dir.path(),
        "bad.toml",
        &format!("{}\n[[symbols]]\nname = \"NewOutputWriter\"\npackage = \"drive\"\n", MAPPING),
    );
    pkgsplit()
        .arg("migrate")
        .arg(root(&dir))
        .arg("--mapping")
        .arg(bad)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NewOutputWriter"));
    assert!(root(&dir).join("internal/cli/files.go").exists());
}

#[test]
fn migrate_missing_root_exits_2() {
    let dir = fixture();
    pkgsplit()
        .arg("migrate")
        .arg(dir.path().join("nope"))
        .arg("--mapping")
        .arg(mapping(&dir))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot open source tree"));
}

#[test]
fn quiet_suppresses_error_output() {
    let dir = fixture();
    pkgsplit()
        .args(["--quiet", "migrate"])
        .arg(root(&dir))
        .arg("--mapping")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .code(2)
        .stderr(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 3. check
// ──────────────────────────────────────────────

#[test]
fn check_lists_symbols_in_precedence_order() {
    let dir = fixture();
    pkgsplit()
        .arg("check")
        .arg("--mapping")
        .arg(mapping(&dir))
        .assert()
        .success()
        .stdout(predicate::str::contains("valid mapping"))
        .stdout(predicate::str::contains(
            "  NewOutputWriter -> base\n  handleCLIError -> base.HandleCLIError",
        ));
}

#[test]
fn check_json_reports_packages() {
    let dir = fixture();
    let out = pkgsplit()
        .args(["--output", "json", "check", "--mapping"])
        .arg(mapping(&dir))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["packages"].as_array().unwrap().len(), 3);
    assert_eq!(json["files"][0]["path"], "internal/cli/files.go");
}

#[test]
fn check_rejects_unknown_format() {
    let dir = fixture();
    let path = write_mapping(dir.path(), "mapping.yaml", "module: x\n");
    pkgsplit()
        .arg("check")
        .arg("--mapping")
        .arg(path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unsupported mapping format"));
}

#[test]
fn check_json_error_on_stderr() {
    let dir = fixture();
    let path = write_mapping(
        dir.path(),
        "bad.json",
        r#"{"packages": [{"dir": "a"}], "symbols": [{"name": "X", "package": "b"}]}"#,
    );
    pkgsplit()
        .args(["--output", "json", "check", "--mapping"])
        .arg(path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("\"error\""));
}

// ──────────────────────────────────────────────
// 4. scan
// ──────────────────────────────────────────────

#[test]
fn scan_prints_classified_spans() {
    let dir = fixture();
    pkgsplit()
        .arg("scan")
        .arg(root(&dir).join("internal/cli/files.go"))
        .assert()
        .success()
        .stdout(predicate::str::contains("package cli"))
        .stdout(predicate::str::contains("declaration (PackageLevel)"))
        .stdout(predicate::str::contains("reference"));
}

#[test]
fn scan_unterminated_literal_exits_1() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("broken.go");
    fs::write(&file, "package cli\n\nvar s = \"open\n").unwrap();
    pkgsplit()
        .arg("scan")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unterminated string literal"));
}

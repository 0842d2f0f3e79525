//! Integration tests for the tooltown CLI
//!
//! Runs the built binary against small generated PDFs and checks outputs,
//! exit codes and that no scratch files are left behind.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::{tempdir, TempDir};
use tooltown_core::fixtures;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempdir().expect("Failed to create temp directory"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_pdf(&self, name: &str, bytes: Vec<u8>) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, bytes).expect("Failed to write input");
        path
    }

    fn scratch(&self) -> PathBuf {
        self.path("scratch")
    }

    /// Runs the CLI with this workspace's scratch directory.
    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_tooltown"))
            .arg("--scratch-dir")
            .arg(self.scratch())
            .args(args)
            .output()
            .expect("Failed to run CLI")
    }

    fn scratch_entries(&self) -> usize {
        fs::read_dir(self.scratch()).map(|e| e.count()).unwrap_or(0)
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn pages_in(path: &Path) -> usize {
    fixtures::page_count_of(&fs::read(path).unwrap())
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_tooltown"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let help = stdout(&output);
    for command in ["merge", "split", "rotate", "encrypt", "extract-text", "validate"] {
        assert!(help.contains(command), "help lacks {command}");
    }
}

#[test]
fn test_cli_merge() {
    let ws = Workspace::new();
    let a = ws.write_pdf("a.pdf", fixtures::sample_pdf(2));
    let b = ws.write_pdf("b.pdf", fixtures::sample_pdf(3));
    let out = ws.path("merged.pdf");

    let output = ws.run(&["merge", arg(&a), arg(&b), "-o", arg(&out)]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("✓ Merged 2 files"));
    assert_eq!(pages_in(&out), 5);
    assert_eq!(ws.scratch_entries(), 0);
}

#[test]
fn test_cli_split() {
    let ws = Workspace::new();
    let input = ws.write_pdf("in.pdf", fixtures::sample_pdf(4));
    let out = ws.path("part.pdf");

    let output = ws.run(&["split", arg(&input), "-o", arg(&out), "--start", "2", "--end", "3"]);
    assert!(output.status.success());
    assert_eq!(pages_in(&out), 2);
}

#[test]
fn test_cli_rotate_invalid_angle() {
    let ws = Workspace::new();
    let input = ws.write_pdf("in.pdf", fixtures::sample_pdf(1));
    let out = ws.path("rotated.pdf");

    let output = ws.run(&["rotate", arg(&input), "-o", arg(&out), "--angle", "45"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("90, 180 or 270"));
    assert!(!out.exists());
    assert_eq!(ws.scratch_entries(), 0);
}

#[test]
fn test_cli_rotate_selected_pages() {
    let ws = Workspace::new();
    let input = ws.write_pdf("in.pdf", fixtures::sample_pdf(3));
    let out = ws.path("rotated.pdf");

    let output = ws.run(&[
        "rotate", arg(&input), "-o", arg(&out), "--angle", "180", "--pages", "1,3",
    ]);
    assert!(output.status.success());
    assert_eq!(pages_in(&out), 3);
}

#[test]
fn test_cli_encrypt_decrypt() {
    let ws = Workspace::new();
    let input = ws.write_pdf("in.pdf", fixtures::pdf_with_texts(&["secret words"]));
    let locked = ws.path("locked.pdf");
    let unlocked = ws.path("unlocked.pdf");

    let output = ws.run(&[
        "encrypt", arg(&input), "-o", arg(&locked), "--user-password", "hunter22",
    ]);
    assert!(output.status.success());

    let output = ws.run(&["decrypt", arg(&locked), "-o", arg(&unlocked), "--password", "nope"]);
    assert!(!output.status.success());

    let output = ws.run(&["decrypt", arg(&locked), "-o", arg(&unlocked), "--password", "hunter22"]);
    assert!(output.status.success());
    assert_eq!(pages_in(&unlocked), 1);
    assert_eq!(ws.scratch_entries(), 0);
}

#[test]
fn test_cli_extract_text() {
    let ws = Workspace::new();
    let input = ws.write_pdf("in.pdf", fixtures::pdf_with_texts(&["alpha", "beta"]));

    let output = ws.run(&["extract-text", arg(&input), "--pages", "2"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("--- Page 2 ---"));
    assert!(text.contains("beta"));
    assert!(!text.contains("alpha"));
}

#[test]
fn test_cli_validate() {
    let ws = Workspace::new();
    let good = ws.write_pdf("good.pdf", fixtures::sample_pdf(1));
    let bad = ws.write_pdf("bad.pdf", b"not a pdf at all".to_vec());

    assert!(ws.run(&["validate", arg(&good)]).status.success());
    assert!(!ws.run(&["validate", arg(&bad)]).status.success());
}

#[test]
fn test_cli_info() {
    let ws = Workspace::new();
    let input = ws.write_pdf("in.pdf", fixtures::sample_pdf(3));

    let output = ws.run(&["info", arg(&input)]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Pages: 3"));
}

#[test]
fn test_cli_missing_input() {
    let ws = Workspace::new();
    let out = ws.path("out.pdf");
    let output = ws.run(&["compress", arg(&ws.path("missing.pdf")), "-o", arg(&out)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.pdf"));
}

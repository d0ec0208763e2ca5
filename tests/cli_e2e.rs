//! End-to-end tests for the pagepress binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pagepress() -> Command {
    Command::cargo_bin("pagepress").expect("binary builds")
}

#[test]
fn test_help_lists_subcommands() {
    pagepress()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("single"))
        .stdout(predicate::str::contains("manifest"))
        .stdout(predicate::str::contains("dir"));
}

#[test]
fn test_version_prints_name() {
    pagepress()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pagepress"));
}

#[test]
fn test_missing_subcommand_fails() {
    pagepress().assert().failure();
}

#[test]
fn test_file_subcommand_missing_input_exits_nonzero() {
    let temp_dir = TempDir::new().expect("temp dir");
    pagepress()
        .args(["file", "/definitely/not/here.txt", "-o"])
        .arg(temp_dir.path())
        .arg("-q")
        .assert()
        .failure();
}

#[test]
fn test_dir_subcommand_converts_images() {
    let temp_dir = TempDir::new().expect("temp dir");
    let scans = temp_dir.path().join("scans");
    std::fs::create_dir_all(&scans).expect("scans dir");
    image::RgbImage::from_pixel(12, 12, image::Rgb([90, 90, 200]))
        .save(scans.join("page.png"))
        .expect("write png");
    let out = temp_dir.path().join("out");

    pagepress()
        .arg("dir")
        .arg(&scans)
        .arg("-o")
        .arg(&out)
        .arg("-q")
        .assert()
        .success();

    assert!(out.join("pdfs").join("page.pdf").exists());
}

#[test]
fn test_dir_subcommand_empty_directory_exits_nonzero() {
    let temp_dir = TempDir::new().expect("temp dir");
    let empty = temp_dir.path().join("empty");
    std::fs::create_dir_all(&empty).expect("empty dir");

    pagepress()
        .arg("dir")
        .arg(&empty)
        .arg("-o")
        .arg(temp_dir.path().join("out"))
        .arg("-q")
        .assert()
        .failure();
}

#[test]
fn test_invalid_concurrency_rejected() {
    pagepress()
        .args(["single", "https://example.com/a.png", "-c", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

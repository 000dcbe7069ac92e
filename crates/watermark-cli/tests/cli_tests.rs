//! CLI integration tests

use assert_cmd::Command;
use image::{DynamicImage, Rgb, RgbImage};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temp directory with a config file that keeps templates inside it
fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let templates = dir.path().join("templates");
    std::fs::write(
        &config,
        format!(
            "[templates]\ndirectory = {:?}\nauto_load_last = false\n\n[fonts]\ndirectories = []\n",
            templates.to_string_lossy()
        ),
    )
    .unwrap();
    (dir, config)
}

fn write_image(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([20, 40, 60])))
        .save(path)
        .unwrap();
}

fn watermark(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("watermark").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn test_cli_info_command() {
    let (_dir, config) = workspace();
    watermark(&config)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Watermark v"))
        .stdout(predicate::str::contains("System Information"))
        .stdout(predicate::str::contains("CPU cores"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("watermark").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("template"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("watermark").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("watermark").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

#[test]
fn test_render_single_image() {
    let (dir, config) = workspace();
    let input = dir.path().join("photo.png");
    let output = dir.path().join("marked.png");
    write_image(&input, 200, 100);

    watermark(&config)
        .args(["render", "--text", "HELLO", "--position", "center"])
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let marked = image::open(&output).unwrap().to_rgb8();
    assert_eq!(marked.dimensions(), (200, 100));
    assert!(marked.pixels().any(|p| *p != Rgb([20, 40, 60])));
}

#[test]
fn test_render_missing_input_fails() {
    let (dir, config) = workspace();
    watermark(&config)
        .arg("render")
        .arg("-i")
        .arg(dir.path().join("nope.jpg"))
        .arg("-o")
        .arg(dir.path().join("out.jpg"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.jpg"));
}

#[test]
fn test_preview_maps_points() {
    let (dir, config) = workspace();
    let input = dir.path().join("large.png");
    write_image(&input, 2000, 1500);

    watermark(&config)
        .args(["preview", "--max-width", "500", "--max-height", "500", "--map", "50,50"])
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("preview.png"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Preview 500x375 of 2000x1500"))
        .stdout(predicate::str::contains("is base (200, 200)"));
}

#[test]
fn test_batch_directory() {
    let (dir, config) = workspace();
    let photos = dir.path().join("photos");
    std::fs::create_dir_all(&photos).unwrap();
    write_image(&photos.join("a.png"), 120, 80);
    write_image(&photos.join("b.png"), 120, 80);
    let out = dir.path().join("out");

    watermark(&config)
        .args(["batch", "--text", "BATCH", "--format", "png", "--workers", "2"])
        .arg(&photos)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 2 of 2"));

    assert!(out.join("a_watermarked.png").exists());
    assert!(out.join("b_watermarked.png").exists());
}

#[test]
fn test_batch_reports_failures() {
    let (dir, config) = workspace();
    let good = dir.path().join("good.png");
    let bad = dir.path().join("bad.png");
    write_image(&good, 50, 50);
    std::fs::write(&bad, b"garbage").unwrap();

    watermark(&config)
        .args(["batch", "--json"])
        .arg(&good)
        .arg(&bad)
        .arg("-o")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"succeeded\""))
        .stdout(predicate::str::contains("failed to process bad.png"));
}

#[test]
fn test_template_lifecycle() {
    let (_dir, config) = workspace();

    watermark(&config)
        .args(["template", "save", "proof", "--text", "PROOF", "--opacity", "50"])
        .assert()
        .success();

    watermark(&config)
        .args(["template", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("proof"));

    watermark(&config)
        .args(["template", "show", "proof"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"text\": \"PROOF\""))
        .stdout(predicate::str::contains("\"opacity\": 50"));

    watermark(&config)
        .args(["template", "delete", "proof"])
        .assert()
        .success();

    watermark(&config)
        .args(["template", "show", "proof"])
        .assert()
        .failure();
}

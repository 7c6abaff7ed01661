//! CLI integration tests for gram-post
//!
//! Nothing here reaches the network: every command either stops before
//! loading secrets or fails on missing ones.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

/// Temp dir with a config whose secrets file is empty
fn setup_test_env() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();

    let env_file = temp_dir.path().join("secrets.env");
    fs::write(&env_file, "# no secrets yet\n").unwrap();

    let config_path = temp_dir.path().join("config.toml");
    let config_content = format!(
        r#"
[credentials]
storage = "env_file"
env_file = "{}"

[token]
status_file = "{}"
"#,
        escape_path_for_toml(&env_file),
        escape_path_for_toml(&temp_dir.path().join("token_info.json"))
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path)
}

fn media_folder(root: &Path, files: &[&str], post_yaml: Option<&str>) -> PathBuf {
    let folder = root.join("post");
    fs::create_dir_all(&folder).unwrap();
    for name in files {
        fs::write(folder.join(name), b"media").unwrap();
    }
    if let Some(yaml) = post_yaml {
        fs::write(folder.join("post.yaml"), yaml).unwrap();
    }
    folder
}

fn gram_post(config_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gram-post").unwrap();
    cmd.arg("--config")
        .arg(config_path)
        .env_remove("ACCOUNT_ID")
        .env_remove("ACCESS_TOKEN")
        .env_remove("CLOUDINARY_API")
        .env_remove("CLOUDINARY_SECRET");
    cmd
}

const POST_YAML: &str = r##"
caption: Sunset over the bay
hashtags:
  - sunset
  - "#bay"
location: "110843418940484"
user_tags:
  - "@alice"
"##;

#[test]
fn test_help_flag_output() {
    let mut cmd = Command::cargo_bin("gram-post").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Publish photos, carousels, stories and reels to Instagram",
        ))
        .stdout(predicate::str::contains("feed"))
        .stdout(predicate::str::contains("story"))
        .stdout(predicate::str::contains("reel"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version_flag_output() {
    let mut cmd = Command::cargo_bin("gram-post").unwrap();

    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gram-post"));
}

#[test]
fn test_feed_dry_run_lists_carousel() {
    let (temp_dir, config_path) = setup_test_env();
    let folder = media_folder(temp_dir.path(), &["b.mp4", "a.jpg", "notes.txt"], Some(POST_YAML));

    gram_post(&config_path)
        .arg("feed")
        .arg(&folder)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would publish a carousel post with 2 file(s)"))
        .stdout(predicate::str::contains("[image]"))
        .stdout(predicate::str::contains("[video]"))
        .stdout(predicate::str::contains("Sunset over the bay\n\n#sunset #bay"))
        .stdout(predicate::str::contains("Location: 110843418940484"))
        .stdout(predicate::str::contains("Tagged: alice"))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_feed_dry_run_json_output() {
    let (temp_dir, config_path) = setup_test_env();
    let folder = media_folder(temp_dir.path(), &["02.jpg", "01.jpg"], Some(POST_YAML));

    let output = gram_post(&config_path)
        .args(["--format", "json", "feed"])
        .arg(&folder)
        .arg("--dry-run")
        .output()
        .unwrap();

    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["kind"], "carousel");
    assert_eq!(plan["location_id"], "110843418940484");

    let files = plan["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0]["path"].as_str().unwrap().ends_with("01.jpg"));
    assert!(files[1]["path"].as_str().unwrap().ends_with("02.jpg"));
    assert_eq!(files[0]["kind"], "image");
}

#[test]
fn test_feed_dry_run_single_without_post_file() {
    let (temp_dir, config_path) = setup_test_env();
    let folder = media_folder(temp_dir.path(), &["only.png"], None);

    gram_post(&config_path)
        .arg("feed")
        .arg(&folder)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Would publish a single post with 1 file(s)"));
}

#[test]
fn test_feed_dry_run_with_post_file_override() {
    let (temp_dir, config_path) = setup_test_env();
    let folder = media_folder(temp_dir.path(), &["a.jpg"], Some(POST_YAML));
    let other = temp_dir.path().join("other.yaml");
    fs::write(&other, "caption: Replacement caption\n").unwrap();

    gram_post(&config_path)
        .arg("feed")
        .arg(&folder)
        .arg("--post-file")
        .arg(&other)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Replacement caption"))
        .stdout(predicate::str::contains("Sunset").not());
}

#[test]
fn test_feed_empty_folder_is_invalid_input() {
    let (temp_dir, config_path) = setup_test_env();
    let folder = media_folder(temp_dir.path(), &["readme.md"], Some(POST_YAML));

    gram_post(&config_path)
        .arg("feed")
        .arg(&folder)
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("no media files found"));
}

#[test]
fn test_feed_missing_folder_fails() {
    let (temp_dir, config_path) = setup_test_env();

    gram_post(&config_path)
        .arg("feed")
        .arg(temp_dir.path().join("does-not-exist"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Media folder not readable"));
}

#[test]
fn test_feed_without_secrets_fails_before_upload() {
    let (temp_dir, config_path) = setup_test_env();
    let folder = media_folder(temp_dir.path(), &["a.jpg"], Some(POST_YAML));

    gram_post(&config_path)
        .arg("feed")
        .arg(&folder)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Missing secret"));
}

#[test]
fn test_reel_rejects_still_image_without_from_image() {
    let (temp_dir, config_path) = setup_test_env();
    let image = temp_dir.path().join("photo.jpg");
    fs::write(&image, b"jpeg").unwrap();

    gram_post(&config_path)
        .arg("reel")
        .arg(&image)
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("--from-image"));
}

#[test]
fn test_reel_from_image_needs_local_file() {
    let (_temp_dir, config_path) = setup_test_env();

    gram_post(&config_path)
        .args(["reel", "https://cdn.example.com/photo.jpg", "--from-image"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_story_missing_file_is_invalid_input() {
    let (temp_dir, config_path) = setup_test_env();

    gram_post(&config_path)
        .arg("story")
        .arg(temp_dir.path().join("missing.jpg"))
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_invalid_format_rejected() {
    let (temp_dir, config_path) = setup_test_env();
    let folder = media_folder(temp_dir.path(), &["a.jpg"], None);

    gram_post(&config_path)
        .args(["--format", "xml", "feed"])
        .arg(&folder)
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_unparseable_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[publish\nattempts = ").unwrap();
    let folder = media_folder(temp_dir.path(), &["a.jpg"], None);

    gram_post(&config_path)
        .arg("feed")
        .arg(&folder)
        .arg("--dry-run")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config"));
}

//! CLI冒烟测试

use assert_cmd::Command;

#[test]
fn test_help_succeeds() {
    Command::cargo_bin("lexiweave")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn test_init_config_writes_example() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lexiweave.toml");

    Command::cargo_bin("lexiweave")
        .unwrap()
        .arg("init-config")
        .arg(&path)
        .assert()
        .success();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("api_profiles"));
}

#[test]
fn test_annotate_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("page.html");
    std::fs::write(&input, "<html><body><p>x</p></body></html>").unwrap();

    Command::cargo_bin("lexiweave")
        .unwrap()
        .env_remove("LEXIWEAVE_API_KEY")
        .current_dir(dir.path())
        .arg("annotate")
        .arg(&input)
        .assert()
        .failure();
}

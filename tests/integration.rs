use std::path::PathBuf;
use std::process::Command;

fn cjdocs_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cjdocs");
    path
}

/// `build-index` without a docs repo URL and no persisted/prebuilt index
/// available must fail with a config error and exit code 1 (spec §6).
#[test]
fn build_index_without_repo_url_exits_with_config_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = Command::new(cjdocs_binary())
        .args(["--data-dir", tmp.path().to_str().unwrap(), "build-index"])
        .output()
        .expect("failed to run cjdocs binary");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error"), "stderr should report the error: {stderr}");
}

/// An empty `--docs-version` is rejected before any index work starts.
#[test]
fn empty_docs_version_exits_with_config_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = Command::new(cjdocs_binary())
        .args([
            "--data-dir",
            tmp.path().to_str().unwrap(),
            "--docs-version",
            "",
            "build-index",
        ])
        .output()
        .expect("failed to run cjdocs binary");

    assert_eq!(output.status.code(), Some(1));
}

/// `--embedding openai` without `OPENAI_API_KEY` is rejected at startup.
#[test]
fn openai_embedding_without_key_exits_with_config_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = Command::new(cjdocs_binary())
        .env_remove("OPENAI_API_KEY")
        .args([
            "--data-dir",
            tmp.path().to_str().unwrap(),
            "--embedding",
            "openai",
            "build-index",
        ])
        .output()
        .expect("failed to run cjdocs binary");

    assert_eq!(output.status.code(), Some(1));
}

/// Shared fixtures for gitbackup end-to-end tests

use assert_fs::prelude::*;
use assert_fs::TempDir;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gitbackup::Config;

/// Run `git` in `dir` with a fixed identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .expect("Failed to run git");
    assert!(status.success(), "git {:?} failed in {}", args, dir.display());
}

/// Temporary world: upstream bare repositories, a backup root, a log file
/// and a mocked GitHub API
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub server: MockServer,
}

impl TestEnvironment {
    pub async fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            server: MockServer::start().await,
        }
    }

    pub fn upstream_root(&self) -> PathBuf {
        self.temp_dir.child("upstream").path().to_path_buf()
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.temp_dir.child("backup").path().to_path_buf()
    }

    pub fn log_file(&self) -> PathBuf {
        self.temp_dir.child("logs/backup.log").path().to_path_buf()
    }

    fn work_dir(&self, name: &str) -> PathBuf {
        self.upstream_root().join(format!("{}-work", name))
    }

    fn bare_dir(&self, name: &str) -> PathBuf {
        self.upstream_root().join(format!("{}.git", name))
    }

    /// Create a bare upstream with one commit and return its clone URL
    pub fn create_upstream(&self, name: &str) -> String {
        let work = self.work_dir(name);
        std::fs::create_dir_all(&work).expect("Failed to create work dir");
        git(&work, &["init", "--quiet"]);
        std::fs::write(work.join("README.md"), format!("# {}\n", name)).unwrap();
        git(&work, &["add", "README.md"]);
        git(&work, &["commit", "--quiet", "-m", "initial"]);

        let bare = self.bare_dir(name);
        git(
            &self.upstream_root(),
            &["clone", "--quiet", "--bare", work.to_str().unwrap(), bare.to_str().unwrap()],
        );

        format!("file://{}", bare.display())
    }

    /// Add a commit upstream
    pub fn push_commit(&self, name: &str, file: &str) {
        let work = self.work_dir(name);
        std::fs::write(work.join(file), "change\n").unwrap();
        git(&work, &["add", file]);
        git(&work, &["commit", "--quiet", "-m", "change"]);
        git(&work, &["push", "--quiet", self.bare_dir(name).to_str().unwrap(), "HEAD"]);
    }

    /// Make an upstream unreachable
    pub fn delete_upstream(&self, name: &str) {
        std::fs::remove_dir_all(self.bare_dir(name)).expect("Failed to delete upstream");
    }

    /// Serve `clone_urls` from `GET /user/repos`, replacing earlier listings
    pub async fn serve_listing(&self, clone_urls: &[String]) {
        self.server.reset().await;
        let items: Vec<_> = clone_urls
            .iter()
            .map(|url| json!({ "clone_url": url }))
            .collect();

        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(items))
            .mount(&self.server)
            .await;
    }

    pub fn config(&self) -> Config {
        let mut config = Config::new("ghp_test", "octocat", self.backup_dir(), self.log_file());
        config.github_api_url = self.server.uri();
        config
    }

    /// Write the JSON config file the binary reads
    pub fn write_config_file(&self) -> PathBuf {
        let content = json!({
            "github_token": "ghp_test",
            "github_username": "octocat",
            "backup_dir": self.backup_dir(),
            "log_file": self.log_file(),
            "github_api_url": self.server.uri(),
        });

        let file = self.temp_dir.child("env.json");
        file.write_str(&content.to_string())
            .expect("Failed to write config");
        file.path().to_path_buf()
    }
}

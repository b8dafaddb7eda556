// # Git publication of the trip log
//
// After a poll that wrote trips, the trip files are staged and, at most once
// per day, committed and pushed:
//
// 1. `git add <paths>`
// 2. `git diff --staged --quiet` (exit 0: nothing staged, stop)
// 3. `git log --since="<date> 00:00:00 +0000" --pretty=oneline` (non-empty:
//    already committed that UTC day, leave the changes staged)
// 4. `git commit -m "Update trip data - <date> UTC"`
//
// `<date>` is the UTC calendar day of the scan.
// 5. `git push` (unless disabled)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use velo_core::traits::Publisher;
use velo_core::{Error, PollReport};

/// Commits the trip log to a git repository
#[derive(Debug, Clone)]
pub struct GitPublisher {
    git: String,
    repo: PathBuf,
    paths: Vec<String>,
    push: bool,
}

impl GitPublisher {
    /// Publish `paths` (relative to `repo`) with the `git` found in PATH
    pub fn new(repo: impl Into<PathBuf>, paths: Vec<String>) -> Self {
        Self {
            git: "git".to_string(),
            repo: repo.into(),
            paths,
            push: true,
        }
    }

    /// Use a specific git executable
    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    /// Enable or disable the final `git push`
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<Output, Error> {
        debug!("git {}", args.join(" "));

        Command::new(&self.git)
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::publisher(format!("Failed to run {}: {}", self.git, e)))
    }

    /// Run a git step that must succeed
    async fn step(&self, args: &[&str]) -> Result<Output, Error> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::publisher(format!(
                "git {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

/// `git log --since` argument and commit message for the UTC day of `scan_time`
fn daily_commit(scan_time: DateTime<Utc>) -> (String, String) {
    let day = scan_time.date_naive().format("%Y-%m-%d");
    (
        format!("--since={} 00:00:00 +0000", day),
        format!("Update trip data - {} UTC", day),
    )
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, report: &PollReport) -> Result<(), Error> {
        let mut add = vec!["add", "--"];
        add.extend(self.paths.iter().map(String::as_str));
        self.step(&add).await?;

        let staged = self.run(&["diff", "--staged", "--quiet"]).await?;
        match staged.status.code() {
            Some(0) => {
                debug!("No trip changes to commit");
                return Ok(());
            }
            Some(1) => {}
            _ => {
                return Err(Error::publisher(format!(
                    "git diff exited with {}",
                    staged.status
                )));
            }
        }

        let (since, message) = daily_commit(report.scan_time);

        // A repository without commits makes `git log` fail with empty stdout
        let log = self.run(&["log", &since, "--pretty=oneline"]).await?;
        if !String::from_utf8_lossy(&log.stdout).trim().is_empty() {
            debug!("Trip data already committed today, leaving changes staged");
            return Ok(());
        }

        self.step(&["commit", "-m", &message]).await?;
        info!("Committed trip data: {}", message);

        if self.push {
            self.step(&["push"]).await?;
            info!("Pushed trip data");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::Path;

    fn report() -> PollReport {
        PollReport {
            scan_time: Utc::now(),
            stations_total: 1,
            stations_failed: 0,
            bikes_seen: 1,
            dropped_records: 0,
            duplicate_bikes: 0,
            states_total: 1,
            rented: 0,
            trips: Vec::new(),
        }
    }

    fn git(repo: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Initialise a throwaway repository, or None when git is unavailable
    fn init_repo() -> Option<tempfile::TempDir> {
        let dir = tempfile::tempdir().unwrap();
        let ok = git(dir.path(), &["init", "-q"])
            && git(dir.path(), &["config", "user.email", "poller@example.org"])
            && git(dir.path(), &["config", "user.name", "Trip Poller"])
            && git(dir.path(), &["config", "commit.gpgsign", "false"]);
        ok.then_some(dir)
    }

    fn commit_count(repo: &Path) -> usize {
        let output = std::process::Command::new("git")
            .args(["rev-list", "--count", "HEAD"])
            .current_dir(repo)
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_commits_at_most_once_per_day() {
        let Some(repo) = init_repo() else {
            return;
        };
        let publisher =
            GitPublisher::new(repo.path(), vec!["trips.csv".to_string()]).with_push(false);

        std::fs::write(repo.path().join("trips.csv"), "bike_number\n1\n").unwrap();
        publisher.publish(&report()).await.unwrap();
        assert_eq!(commit_count(repo.path()), 1);

        std::fs::write(repo.path().join("trips.csv"), "bike_number\n1\n2\n").unwrap();
        publisher.publish(&report()).await.unwrap();
        assert_eq!(commit_count(repo.path()), 1);
    }

    #[test]
    fn test_daily_commit_uses_utc_day() {
        let late = Utc.with_ymd_and_hms(2025, 5, 1, 23, 59, 0).unwrap();
        assert_eq!(
            daily_commit(late),
            (
                "--since=2025-05-01 00:00:00 +0000".to_string(),
                "Update trip data - 2025-05-01 UTC".to_string()
            )
        );

        let early = Utc.with_ymd_and_hms(2025, 5, 2, 0, 1, 0).unwrap();
        assert_eq!(daily_commit(early).0, "--since=2025-05-02 00:00:00 +0000");
    }

    #[tokio::test]
    async fn test_nothing_staged_is_ok() {
        let Some(repo) = init_repo() else {
            return;
        };
        std::fs::write(repo.path().join("trips.csv"), "bike_number\n").unwrap();
        let publisher =
            GitPublisher::new(repo.path(), vec!["trips.csv".to_string()]).with_push(false);

        publisher.publish(&report()).await.unwrap();
        publisher.publish(&report()).await.unwrap();
        assert_eq!(commit_count(repo.path()), 1);
    }

    #[tokio::test]
    async fn test_missing_git_is_publisher_error() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = GitPublisher::new(dir.path(), vec![".".to_string()])
            .with_git("/nonexistent/git");

        assert!(matches!(
            publisher.publish(&report()).await,
            Err(Error::Publisher(_))
        ));
    }

    #[tokio::test]
    async fn test_add_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        if !git(dir.path(), &["--version"]) {
            return;
        }
        let publisher = GitPublisher::new(dir.path(), vec!["missing.csv".to_string()]);

        assert!(matches!(
            publisher.publish(&report()).await,
            Err(Error::Publisher(_))
        ));
    }
}

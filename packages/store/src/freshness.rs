//! Freshness oracles: when was an artifact last modified?

use std::{
    path::{Path, PathBuf},
    process::Command,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::StoreError;

/// Reports the last modification time of an artifact.
pub trait LastModified: Send + Sync {
    /// Returns when `path` was last modified, or `None` if it never was.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the time cannot be determined.
    fn last_modified(&self, path: &Path) -> Result<Option<SystemTime>, StoreError>;
}

/// Uses the file system modification time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMtime;

impl LastModified for FileMtime {
    fn last_modified(&self, path: &Path) -> Result<Option<SystemTime>, StoreError> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Uses the time of the last commit touching the file in a git working
/// copy. Files that were never committed count as never modified.
#[derive(Debug, Clone)]
pub struct GitCommitTime {
    repo: PathBuf,
}

impl GitCommitTime {
    /// Creates an oracle for the working copy at `repo`.
    #[must_use]
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// `path` relative to the working copy, as git expects it after `-C`.
    fn repo_relative(&self, path: &Path) -> PathBuf {
        if let Ok(relative) = path.strip_prefix(&self.repo) {
            return relative.to_path_buf();
        }
        if let (Ok(repo), Ok(full)) = (self.repo.canonicalize(), path.canonicalize())
            && let Ok(relative) = full.strip_prefix(repo)
        {
            return relative.to_path_buf();
        }
        path.to_path_buf()
    }
}

impl LastModified for GitCommitTime {
    fn last_modified(&self, path: &Path) -> Result<Option<SystemTime>, StoreError> {
        let path = self.repo_relative(path);
        let command = format!(
            "git -C {} log -1 --format=%ct -- {}",
            self.repo.display(),
            path.display()
        );
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(["log", "-1", "--format=%ct", "--"])
            .arg(&path)
            .output()
            .map_err(|e| StoreError::Command {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(StoreError::Command {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(None);
        }
        let seconds: u64 = stdout.parse().map_err(|_| StoreError::Command {
            command,
            message: format!("unexpected output '{stdout}'"),
        })?;
        Ok(Some(UNIX_EPOCH + Duration::from_secs(seconds)))
    }
}

/// Whether `path` exists and was modified less than `max_age` before `now`.
///
/// Oracle failures are logged and count as stale.
#[must_use]
pub fn is_fresh(
    oracle: &dyn LastModified,
    path: &Path,
    max_age: Duration,
    now: SystemTime,
) -> bool {
    if !path.exists() {
        return false;
    }
    match oracle.last_modified(path) {
        Ok(Some(modified)) => now
            .duration_since(modified)
            .map_or(true, |age| age < max_age),
        Ok(None) => false,
        Err(e) => {
            log::warn!("Unable to determine age of {}: {e}", path.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Option<SystemTime>, ()>);

    impl LastModified for Fixed {
        fn last_modified(&self, _path: &Path) -> Result<Option<SystemTime>, StoreError> {
            self.0.map_err(|()| StoreError::Command {
                command: "fixed".to_string(),
                message: "boom".to_string(),
            })
        }
    }

    fn existing_file() -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("similarity-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.csv");
        std::fs::write(&file, "x").unwrap();
        (dir, file)
    }

    #[test]
    fn age_against_max_age() {
        let (dir, file) = existing_file();
        let now = UNIX_EPOCH + Duration::from_secs(100_000);
        let day = Duration::from_secs(86_400);

        let recent = Fixed(Ok(Some(now - Duration::from_secs(60))));
        assert!(is_fresh(&recent, &file, day, now));

        let old = Fixed(Ok(Some(now - Duration::from_secs(90_000))));
        assert!(!is_fresh(&old, &file, day, now));

        assert!(!is_fresh(&Fixed(Ok(None)), &file, day, now));
        assert!(!is_fresh(&Fixed(Err(())), &file, day, now));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_file_is_stale() {
        let recent = Fixed(Ok(Some(SystemTime::now())));
        assert!(!is_fresh(
            &recent,
            Path::new("/definitely/not/here.csv"),
            Duration::from_secs(60),
            SystemTime::now()
        ));
    }

    #[test]
    fn file_mtime_reads_metadata() {
        let (dir, file) = existing_file();
        assert!(FileMtime.last_modified(&file).unwrap().is_some());
        assert!(FileMtime.last_modified(&dir.join("nope")).unwrap().is_none());
        assert!(is_fresh(&FileMtime, &file, Duration::from_secs(3_600), SystemTime::now()));
        std::fs::remove_dir_all(dir).ok();
    }

    fn git(repo: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(["-c", "user.name=similarity", "-c", "user.email=similarity@localhost"])
            .args(args)
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[test]
    fn repo_relative_strips_working_copy_prefix() {
        let oracle = GitCommitTime::new("similarity-data");
        assert_eq!(
            oracle.repo_relative(Path::new("similarity-data/by_key/A.csv")),
            PathBuf::from("by_key/A.csv")
        );
        assert_eq!(
            oracle.repo_relative(Path::new("by_key/A.csv")),
            PathBuf::from("by_key/A.csv")
        );
    }

    #[test]
    fn git_commit_time_of_committed_file() {
        let (dir, _) = existing_file();
        if !git(&dir, &["init", "-q"]) {
            // git not installed
            std::fs::remove_dir_all(dir).ok();
            return;
        }
        let by_key = dir.join("by_key");
        std::fs::create_dir_all(&by_key).unwrap();
        let committed = by_key.join("A.csv");
        std::fs::write(&committed, "x").unwrap();
        let pending = by_key.join("B.csv");
        std::fs::write(&pending, "y").unwrap();
        assert!(git(&dir, &["add", "by_key/A.csv"]));
        assert!(git(&dir, &["commit", "-q", "-m", "A"]));

        let oracle = GitCommitTime::new(&dir);
        let before = SystemTime::now() - Duration::from_secs(3_600);
        let modified = oracle.last_modified(&committed).unwrap().unwrap();
        assert!(modified > before);
        assert!(is_fresh(&oracle, &committed, Duration::from_secs(3_600), SystemTime::now()));

        assert_eq!(oracle.last_modified(&pending).unwrap(), None);
        assert!(!is_fresh(&oracle, &pending, Duration::from_secs(3_600), SystemTime::now()));
        std::fs::remove_dir_all(dir).ok();
    }
}

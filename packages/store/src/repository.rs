//! Publishing results and syncing the upstream data repository.
//!
//! Both directions shell out: publishing runs a configured command inside
//! the output directory (typically a commit-and-push script), syncing pulls
//! the upstream data working copy. Callers treat failures as non-fatal.

use std::{path::PathBuf, process::Command};

use crate::StoreError;

/// Makes freshly written artifacts available downstream.
pub trait Publisher: Send + Sync {
    /// Publishes the current contents of the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Command`] if publishing fails.
    fn publish(&self) -> Result<(), StoreError>;
}

/// Brings the upstream data repository up to date.
pub trait DataSync: Send + Sync {
    /// Fetches the latest upstream data.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Command`] if the sync fails.
    fn sync(&self) -> Result<(), StoreError>;
}

fn run(cmd: &mut Command, display: &str) -> Result<(), StoreError> {
    log::debug!("Running '{display}'");
    let output = cmd.output().map_err(|e| StoreError::Command {
        command: display.to_string(),
        message: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(StoreError::Command {
            command: display.to_string(),
            message: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

/// Runs a shell command inside the output directory.
#[derive(Debug, Clone)]
pub struct CommandPublisher {
    dir: PathBuf,
    command: String,
}

impl CommandPublisher {
    /// Creates a publisher running `command` with `sh -c` in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            command: command.into(),
        }
    }
}

impl Publisher for CommandPublisher {
    fn publish(&self) -> Result<(), StoreError> {
        run(
            Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .current_dir(&self.dir),
            &self.command,
        )?;
        log::info!("Published {}", self.dir.display());
        Ok(())
    }
}

/// Publishes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Fast-forwards a git working copy from its upstream.
#[derive(Debug, Clone)]
pub struct GitSync {
    repo: PathBuf,
}

impl GitSync {
    /// Creates a sync for the working copy at `repo`.
    #[must_use]
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }
}

impl DataSync for GitSync {
    fn sync(&self) -> Result<(), StoreError> {
        let display = format!("git -C {} pull --ff-only", self.repo.display());
        run(
            Command::new("git")
                .arg("-C")
                .arg(&self.repo)
                .args(["pull", "--ff-only"]),
            &display,
        )
    }
}

/// Leaves the data repository untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSync;

impl DataSync for NoopSync {
    fn sync(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("similarity-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn publisher_runs_in_output_dir() {
        let dir = scratch_dir();
        CommandPublisher::new(&dir, "touch published")
            .publish()
            .unwrap();
        assert!(dir.join("published").exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn failing_publish_is_a_command_error() {
        let dir = scratch_dir();
        let err = CommandPublisher::new(&dir, "echo nope >&2; exit 3")
            .publish()
            .unwrap_err();
        match err {
            StoreError::Command { command, message } => {
                assert_eq!(command, "echo nope >&2; exit 3");
                assert!(message.contains("nope"));
            }
            other => panic!("unexpected error: {other}"),
        }
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn sync_outside_a_repository_fails() {
        let dir = scratch_dir();
        assert!(matches!(
            GitSync::new(&dir).sync(),
            Err(StoreError::Command { .. })
        ));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn noops_succeed() {
        assert!(NoopPublisher.publish().is_ok());
        assert!(NoopSync.sync().is_ok());
    }
}

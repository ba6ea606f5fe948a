//! Diagnostic dump script
//!
//! The script runs once per high-load alert. The caller waits a short time
//! for it; if it is still running after that, it keeps running in the
//! background under a hard kill timeout and the caller moves on.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// How long the caller waits for the script
pub const DEFAULT_WAIT: Duration = Duration::from_secs(3);

/// Hard limit for a detached run
pub const DEFAULT_DETACH_TIMEOUT: Duration = Duration::from_secs(300);

/// Classified result of a dump script run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Output contained `file_exist`
    AlreadyExists,
    /// Output contained `failed`
    Failed,
    /// Output contained `success`
    Succeeded,
    /// Any other non-empty output
    Other(String),
    /// Completed without output
    Empty,
    /// Could not start, exited non-zero, or was killed at the timeout
    Errored,
    /// Still running after the wait; continues in the background
    Detached,
}

impl ScriptOutcome {
    /// Classify trimmed script output
    pub fn classify(output: &str) -> Self {
        let output = output.trim();
        if output.contains("file_exist") {
            Self::AlreadyExists
        } else if output.contains("failed") {
            Self::Failed
        } else if output.contains("success") {
            Self::Succeeded
        } else if output.is_empty() {
            Self::Empty
        } else {
            Self::Other(output.to_string())
        }
    }

    /// One-line hint appended to the alert message
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::AlreadyExists => Some("Heap dump file already exists, skipped".to_string()),
            Self::Failed => Some("Heap dump generation failed".to_string()),
            Self::Succeeded => Some("Heap dump generated".to_string()),
            Self::Other(text) => Some(text.clone()),
            Self::Empty | Self::Errored | Self::Detached => None,
        }
    }
}

/// A bash script run with wait-then-detach semantics
#[derive(Debug, Clone)]
pub struct DumpScript {
    path: PathBuf,
    wait: Duration,
    detach_timeout: Duration,
}

impl DumpScript {
    /// Script at `path` with the default wait and detach timeout
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wait: DEFAULT_WAIT,
            detach_timeout: DEFAULT_DETACH_TIMEOUT,
        }
    }

    /// Override how long [`run`](Self::run) waits before detaching
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Override the hard kill timeout
    #[must_use]
    pub fn with_detach_timeout(mut self, timeout: Duration) -> Self {
        self.detach_timeout = timeout;
        self
    }

    /// Script path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the script, waiting at most the configured wait
    ///
    /// Never fails: problems are folded into [`ScriptOutcome::Errored`].
    pub async fn run(&self) -> ScriptOutcome {
        let (tx, rx) = oneshot::channel();
        let path = self.path.clone();
        let limit = self.detach_timeout;

        tokio::spawn(async move {
            let outcome = execute(&path, limit).await;
            // A closed receiver means the caller stopped waiting.
            if let Err(outcome) = tx.send(outcome) {
                info!(script = %path.display(), ?outcome, "Detached dump script finished");
            }
        });

        match tokio::time::timeout(self.wait, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => ScriptOutcome::Errored,
            Err(_) => {
                info!(
                    script = %self.path.display(),
                    wait = ?self.wait,
                    limit = ?self.detach_timeout,
                    "Dump script still running, continuing in background"
                );
                ScriptOutcome::Detached
            }
        }
    }
}

async fn execute(path: &Path, limit: Duration) -> ScriptOutcome {
    match capture(path, limit).await {
        Ok(text) => ScriptOutcome::classify(&text),
        Err(e) => {
            warn!(script = %path.display(), error = %e, "Dump script failed");
            ScriptOutcome::Errored
        }
    }
}

/// Run the script and return stdout followed by stderr
async fn capture(path: &Path, limit: Duration) -> Result<String> {
    let mut cmd = Command::new("/bin/bash");
    cmd.arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(limit, cmd.output()).await {
        Ok(output) => output?,
        Err(_) => {
            error!(script = %path.display(), ?limit, "Dump script timed out and was killed");
            return Err(Error::script(format!("timed out after {limit:?}")));
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(Error::script(format!("{}: {}", output.status, text.trim())));
    }
    Ok(text)
}

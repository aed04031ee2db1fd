// src/arbiter/local.rs — Subprocess executor with a per-run scratch directory

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{verdict_from_exit, ExecutionRequest, Executor};
use crate::core::types::Verdict;
use crate::infra::errors::ExecutionInfraError;

const EXECUTOR_ID: &str = "local";

/// Runs the configured command in a fresh directory holding the solution and
/// test files. The directory is removed after every run.
///
/// `{solution}` and `{tests}` in the argument list are replaced by the file
/// names. The child is killed if the timeout elapses.
pub struct LocalProcessExecutor {
    command: String,
    args: Vec<String>,
    solution_file: String,
    tests_file: String,
    scratch_root: PathBuf,
}

impl LocalProcessExecutor {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            solution_file: "solution.py".into(),
            tests_file: "test_solution.py".into(),
            scratch_root: std::env::temp_dir(),
        }
    }

    pub fn from_config(cfg: &crate::infra::config::ExecutorConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            solution_file: cfg.solution_file.clone(),
            tests_file: cfg.tests_file.clone(),
            scratch_root: std::env::temp_dir(),
        }
    }

    pub fn with_files(mut self, solution_file: &str, tests_file: &str) -> Self {
        self.solution_file = solution_file.into();
        self.tests_file = tests_file.into();
        self
    }

    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = root;
        self
    }

    fn expanded_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| {
                a.replace("{solution}", &self.solution_file)
                    .replace("{tests}", &self.tests_file)
            })
            .collect()
    }

    async fn prepare(&self, dir: &Path, request: &ExecutionRequest) -> Result<(), ExecutionInfraError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| infra(format!("cannot create {}: {}", dir.display(), e)))?;
        tokio::fs::write(dir.join(&self.solution_file), &request.solution.code)
            .await
            .map_err(|e| infra(format!("cannot write solution: {}", e)))?;
        tokio::fs::write(dir.join(&self.tests_file), &request.tests.code)
            .await
            .map_err(|e| infra(format!("cannot write tests: {}", e)))?;
        Ok(())
    }

    async fn run_in(&self, dir: &Path, request: &ExecutionRequest) -> Result<Verdict, ExecutionInfraError> {
        self.prepare(dir, request).await?;

        let child = Command::new(&self.command)
            .args(self.expanded_args())
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| infra(format!("cannot spawn '{}': {}", self.command, e)))?;

        match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Err(_) => {
                tracing::debug!(timeout_ms = request.timeout.as_millis() as u64, "Execution timed out");
                Ok(Verdict::Timeout)
            }
            Ok(Err(e)) => Err(infra(format!("waiting on child failed: {}", e))),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                Ok(verdict_from_exit(output.status.code(), &stdout, &stderr))
            }
        }
    }
}

#[async_trait]
impl Executor for LocalProcessExecutor {
    fn id(&self) -> &str {
        EXECUTOR_ID
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<Verdict, ExecutionInfraError> {
        let dir = self
            .scratch_root
            .join(format!("ouroboros-{}", uuid::Uuid::new_v4()));
        tracing::debug!(
            dir = %dir.display(),
            solution = %request.solution.id,
            tests = %request.tests.id,
            "Executing"
        );

        let result = self.run_in(&dir, request).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::debug!(dir = %dir.display(), "Scratch cleanup failed: {}", e);
        }
        result
    }
}

fn infra(message: String) -> ExecutionInfraError {
    ExecutionInfraError::new(EXECUTOR_ID, message)
}

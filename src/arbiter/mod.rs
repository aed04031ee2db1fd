// src/arbiter/mod.rs — Execution capability: run a solution against its tests

pub mod local;

use async_trait::async_trait;
use std::time::Duration;

use crate::core::types::{Artifact, Verdict};
use crate::infra::errors::ExecutionInfraError;

/// Longest stderr/stdout tail carried inside a verdict.
pub const OUTPUT_EXCERPT_CHARS: usize = 4_000;

/// Everything an executor needs for one run.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub solution: Artifact,
    pub tests: Artifact,
    pub timeout: Duration,
}

/// Runs code against tests in isolation and reports a verdict.
///
/// `Err` means the environment itself failed; a failing test run is
/// `Ok(Verdict::Fail { .. })`.
#[async_trait]
pub trait Executor: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, request: &ExecutionRequest) -> Result<Verdict, ExecutionInfraError>;
}

/// Map a finished process to a verdict.
///
/// Exit 0 passes, exit 1 is a test failure, anything else (including death by
/// signal, reported as `None`) is a crash.
pub fn verdict_from_exit(code: Option<i32>, stdout: &str, stderr: &str) -> Verdict {
    match code {
        Some(0) => Verdict::Pass,
        Some(1) => Verdict::Fail {
            exit_code: 1,
            stderr_excerpt: output_excerpt(stdout, stderr),
        },
        Some(other) => Verdict::Crash {
            reason: format!("exit code {}: {}", other, output_excerpt(stdout, stderr)),
        },
        None => Verdict::Crash {
            reason: format!("terminated by signal: {}", output_excerpt(stdout, stderr)),
        },
    }
}

/// Tail of the combined output. Test runners often report on stdout, so both
/// streams are kept, stderr last.
pub fn output_excerpt(stdout: &str, stderr: &str) -> String {
    let combined = match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => stderr.trim_end().to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
    };
    let len = combined.chars().count();
    if len <= OUTPUT_EXCERPT_CHARS {
        return combined;
    }
    combined.chars().skip(len - OUTPUT_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_zero_passes() {
        assert_eq!(verdict_from_exit(Some(0), "ok", ""), Verdict::Pass);
    }

    #[test]
    fn test_exit_one_fails_with_output() {
        let v = verdict_from_exit(Some(1), "", "AssertionError");
        assert_eq!(
            v,
            Verdict::Fail {
                exit_code: 1,
                stderr_excerpt: "AssertionError".into()
            }
        );
    }

    #[test]
    fn test_other_exit_crashes() {
        match verdict_from_exit(Some(139), "", "segfault") {
            Verdict::Crash { reason } => {
                assert!(reason.starts_with("exit code 139"));
                assert!(reason.contains("segfault"));
            }
            other => panic!("expected crash, got {:?}", other),
        }
    }

    #[test]
    fn test_signal_crashes() {
        assert!(matches!(
            verdict_from_exit(None, "", ""),
            Verdict::Crash { .. }
        ));
    }

    #[test]
    fn test_excerpt_combines_streams() {
        assert_eq!(output_excerpt("out\n", "err\n"), "out\nerr");
        assert_eq!(output_excerpt("", "err"), "err");
        assert_eq!(output_excerpt("  ", "\n"), "");
    }

    #[test]
    fn test_excerpt_keeps_tail() {
        let stderr = format!("{}END", "x".repeat(10_000));
        let excerpt = output_excerpt("", &stderr);
        assert_eq!(excerpt.chars().count(), OUTPUT_EXCERPT_CHARS);
        assert!(excerpt.ends_with("END"));
    }
}

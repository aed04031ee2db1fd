// src/core/reflexion.rs — Turn a failed attempt into guidance for the next one

use super::types::{AttemptResult, ReflexionNote, Verdict};

const TRUNCATION_MARKER: &str = "\n…[truncated]…\n";

/// Composes bounded-length critique notes from failing attempts.
#[derive(Debug, Clone)]
pub struct ReflexionComposer {
    cap_chars: usize,
}

impl ReflexionComposer {
    pub fn new(cap_chars: usize) -> Self {
        Self { cap_chars }
    }

    pub fn cap(&self) -> usize {
        self.cap_chars
    }

    /// Returns `None` for passing attempts.
    pub fn compose(&self, result: &AttemptResult) -> Option<ReflexionNote> {
        let detail = match (&result.verdict, &result.synthetic_note) {
            (Verdict::Pass, _) => return None,
            (_, Some(note)) => note.clone(),
            (Verdict::Fail { exit_code, stderr_excerpt }, None) => {
                format!("Tests failed with exit code {}. Output:\n{}", exit_code, stderr_excerpt)
            }
            (Verdict::Crash { reason }, None) => format!("Execution crashed: {}", reason),
            (Verdict::Timeout, None) => {
                "Execution timed out. The solution may loop forever or be too slow.".to_string()
            }
        };

        let solution = result
            .solution_id()
            .map(|id| id.short().to_string())
            .unwrap_or_else(|| "none".into());
        let header = format!(
            "Attempt {} failed ({}) for solution {}.\n",
            result.attempt,
            result.verdict.kind(),
            solution
        );
        let footer = "\nDo not repeat this approach.";

        let overhead = header.chars().count() + footer.chars().count();
        let detail_budget = self.cap_chars.saturating_sub(overhead);
        let text = format!("{}{}{}", header, elide_middle(&detail, detail_budget), footer);

        Some(ReflexionNote {
            attempt: result.attempt,
            solution_id: result.solution_id().cloned(),
            text: truncate_chars(&text, self.cap_chars),
        })
    }
}

/// Keep the head and tail of `text` within `budget` characters.
///
/// Assertion messages usually sit at the end of test output and the failing
/// test name near the start, so both ends are kept.
fn elide_middle(text: &str, budget: usize) -> String {
    let len = text.chars().count();
    if len <= budget {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if budget <= marker_len {
        return truncate_chars(text, budget);
    }
    let keep = budget - marker_len;
    let head = keep / 2;
    let tail = keep - head;
    let head_str: String = text.chars().take(head).collect();
    let tail_str: String = text.chars().skip(len - tail).collect();
    format!("{}{}{}", head_str, TRUNCATION_MARKER, tail_str)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// src/cli/progress.rs — Terminal progress renderer for real-time cycle feedback

use crate::core::types::{Consolidation, CycleOutcome, CycleState, ProgressEvent};

/// Build a progress callback that writes formatted output to stderr.
///
/// Returns a closure suitable for `Orchestrator::with_progress()`.
pub fn terminal_progress() -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event| {
        if let Some(line) = format_event(&event) {
            eprintln!("{}", line);
        }
    }
}

/// One display line per event. State changes other than budget exhaustion
/// are left to the debug log.
pub fn format_event(event: &ProgressEvent) -> Option<String> {
    let line = match event {
        ProgressEvent::StateChanged { state } => match state {
            CycleState::BudgetExceeded => "[budget] exhausted".to_string(),
            _ => return None,
        },
        ProgressEvent::SkillsRetrieved { count } => format!("[recall] {} skill(s)", count),
        ProgressEvent::AttemptStart {
            attempt,
            max_attempts,
        } => format!("[attempt {}/{}] build + attack...", attempt, max_attempts),
        ProgressEvent::AttemptEnd {
            attempt,
            verdict,
            cost,
            spent_so_far,
        } => format!(
            "[attempt {}] {:<14} ${:.4} (total ${:.4})",
            attempt,
            verdict.to_string(),
            cost,
            spent_so_far
        ),
        ProgressEvent::Reflexion {
            attempt,
            note_chars,
        } => format!("[reflect] note from attempt {} ({} chars)", attempt, note_chars),
        ProgressEvent::Consolidated { consolidation } => match consolidation {
            Consolidation::Inserted { skill_id } => format!("[learn] new skill {}", skill_id),
            Consolidation::Reinforced {
                skill_id,
                similarity,
            } => format!("[learn] reinforced {} (similarity {:.2})", skill_id, similarity),
            Consolidation::Skipped { reason } => format!("[learn] skipped: {}", reason),
        },
        ProgressEvent::Complete { outcome } => match outcome {
            CycleOutcome::Solved {
                attempts_used,
                total_cost,
                ..
            } => format!(
                "[done] solved attempts={} cost=${:.4}",
                attempts_used, total_cost
            ),
            CycleOutcome::Exhausted {
                reason,
                attempts_used,
                total_cost,
                ..
            } => format!(
                "[done] exhausted ({}) attempts={} cost=${:.4}",
                reason, attempts_used, total_cost
            ),
        },
    };
    Some(line)
}

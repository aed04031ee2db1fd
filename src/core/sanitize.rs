// src/core/sanitize.rs — Strip non-code wrapping from generated artifacts

use crate::infra::errors::MalformedArtifact;
use crate::provider::ResponseHint;

const FENCE: &str = "```";

/// Turn raw generator output into bare code.
///
/// Fenced blocks win: when the text contains fences, only the fenced content is
/// kept (multiple blocks are joined) and any surrounding prose is dropped.
/// Unfenced text is taken as code as-is.
pub fn sanitize_code(raw: &str, hint: ResponseHint) -> Result<String, MalformedArtifact> {
    let text = raw.trim();
    let code = if text.lines().any(is_fence_line) {
        extract_fenced(text, hint)?
    } else {
        text.to_string()
    };

    let code = strip_blank_edges(&code);
    if code.trim().is_empty() {
        return Err(MalformedArtifact::Empty {
            hint: hint.to_string(),
        });
    }
    if code.contains(FENCE) {
        return Err(MalformedArtifact::ResidualFence {
            hint: hint.to_string(),
        });
    }
    Ok(code)
}

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn extract_fenced(text: &str, hint: ResponseHint) -> Result<String, MalformedArtifact> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        if is_fence_line(line) {
            match current.take() {
                Some(lines) => blocks.push(lines.join("\n")),
                None => current = Some(Vec::new()),
            }
            continue;
        }
        if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }

    if current.is_some() {
        return Err(MalformedArtifact::UnterminatedFence {
            hint: hint.to_string(),
        });
    }
    Ok(blocks.join("\n\n"))
}

/// Drop leading and trailing blank lines, keeping indentation of the first
/// code line intact.
fn strip_blank_edges(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map(|i| i + 1)
        .unwrap_or(start);
    lines[start..end.max(start)]
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse a generated description to a single line of bounded length.
pub fn sanitize_description(raw: &str, max_chars: usize) -> Option<String> {
    let first_paragraph = raw
        .trim()
        .split("\n\n")
        .next()
        .unwrap_or("")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned = first_paragraph.trim_matches(|c| c == '"' || c == '`').trim();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.chars().take(max_chars).collect())
}

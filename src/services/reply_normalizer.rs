//! Turns a raw model reply into a JSON object string.
//!
//! Models wrap their JSON in prose or markdown fences and sometimes stop
//! mid-object when they run out of tokens. Extraction finds the outermost
//! object, and a best-effort balance repair closes whatever the reply left
//! open. Nothing here parses JSON: anything the repair cannot fix fails
//! validation and the batch is reported as malformed.

use crate::error::AppError;

const PREVIEW_CHARS: usize = 200;

/// Shortens `text` for log lines and error messages.
pub(crate) fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

fn strip_fence_opening(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Optional language tag on the fence line, e.g. ```json or ```JSON.
    let tag_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let after_tag = &rest[tag_len..];
    if tag_len > 0 && (after_tag.is_empty() || after_tag.starts_with(char::is_whitespace)) {
        after_tag
    } else {
        rest
    }
}

pub fn strip_code_fence(text: &str) -> &str {
    let mut content = text.trim();
    content = strip_fence_opening(content).trim();
    if let Some(rest) = content.strip_suffix("```") {
        content = rest.trim();
    }
    content
}

/// Slices from the first `{` to the last `}`. Falls back to the trimmed,
/// unfenced text when no such pair exists.
pub fn extract_json_object(raw: &str) -> String {
    let content = strip_code_fence(raw);
    let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) else {
        return content.to_string();
    };
    if end <= start {
        return content.to_string();
    }
    content[start..=end].to_string()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StructureCounts {
    open_braces: usize,
    close_braces: usize,
    open_brackets: usize,
    close_brackets: usize,
    quotes: usize,
}

fn count_structure(text: &str) -> StructureCounts {
    let mut counts = StructureCounts::default();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    counts.quotes += 1;
                }
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                counts.quotes += 1;
            }
            '{' => counts.open_braces += 1,
            '}' => counts.close_braces += 1,
            '[' => counts.open_brackets += 1,
            ']' => counts.close_brackets += 1,
            _ => {}
        }
    }

    counts
}

/// Appends the closers a truncated object is missing: one `"` if a string
/// was left open, then `]`s, then `}`s. Counts come from a single pass over
/// the input and are not recomputed between fixes.
pub fn repair_json_balance(text: &str) -> String {
    let counts = count_structure(text);
    let mut repaired = text.to_string();

    if counts.quotes % 2 == 1 {
        repaired.push('"');
    }
    for _ in 0..counts.open_brackets.saturating_sub(counts.close_brackets) {
        repaired.push(']');
    }
    for _ in 0..counts.open_braces.saturating_sub(counts.close_braces) {
        repaired.push('}');
    }

    repaired
}

/// True when `text` is a single `{ … }` whose brackets and braces nest
/// correctly and which does not end inside a string.
pub fn is_balanced_json_object(text: &str) -> bool {
    let text = text.trim();
    if !text.starts_with('{') || !text.ends_with('}') {
        return false;
    }

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => stack.push(c),
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty() && !in_string
}

pub fn normalize_reply(raw: &str) -> Result<String, AppError> {
    let extracted = extract_json_object(raw);
    if is_balanced_json_object(&extracted) {
        return Ok(extracted);
    }

    let repaired = repair_json_balance(&extracted);
    if is_balanced_json_object(&repaired) {
        tracing::debug!(
            "Repaired truncated JSON reply ({} -> {} chars)",
            extracted.len(),
            repaired.len()
        );
        return Ok(repaired);
    }

    Err(AppError::MalformedResponse(format!(
        "reply does not contain a complete JSON object: {}",
        preview(raw.trim())
    )))
}

//! Task list extraction from free-form model text

use once_cell::sync::Lazy;
use regex::Regex;

const PLAN_HEADINGS: &[&str] = &["step-by-step", "step by step", "steps", "to-do", "todo"];

static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s*(.*)$").unwrap());

/// Pull a task list out of an AI message.
///
/// A list starts at a planning heading or at the first numbered line.
/// Bullets count once a list has started. The list ends at the first blank
/// line after an item or the first line that is not an item.
pub fn extract_tasks(text: &str) -> Vec<String> {
    let mut tasks = Vec::new();
    let mut in_list = false;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !tasks.is_empty() {
                break;
            }
            continue;
        }

        if let Some(caps) = NUMBERED.captures(line) {
            in_list = true;
            tasks.push(caps[1].trim().to_string());
            continue;
        }

        if in_list {
            if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
                tasks.push(item.trim().to_string());
                continue;
            }
        }

        if tasks.is_empty() && is_plan_heading(line) {
            in_list = true;
            continue;
        }

        if in_list {
            break;
        }
    }

    tasks.retain(|t| !t.is_empty());
    tasks
}

fn is_plan_heading(line: &str) -> bool {
    let heading = line
        .trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace())
        .to_lowercase();
    PLAN_HEADINGS.iter().any(|h| heading.starts_with(h))
}

//! `[[wiki link]]` references to canonical task files.
//!
//! A task file is named `<name> (<id>).md`, so a line consisting only of
//! `[[tasks/Buy milk (42)]]` or `[[Buy milk (42)|milk]]` refers to task 42.

use crate::types::{Task, TaskId};

/// Characters that cannot appear in a task file name.
const FILE_NAME_FORBIDDEN: &[char] = &['/', '\\', ':', '|', '#', '^', '[', ']', '*', '"', '<', '>', '?'];

/// A decoded reference to a task file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskLink {
    pub id: TaskId,
    /// Display name: the alias when present, otherwise the file stem without the id.
    pub name: String,
    /// Link target as written.
    pub target: String,
}

/// Decode the inside of a `[[...]]` link. Returns `None` unless the target ends
/// with a parenthesized decimal id.
pub fn decode_task_link(inner: &str) -> Option<TaskLink> {
    let (target, alias) = match inner.split_once('|') {
        Some((target, alias)) => (target.trim(), Some(alias.trim())),
        None => (inner.trim(), None),
    };

    let stem = target.rsplit('/').next().unwrap_or(target);
    let stem = stem.strip_suffix(".md").unwrap_or(stem).trim_end();

    let open = stem.strip_suffix(')')?;
    let (before, digits) = open.rsplit_once('(')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let id: TaskId = digits.parse().ok()?;
    let file_name = before.trim();

    let name = match alias {
        Some(alias) if !alias.is_empty() => alias,
        _ => file_name,
    };
    if name.is_empty() {
        return None;
    }

    Some(TaskLink {
        id,
        name: name.to_string(),
        target: target.to_string(),
    })
}

/// File name (without extension) of a task's canonical file.
pub fn task_file_stem(task: &Task) -> String {
    let cleaned: String = task
        .name
        .chars()
        .map(|c| if FILE_NAME_FORBIDDEN.contains(&c) { '-' } else { c })
        .collect();
    format!("{} ({})", cleaned.trim(), task.id)
}

/// Render the canonical link to a task file, aliased when the file name had to be cleaned.
pub fn render_task_link(task: &Task, tasks_dir: Option<&str>) -> String {
    let stem = task_file_stem(task);
    let target = match tasks_dir {
        Some(dir) if !dir.is_empty() => format!("{}/{}", dir.trim_end_matches('/'), stem),
        _ => stem.clone(),
    };
    if !task.name.contains(FILE_NAME_FORBIDDEN) {
        format!("[[{}]]", target)
    } else {
        format!("[[{}|{}]]", target, task.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_ms;

    #[test]
    fn test_decode_plain_target() {
        let link = decode_task_link("tasks/Buy milk (42)").unwrap();
        assert_eq!(link.id, 42);
        assert_eq!(link.name, "Buy milk");
        assert_eq!(link.target, "tasks/Buy milk (42)");
    }

    #[test]
    fn test_decode_with_alias_and_extension() {
        let link = decode_task_link("Buy milk (42).md|milk").unwrap();
        assert_eq!(link.id, 42);
        assert_eq!(link.name, "milk");
    }

    #[test]
    fn test_decode_rejects_non_task_links() {
        assert_eq!(decode_task_link("Some note"), None);
        assert_eq!(decode_task_link("Meeting (draft)"), None);
        assert_eq!(decode_task_link("(12)"), None);
        assert_eq!(decode_task_link("Name ()"), None);
    }

    #[test]
    fn test_render_then_decode() {
        let task = Task::new(7, "Call mum", now_ms());
        let link = render_task_link(&task, Some("tasks"));
        assert_eq!(link, "[[tasks/Call mum (7)]]");
        let inner = link.trim_start_matches("[[").trim_end_matches("]]");
        assert_eq!(decode_task_link(inner).unwrap().name, "Call mum");
    }

    #[test]
    fn test_render_aliases_cleaned_names() {
        let task = Task::new(3, "Fix a/b", now_ms());
        assert_eq!(render_task_link(&task, None), "[[Fix a-b (3)|Fix a/b]]");
    }
}

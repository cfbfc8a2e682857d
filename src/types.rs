//! Core types for the task database.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Task identifier. `0` means "not yet assigned".
pub type TaskId = u64;

/// The unassigned task id.
pub const NO_ID: TaskId = 0;

/// Delimiter between file path and line number in an instance key.
pub const INSTANCE_KEY_DELIMITER: &str = "::";

/// Encode a task id as the text of a `^token` (lowercase base 36).
pub fn encode_id(id: TaskId) -> String {
    if id == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    let mut rest = id;
    while rest > 0 {
        let digit = (rest % 36) as u32;
        // digit < 36, so from_digit always succeeds
        digits.push(char::from_digit(digit, 36).unwrap_or('0'));
        rest /= 36;
    }
    digits.iter().rev().collect()
}

/// Decode a `^token` body into a task id.
/// Returns [`NO_ID`] for empty, non-alphanumeric or overflowing tokens.
pub fn decode_id(token: &str) -> TaskId {
    let token = token.strip_prefix('^').unwrap_or(token);
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return NO_ID;
    }
    u64::from_str_radix(&token.to_ascii_lowercase(), 36).unwrap_or(NO_ID)
}

/// Current time truncated to milliseconds, so that timestamps survive
/// string serialization unchanged.
pub fn now_ms() -> DateTime<Utc> {
    let millis = Utc::now().timestamp_millis();
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}

/// Format a timestamp the way records and queries expect it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A canonical task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub complete: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Tags in first-seen order, without duplicates.
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Opaque recurrence spec, stored and rendered verbatim.
    pub recurrence: Option<String>,
    /// Derived from instance nesting.
    pub parent_ids: BTreeSet<TaskId>,
    /// Derived from instance nesting.
    pub child_ids: BTreeSet<TaskId>,
}

impl Task {
    /// Create an incomplete task with the given id and name.
    pub fn new(id: TaskId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            complete: false,
            completed_date: None,
            created: now,
            updated: now,
            tags: Vec::new(),
            due_date: None,
            recurrence: None,
            parent_ids: BTreeSet::new(),
            child_ids: BTreeSet::new(),
        }
    }

    /// Add tags that are not already present, keeping order. Returns true if any were added.
    pub fn merge_tags<'a>(&mut self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        let mut changed = false;
        for tag in tags {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
                changed = true;
            }
        }
        changed
    }

    /// Apply the completion state machine. Returns true if the state changed.
    ///
    /// INCOMPLETE -> COMPLETE sets `completed_date` only when unset;
    /// COMPLETE -> INCOMPLETE clears it.
    pub fn set_complete(&mut self, complete: bool, now: DateTime<Utc>) -> bool {
        if self.complete == complete {
            return false;
        }
        self.complete = complete;
        if complete {
            if self.completed_date.is_none() {
                self.completed_date = Some(now);
            }
        } else {
            self.completed_date = None;
        }
        true
    }
}

/// Key of an instance: one per `(file_path, line)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub file_path: String,
    pub line: usize,
}

impl InstanceKey {
    pub fn new(file_path: impl Into<String>, line: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line,
        }
    }

    /// Parse the `path::line` form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        let (path, line) = s.rsplit_once(INSTANCE_KEY_DELIMITER)?;
        Some(Self::new(path, line.parse().ok()?))
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.file_path, INSTANCE_KEY_DELIMITER, self.line)
    }
}

/// One occurrence of a task (or a placeholder slot) inside one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    /// `None` only for placeholder instances.
    pub task_id: Option<TaskId>,
    pub file_path: String,
    pub line: usize,
    /// Nearest enclosing instance line in the same file.
    pub parent_line: Option<usize>,
    /// Task of the nearest enclosing instance that has one.
    pub parent_task_id: Option<TaskId>,
    pub raw_text: String,
    pub name: String,
    /// Derived: lines whose `parent_line` is this instance's line.
    pub child_lines: Vec<usize>,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurrence: Option<String>,
    pub links: Vec<String>,
    /// Observed state, forced true when an ancestor line is complete.
    pub complete: bool,
}

impl TaskInstance {
    pub fn key(&self) -> InstanceKey {
        InstanceKey::new(self.file_path.clone(), self.line)
    }

    pub fn is_placeholder(&self) -> bool {
        self.task_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_id_base36() {
        assert_eq!(decode_id("a1"), 361);
        assert_eq!(decode_id("^a1"), 361);
        assert_eq!(decode_id("A1"), 361);
        assert_eq!(decode_id("z"), 35);
    }

    #[test]
    fn test_decode_id_failures_are_zero() {
        assert_eq!(decode_id(""), NO_ID);
        assert_eq!(decode_id("^"), NO_ID);
        assert_eq!(decode_id("a-1"), NO_ID);
        assert_eq!(decode_id("zzzzzzzzzzzzzzzzzzzzzzzzzz"), NO_ID);
    }

    #[test]
    fn test_encode_matches_decode() {
        for id in [1u64, 35, 36, 361, 46655, 1_000_000] {
            assert_eq!(decode_id(&encode_id(id)), id);
        }
        assert_eq!(encode_id(361), "a1");
    }

    #[test]
    fn test_instance_key_display_and_parse() {
        let key = InstanceKey::new("notes/todo.md", 4);
        assert_eq!(key.to_string(), "notes/todo.md::4");
        assert_eq!(InstanceKey::parse("notes/todo.md::4"), Some(key));
        assert_eq!(InstanceKey::parse("no-delimiter"), None);
    }

    #[test]
    fn test_completion_state_machine() {
        let now = now_ms();
        let mut task = Task::new(1, "a", now);
        assert!(task.set_complete(true, now));
        let first = task.completed_date;
        assert!(first.is_some());

        // no transition, no change to the date
        assert!(!task.set_complete(true, now + chrono::Duration::seconds(5)));
        assert_eq!(task.completed_date, first);

        assert!(task.set_complete(false, now));
        assert_eq!(task.completed_date, None);
    }

    #[test]
    fn test_merge_tags_dedups() {
        let mut task = Task::new(1, "a", now_ms());
        task.tags = vec!["a".to_string()];
        let incoming = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert!(task.merge_tags(&incoming));
        assert_eq!(task.tags, vec!["a", "b"]);
        assert!(!task.merge_tags(&incoming));
    }
}

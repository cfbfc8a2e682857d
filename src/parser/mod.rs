//! Line-level checklist parser.
//!
//! Turns one raw document line plus its structural hint into a [`ParsedLine`]:
//! a task, a placeholder slot, or a plain list item that only matters for
//! nesting. Lines that look like checklist items but are malformed yield `None`.

pub mod dates;
pub mod links;

use crate::config::TokensConfig;
use crate::error::Result;
use crate::outline::{LineHint, list_marker, outline};
use crate::types::{NO_ID, TaskId, decode_id};
use chrono::{DateTime, Utc};
use dates::{DueDateParser, SimpleDateParser};
use links::{TaskLink, decode_task_link};
use regex_lite::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Parsed lines of one file, keyed by line number.
pub type FileBatch = BTreeMap<usize, ParsedLine>;

/// Bracket state of a checklist line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckState {
    Open,
    InProgress,
    Done,
}

/// A checklist line carrying a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedTask {
    pub name: String,
    pub state: CheckState,
    /// Decoded `^token` at the end of the line, or [`NO_ID`].
    pub id_token: TaskId,
    /// Set when the whole content is a single link to a task file.
    pub link: Option<TaskLink>,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurrence: Option<String>,
    /// Inner text of every `[[...]]` on the line.
    pub links: Vec<String>,
}

impl ParsedTask {
    pub fn is_complete(&self) -> bool {
        self.state == CheckState::Done
    }
}

/// What a list line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LineKind {
    Task(ParsedTask),
    /// `- [ ]` with no content: a slot awaiting input.
    Placeholder,
    /// A bullet without checkbox; only used to resolve nesting.
    ListItem,
}

/// One parsed list line with its structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedLine {
    pub line: usize,
    pub parent_line: Option<usize>,
    pub raw_text: String,
    pub kind: LineKind,
}

impl ParsedLine {
    pub fn task(&self) -> Option<&ParsedTask> {
        match &self.kind {
            LineKind::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Whether this line becomes a stored instance.
    pub fn is_instance(&self) -> bool {
        !matches!(self.kind, LineKind::ListItem)
    }

    /// Completion as written on this line, before inheritance.
    pub fn is_complete(&self) -> bool {
        self.task().is_some_and(ParsedTask::is_complete)
    }
}

enum Checkbox<'a> {
    /// No checkbox: an ordinary list item.
    Absent,
    /// Looks like a checkbox but is not a valid one.
    Malformed,
    Present { inner: &'a str, content: &'a str },
}

fn checkbox(rest: &str) -> Checkbox<'_> {
    if !rest.starts_with('[') || rest.starts_with("[[") {
        return Checkbox::Absent;
    }
    let Some(close) = rest[1..].find(']') else {
        return Checkbox::Absent;
    };
    let inner = &rest[1..1 + close];
    if inner.chars().count() > 3 {
        return Checkbox::Absent;
    }
    let after = &rest[close + 2..];
    match after.chars().next() {
        None => Checkbox::Present { inner, content: "" },
        Some(c) if c.is_whitespace() => Checkbox::Present {
            inner,
            content: after,
        },
        // `[text](url)` markdown link
        Some('(') => Checkbox::Absent,
        Some(_) => Checkbox::Malformed,
    }
}

/// Checklist line parser configured with the vault's token characters.
pub struct LineParser {
    tokens: TokensConfig,
    dates: Box<dyn DueDateParser>,
    id_token: Regex,
    link: Regex,
    tag: Option<Regex>,
    due: Option<Regex>,
    recurrence: Option<Regex>,
}

impl std::fmt::Debug for LineParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineParser")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

fn prefix_regex(prefix: &str) -> Result<Option<Regex>> {
    if prefix.is_empty() {
        return Ok(None);
    }
    let pattern = format!(r"(?:^|\s)({})", regex_lite::escape(prefix));
    Ok(Some(Regex::new(&pattern)?))
}

impl LineParser {
    /// Create a parser using the built-in date parser.
    pub fn new(tokens: &TokensConfig) -> Result<Self> {
        Self::with_date_parser(tokens, Box::new(SimpleDateParser::new()))
    }

    /// Create a parser with a custom due-date parser.
    pub fn with_date_parser(tokens: &TokensConfig, dates: Box<dyn DueDateParser>) -> Result<Self> {
        let tag = if tokens.tag_prefix.is_empty() {
            None
        } else {
            let pattern = format!(
                r#"(?:^|\s)({})([^\s,;:!?()\[\]{{}}"'#]+)"#,
                regex_lite::escape(&tokens.tag_prefix)
            );
            Some(Regex::new(&pattern)?)
        };

        Ok(Self {
            tokens: tokens.clone(),
            dates,
            id_token: Regex::new(r"(?:^|\s)\^([A-Za-z0-9]+)$")?,
            link: Regex::new(r"\[\[([^\[\]]+)\]\]")?,
            tag,
            due: prefix_regex(&tokens.due_prefix)?,
            recurrence: prefix_regex(&tokens.recurrence_prefix)?,
        })
    }

    pub fn tokens(&self) -> &TokensConfig {
        &self.tokens
    }

    /// Parse a single line. Returns `None` for non-list lines and malformed checklist lines.
    pub fn parse_line(&self, raw: &str, hint: LineHint) -> Option<ParsedLine> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let marker = list_marker(raw)?;
        let rest = &raw[marker.content_start..];

        let kind = match checkbox(rest) {
            Checkbox::Absent => LineKind::ListItem,
            Checkbox::Malformed => return None,
            Checkbox::Present { inner, content } => {
                let state = self.check_state(inner)?;
                let content = content.trim();
                if content.is_empty() {
                    if state != CheckState::Open {
                        return None;
                    }
                    LineKind::Placeholder
                } else {
                    LineKind::Task(self.parse_content(content, state)?)
                }
            }
        };

        Some(ParsedLine {
            line: hint.line,
            parent_line: hint.parent_line,
            raw_text: raw.to_string(),
            kind,
        })
    }

    /// Outline and parse a whole document.
    ///
    /// Children of rejected lines are re-parented to the rejected line's own parent,
    /// so the batch never references a line it does not contain.
    pub fn parse_document(&self, text: &str) -> FileBatch {
        let lines: Vec<&str> = text.lines().collect();
        let mut batch = FileBatch::new();
        let mut rejected: HashMap<usize, Option<usize>> = HashMap::new();

        for mut hint in outline(text) {
            while let Some(parent) = hint.parent_line {
                match rejected.get(&parent) {
                    Some(grandparent) => hint.parent_line = *grandparent,
                    None => break,
                }
            }

            let Some(raw) = lines.get(hint.line) else {
                continue;
            };
            match self.parse_line(raw, hint) {
                Some(parsed) => {
                    batch.insert(hint.line, parsed);
                }
                None => {
                    rejected.insert(hint.line, hint.parent_line);
                }
            }
        }

        batch
    }

    fn check_state(&self, inner: &str) -> Option<CheckState> {
        if inner == " " {
            Some(CheckState::Open)
        } else if self.tokens.complete_markers.iter().any(|m| m == inner) {
            Some(CheckState::Done)
        } else if self.tokens.in_progress_markers.iter().any(|m| m == inner) {
            Some(CheckState::InProgress)
        } else {
            None
        }
    }

    fn parse_content(&self, content: &str, state: CheckState) -> Option<ParsedTask> {
        let (body, id_token) = match self.id_token.captures(content) {
            Some(caps) => {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(content.len());
                let token = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                (content[..start].trim_end(), decode_id(token))
            }
            None => (content, NO_ID),
        };

        let link_spans: Vec<Range<usize>> =
            self.link.find_iter(body).map(|m| m.range()).collect();
        let links: Vec<String> = self
            .link
            .captures_iter(body)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();

        let link = match link_spans.as_slice() {
            [only] if only.start == 0 && only.end == body.len() => {
                links.first().and_then(|inner| decode_task_link(inner))
            }
            _ => None,
        };

        let mut stripped: Vec<Range<usize>> = Vec::new();

        let mut tags = Vec::new();
        if let Some(tag_re) = &self.tag {
            for caps in tag_re.captures_iter(body) {
                let (Some(prefix), Some(tag)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                if link_spans.iter().any(|span| span.contains(&prefix.start())) {
                    continue;
                }
                tags.push(tag.as_str().to_string());
                stripped.push(prefix.start()..tag.end());
            }
        }

        let due_date = self.extract_due(body).map(|(date, span)| {
            stripped.push(span);
            date
        });

        let recurrence = self.extract_recurrence(body).map(|(spec, span)| {
            stripped.push(span);
            spec
        });

        let name = match &link {
            Some(link) => link.name.clone(),
            None if self.tokens.normalize_names => remove_spans(body, &mut stripped),
            None => body.trim().to_string(),
        };
        if name.is_empty() {
            return None;
        }

        Some(ParsedTask {
            name,
            state,
            id_token,
            link,
            tags,
            due_date,
            recurrence,
            links,
        })
    }

    /// Offset in `tail` where the next inline token starts.
    fn token_boundary(&self, tail: &str) -> usize {
        [
            &self.tokens.tag_prefix,
            &self.tokens.due_prefix,
            &self.tokens.recurrence_prefix,
        ]
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .filter_map(|prefix| tail.find(&format!(" {}", prefix)))
        .min()
        .unwrap_or(tail.len())
    }

    /// First due-date token whose text parses. Tries the longest run of words first.
    fn extract_due(&self, body: &str) -> Option<(DateTime<Utc>, Range<usize>)> {
        let due_re = self.due.as_ref()?;
        let prefix = due_re.captures(body)?.get(1)?;
        let tail = &body[prefix.end()..];
        let text = &tail[..self.token_boundary(tail)];

        let words = word_spans(text);
        for n in (1..=words.len()).rev() {
            let candidate = &text[words[0].start..words[n - 1].end];
            if let Some(date) = self.dates.parse_due_date(candidate) {
                return Some((date, prefix.start()..prefix.end() + words[n - 1].end));
            }
        }
        None
    }

    fn extract_recurrence(&self, body: &str) -> Option<(String, Range<usize>)> {
        let recurrence_re = self.recurrence.as_ref()?;
        let prefix = recurrence_re.captures(body)?.get(1)?;
        let tail = &body[prefix.end()..];
        let end = self.token_boundary(tail);
        let spec = tail[..end].trim();
        if spec.is_empty() {
            return None;
        }
        Some((spec.to_string(), prefix.start()..prefix.end() + end))
    }
}

/// Byte ranges of whitespace-separated words.
fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

/// Remove byte ranges from `text` and collapse the remaining whitespace.
fn remove_spans(text: &str, spans: &mut [Range<usize>]) -> String {
    spans.sort_by_key(|span| span.start);
    let mut kept = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans.iter() {
        if span.start > cursor {
            kept.push_str(&text[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    if cursor < text.len() {
        kept.push_str(&text[cursor..]);
    }
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Structural outline of a document: which lines are list items and how they nest.
//!
//! This is the document-source side of the parser contract. The host (or
//! [`crate::vault`]) computes one [`LineHint`] per list line and hands it to
//! [`crate::parser::LineParser::parse_line`].

/// Columns a tab counts for when measuring indentation.
pub const TAB_WIDTH: usize = 4;

/// Structural hint for one list line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineHint {
    /// 0-based line number.
    pub line: usize,
    /// Line of the enclosing list item, if any.
    pub parent_line: Option<usize>,
    /// Indentation in columns.
    pub indent: usize,
}

impl LineHint {
    pub fn top_level(line: usize) -> Self {
        Self {
            line,
            parent_line: None,
            indent: 0,
        }
    }

    pub fn child_of(line: usize, parent_line: usize) -> Self {
        Self {
            line,
            parent_line: Some(parent_line),
            indent: 0,
        }
    }
}

/// Position of a list bullet within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListMarker {
    /// Indentation in columns.
    pub indent: usize,
    /// Byte offset where the item content starts (after the bullet and its spacing).
    pub content_start: usize,
}

/// Recognise a list bullet (`-`, `*`, `+`, `1.` or `1)`) followed by whitespace or end of line.
pub fn list_marker(line: &str) -> Option<ListMarker> {
    let mut indent = 0;
    let mut offset = 0;
    for c in line.chars() {
        match c {
            ' ' => indent += 1,
            '\t' => indent += TAB_WIDTH,
            _ => break,
        }
        offset += c.len_utf8();
    }

    let rest = &line[offset..];
    let bullet_len = match rest.chars().next()? {
        '-' | '*' | '+' => 1,
        '0'..='9' => {
            let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            match rest[digits..].chars().next() {
                Some('.') | Some(')') => digits + 1,
                _ => return None,
            }
        }
        _ => return None,
    };

    let after = &rest[bullet_len..];
    match after.chars().next() {
        None => Some(ListMarker {
            indent,
            content_start: line.len(),
        }),
        Some(c) if c.is_whitespace() => {
            let spacing = after.len() - after.trim_start().len();
            Some(ListMarker {
                indent,
                content_start: offset + bullet_len + spacing,
            })
        }
        Some(_) => None,
    }
}

/// Compute hints for every list line of a document.
///
/// A list line's parent is the nearest preceding list line with smaller
/// indentation. Blank lines keep the current nesting; any other unindented
/// line ends it.
pub fn outline(text: &str) -> Vec<LineHint> {
    let mut hints = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new(); // (indent, line)

    for (line, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }

        let Some(marker) = list_marker(raw) else {
            let indented = raw.starts_with(' ') || raw.starts_with('\t');
            if !indented {
                stack.clear();
            }
            continue;
        };

        while stack
            .last()
            .is_some_and(|&(indent, _)| indent >= marker.indent)
        {
            stack.pop();
        }

        hints.push(LineHint {
            line,
            parent_line: stack.last().map(|&(_, parent)| parent),
            indent: marker.indent,
        });
        stack.push((marker.indent, line));
    }

    hints
}

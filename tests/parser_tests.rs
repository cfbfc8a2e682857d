//! Integration tests for document-level parsing.

use chrono::{DateTime, TimeZone, Utc};
use taskmark::config::TokensConfig;
use taskmark::outline::LineHint;
use taskmark::parser::dates::DueDateParser;
use taskmark::parser::{LineKind, LineParser};

fn parser() -> LineParser {
    LineParser::new(&TokensConfig::default()).unwrap()
}

#[test]
fn malformed_lines_parse_to_none() {
    let p = parser();
    for raw in ["-[ ]x", "- [  ] x", "- [x] "] {
        assert_eq!(p.parse_line(raw, LineHint::top_level(0)), None, "{:?}", raw);
    }
}

#[test]
fn document_nesting_follows_indentation() {
    let text = "# Trip\n- [ ] plan\n    - [ ] flights\n    - notes\n        - [x] hotel\n- [ ] pack\n";
    let batch = parser().parse_document(text);

    let lines: Vec<usize> = batch.keys().copied().collect();
    assert_eq!(lines, vec![1, 2, 3, 4, 5]);
    assert_eq!(batch[&2].parent_line, Some(1));
    assert_eq!(batch[&3].kind, LineKind::ListItem);
    assert_eq!(batch[&4].parent_line, Some(3));
    assert_eq!(batch[&5].parent_line, None);
    assert!(batch[&4].is_complete());
}

#[test]
fn children_of_rejected_lines_are_reparented() {
    // Line 1 is a malformed checkbox
    let text = "- [ ] root\n    - [  ] broken\n        - [ ] leaf\n";
    let batch = parser().parse_document(text);

    assert!(!batch.contains_key(&1));
    assert_eq!(batch[&2].parent_line, Some(0));
}

#[test]
fn crlf_documents_parse_like_lf() {
    let lf = parser().parse_document("- [ ] a ^1\n    - [x] b ^2\n");
    let crlf = parser().parse_document("- [ ] a ^1\r\n    - [x] b ^2\r\n");
    assert_eq!(lf, crlf);
}

#[test]
fn raw_text_is_kept() {
    let batch = parser().parse_document("  - [ ] indented #tag ^z\n");
    assert_eq!(batch[&0].raw_text, "  - [ ] indented #tag ^z");
    assert_eq!(batch[&0].task().unwrap().id_token, 35);
}

#[test]
fn out_of_range_relative_date_is_no_date() {
    let parsed = parser()
        .parse_line("- [ ] x @in 999999999999 days", LineHint::top_level(0))
        .unwrap();
    let task = parsed.task().unwrap();
    assert_eq!(task.due_date, None);
    assert!(task.name.starts_with('x'));
}

struct FixedDate;

impl DueDateParser for FixedDate {
    fn parse_due_date(&self, text: &str) -> Option<DateTime<Utc>> {
        (text == "payday").then(|| Utc.with_ymd_and_hms(2024, 6, 28, 0, 0, 0).unwrap())
    }
}

#[test]
fn custom_date_parser_is_used() {
    let p = LineParser::with_date_parser(&TokensConfig::default(), Box::new(FixedDate)).unwrap();

    let parsed = p.parse_line("- [ ] pay rent @payday", LineHint::top_level(0)).unwrap();
    assert_eq!(
        parsed.task().unwrap().due_date,
        Some(Utc.with_ymd_and_hms(2024, 6, 28, 0, 0, 0).unwrap())
    );

    let parsed = p.parse_line("- [ ] pay rent @2024-01-01", LineHint::top_level(0)).unwrap();
    assert_eq!(parsed.task().unwrap().due_date, None);
}

#[test]
fn custom_tokens() {
    let tokens = TokensConfig {
        tag_prefix: "+".to_string(),
        due_prefix: "due:".to_string(),
        complete_markers: vec!["v".to_string()],
        ..TokensConfig::default()
    };
    let p = LineParser::new(&tokens).unwrap();

    let parsed = p
        .parse_line("- [v] ship it +release due:2024-02-03", LineHint::top_level(0))
        .unwrap();
    let task = parsed.task().unwrap();
    assert!(task.is_complete());
    assert_eq!(task.tags, vec!["release"]);
    assert_eq!(
        task.due_date,
        Some(Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap())
    );

    // `x` is no longer a completion marker
    assert_eq!(p.parse_line("- [x] ship it", LineHint::top_level(0)), None);
}

#[test]
fn task_file_link_supplies_identity() {
    let batch = parser().parse_document("- [ ] [[tasks/Water plants (12)]]\n");
    let task = batch[&0].task().unwrap();
    let link = task.link.as_ref().unwrap();
    assert_eq!(link.id, 12);
    assert_eq!(task.name, "Water plants");
}

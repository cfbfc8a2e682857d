//! Integration tests for queries and index materialization.

use serde_json::json;
use taskmark::config::TokensConfig;
use taskmark::index::query::{Condition, Field, Operator, Query, SortKey, apply};
use taskmark::index::{IndexSpec, materialize_index};
use taskmark::parser::LineParser;
use taskmark::render::render_index;
use taskmark::store::Store;
use taskmark::types::{TaskId, TaskInstance};

fn store_from(docs: &[(&str, &str)]) -> Store {
    let parser = LineParser::new(&TokensConfig::default()).unwrap();
    let mut store = Store::new(1);
    for (path, text) in docs {
        store.reconcile_file(path, &parser.parse_document(text)).unwrap();
    }
    store
}

fn ids(out: &[TaskInstance]) -> Vec<TaskId> {
    out.iter().filter_map(|instance| instance.task_id).collect()
}

fn backlog() -> IndexSpec {
    IndexSpec::new(
        Condition::new(Field::Complete, Operator::Eq, false),
        vec![SortKey::asc(Field::Created)],
    )
}

#[test]
fn materialize_is_deterministic() {
    let store = store_from(&[
        ("a.md", "- [ ] one ^3\n    - [ ] two ^1\n- [x] done ^2\n"),
        ("b.md", "- [ ] four ^4\n- [ ] five ^5 #errand\n"),
    ]);

    let first = materialize_index("Backlog.md", &backlog(), &store);
    let second = materialize_index("Backlog.md", &backlog(), &store);

    assert_eq!(first, second);
    assert!(!ids(&first).contains(&2));
    assert_eq!(render_index(&first), render_index(&second));
}

#[test]
fn output_lines_are_consecutive() {
    let store = store_from(&[("a.md", "- [ ] a ^1\n    - [ ] b ^2\n        - [ ] c ^3\n- [ ] d ^4\n")]);
    let out = materialize_index("Backlog.md", &backlog(), &store);

    let lines: Vec<usize> = out.iter().map(|instance| instance.line).collect();
    assert_eq!(lines, vec![0, 1, 2, 3]);
    assert_eq!(out[2].parent_line, Some(1));
    assert_eq!(out[3].parent_line, None);
    assert!(out.iter().all(|instance| instance.file_path == "Backlog.md"));
}

#[test]
fn rendered_index_nests_children() {
    let store = store_from(&[("a.md", "- [ ] plan trip ^1\n    - [ ] book flights ^2\n")]);
    let out = materialize_index("Backlog.md", &backlog(), &store);

    assert_eq!(
        render_index(&out),
        "- [ ] plan trip ^1\n    - [ ] book flights ^2\n"
    );
}

#[test]
fn tags_eq_compares_as_set() {
    let tags = json!(["b", "a"]);
    assert!(apply(Operator::Eq, &tags, &json!(["a", "b"])));
    assert!(!apply(Operator::Eq, &tags, &json!(["a"])));
    assert!(apply(Operator::Ne, &tags, &json!(["a", "c"])));
}

#[test]
fn tags_includes_element() {
    assert!(apply(Operator::Includes, &json!(["a", "b"]), &json!("a")));
    assert!(!apply(Operator::Includes, &json!(["b"]), &json!("a")));
    assert!(!apply(Operator::Includes, &json!("a"), &json!("a")));
}

#[test]
fn ordering_operators_exclude_arrays() {
    for op in [Operator::Gt, Operator::Gte, Operator::Lt, Operator::Lte] {
        assert!(!apply(op, &json!(["a"]), &json!("a")));
    }
    assert!(apply(Operator::Gt, &json!(5), &json!(3)));
    assert!(apply(Operator::Lte, &json!("2024-01-01"), &json!("2024-01-02")));
}

#[test]
fn like_is_substring_or_number_equality() {
    assert!(apply(Operator::Like, &json!("buy milk"), &json!("milk")));
    assert!(apply(Operator::Like, &json!(7), &json!(7)));
    assert!(!apply(Operator::Like, &json!(["milk"]), &json!("milk")));
}

#[test]
fn query_over_tags_selects_tasks() {
    let store = store_from(&[(
        "a.md",
        "- [ ] water #home #garden ^1\n- [ ] mow #garden #home ^2\n- [ ] email #work ^3\n",
    )]);

    let same_set = IndexSpec::new(
        Condition::new(Field::Tags, Operator::Eq, json!(["home", "garden"])),
        vec![SortKey::asc(Field::Id)],
    );
    assert_eq!(ids(&materialize_index("x.md", &same_set, &store)), vec![1, 2]);

    let work = IndexSpec::new(
        Condition::new(Field::Tags, Operator::Includes, "work"),
        vec![],
    );
    assert_eq!(ids(&materialize_index("x.md", &work, &store)), vec![3]);
}

#[test]
fn composite_query_from_json() {
    let store = store_from(&[(
        "a.md",
        "- [ ] alpha #x ^1\n- [x] beta #x ^2\n- [ ] gamma ^3\n",
    )]);

    let query = Query::from_json(
        r#"{"and": [
            {"field": "complete", "op": "EQ", "value": false},
            {"or": [
                {"field": "tags", "op": "INCLUDES", "value": "x"},
                {"field": "name", "op": "LIKE", "value": "gam"}
            ]}
        ]}"#,
    )
    .unwrap();

    let spec = IndexSpec::new(query, vec![SortKey::desc(Field::Id)]);
    assert_eq!(ids(&materialize_index("x.md", &spec, &store)), vec![3, 1]);
}

#[test]
fn invalid_query_json_is_rejected() {
    assert!(Query::from_json(r#"{"field": "nope", "op": "EQ"}"#).is_err());
    assert!(Query::from_json("not json").is_err());
}

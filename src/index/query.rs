//! Query predicates and sort keys for index documents.
//!
//! A query is a tree of `{field, op, value}` conditions combined with
//! `{and: [...]}` / `{or: [...]}` groups. Array-valued fields compare as sets.

use crate::error::{Result, SyncError};
use crate::types::{Task, format_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Task fields addressable by queries and sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Id,
    Name,
    Complete,
    #[serde(alias = "completed_date")]
    CompletedDate,
    Created,
    Updated,
    Tags,
    #[serde(alias = "due_date")]
    DueDate,
    Recurrence,
    #[serde(alias = "parent_ids")]
    ParentIds,
    #[serde(alias = "child_ids")]
    ChildIds,
}

impl Field {
    /// The task's value for this field, as the query layer sees it.
    /// Timestamps are RFC 3339 strings so they compare lexicographically.
    pub fn value_of(&self, task: &Task) -> Value {
        match self {
            Field::Id => Value::from(task.id),
            Field::Name => Value::from(task.name.clone()),
            Field::Complete => Value::Bool(task.complete),
            Field::CompletedDate => timestamp_value(task.completed_date.as_ref()),
            Field::Created => timestamp_value(Some(&task.created)),
            Field::Updated => timestamp_value(Some(&task.updated)),
            Field::Tags => Value::from(task.tags.clone()),
            Field::DueDate => timestamp_value(task.due_date.as_ref()),
            Field::Recurrence => task
                .recurrence
                .as_ref()
                .map_or(Value::Null, |r| Value::from(r.clone())),
            Field::ParentIds => Value::from(task.parent_ids.iter().copied().collect::<Vec<_>>()),
            Field::ChildIds => Value::from(task.child_ids.iter().copied().collect::<Vec<_>>()),
        }
    }
}

fn timestamp_value(ts: Option<&chrono::DateTime<chrono::Utc>>) -> Value {
    ts.map_or(Value::Null, |ts| Value::from(format_timestamp(ts)))
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Includes,
}

/// A single `{field, op, value}` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: Field,
    pub op: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: Field, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        apply(self.op, &self.field.value_of(task), &self.value)
    }
}

/// A composable filter over tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    /// Every sub-query matches. An empty group matches everything.
    All { and: Vec<Query> },
    /// At least one sub-query matches.
    Any { or: Vec<Query> },
    Condition(Condition),
}

impl Query {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Query::All { and } => and.iter().all(|q| q.matches(task)),
            Query::Any { or } => or.iter().any(|q| q.matches(task)),
            Query::Condition(condition) => condition.matches(task),
        }
    }

    /// Parse a query from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidQuery(e.to_string()))
    }
}

impl From<Condition> for Query {
    fn from(condition: Condition) -> Self {
        Query::Condition(condition)
    }
}

/// Evaluate one operator. `actual` is the task's value, `expected` the query's.
pub fn apply(op: Operator, actual: &Value, expected: &Value) -> bool {
    match op {
        Operator::Eq => equals(actual, expected),
        Operator::Ne => !equals(actual, expected),
        Operator::Gt => ordered(actual, expected).is_some_and(Ordering::is_gt),
        Operator::Gte => ordered(actual, expected).is_some_and(Ordering::is_ge),
        Operator::Lt => ordered(actual, expected).is_some_and(Ordering::is_lt),
        Operator::Lte => ordered(actual, expected).is_some_and(Ordering::is_le),
        Operator::Like => match (actual, expected) {
            (Value::String(a), Value::String(b)) => a.contains(b.as_str()),
            (Value::Number(_), Value::Number(_)) => scalar_equals(actual, expected),
            _ => false,
        },
        Operator::Includes => match actual {
            Value::Array(items) => items.iter().any(|item| scalar_equals(item, expected)),
            _ => false,
        },
    }
}

fn scalar_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Scalars compare directly; arrays compare as sets.
fn equals(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Array(a), Value::Array(b)) => {
            a.iter().all(|x| b.iter().any(|y| scalar_equals(x, y)))
                && b.iter().all(|y| a.iter().any(|x| scalar_equals(x, y)))
        }
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        _ => scalar_equals(actual, expected),
    }
}

/// Ordering for GT/GTE/LT/LTE. `None` for arrays, nulls and mixed types.
fn ordered(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One sort criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: Field,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: Field) -> Self {
        Self {
            field,
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: Field) -> Self {
        Self {
            field,
            order: SortOrder::Desc,
        }
    }
}

/// Compare two tasks by a list of sort keys, breaking ties by id.
/// Missing values sort last in either direction.
pub fn compare_tasks(a: &Task, b: &Task, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let (x, y) = (key.field.value_of(a), key.field.value_of(b));
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = sort_values(&x, &y);
                match key.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id.cmp(&b.id)
}

fn sort_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(p, q)| sort_values(p, q))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => ordered(a, b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_ms;
    use serde_json::json;

    fn task(id: u64, tags: &[&str]) -> Task {
        let mut task = Task::new(id, format!("task {}", id), now_ms());
        task.tags = tags.iter().map(|t| t.to_string()).collect();
        task
    }

    #[test]
    fn test_array_eq_is_set_equality() {
        let t = task(1, &["b", "a"]);
        assert!(Condition::new(Field::Tags, Operator::Eq, json!(["a", "b"])).matches(&t));
        assert!(!Condition::new(Field::Tags, Operator::Eq, json!(["a"])).matches(&t));
        assert!(Condition::new(Field::Tags, Operator::Ne, json!(["a"])).matches(&t));
        assert!(!Condition::new(Field::Tags, Operator::Eq, json!("a")).matches(&t));
    }

    #[test]
    fn test_includes() {
        let t = task(1, &["a", "b"]);
        assert!(Condition::new(Field::Tags, Operator::Includes, "a").matches(&t));
        assert!(!Condition::new(Field::Tags, Operator::Includes, "c").matches(&t));
        // scalar fields never include
        assert!(!Condition::new(Field::Name, Operator::Includes, "task").matches(&t));
    }

    #[test]
    fn test_ordering_operators() {
        let t = task(5, &[]);
        assert!(Condition::new(Field::Id, Operator::Gt, 4).matches(&t));
        assert!(Condition::new(Field::Id, Operator::Gte, 5).matches(&t));
        assert!(!Condition::new(Field::Id, Operator::Lt, 5).matches(&t));
        assert!(Condition::new(Field::Id, Operator::Lte, 5.0).matches(&t));
        assert!(Condition::new(Field::Name, Operator::Lt, "task 6").matches(&t));
        // arrays are excluded from ordering
        assert!(!Condition::new(Field::Tags, Operator::Gt, json!([])).matches(&t));
        // missing values never compare
        assert!(!Condition::new(Field::DueDate, Operator::Lt, "9999").matches(&t));
    }

    #[test]
    fn test_like() {
        let t = task(12, &["x"]);
        assert!(Condition::new(Field::Name, Operator::Like, "sk 1").matches(&t));
        assert!(!Condition::new(Field::Name, Operator::Like, "TASK").matches(&t));
        assert!(Condition::new(Field::Id, Operator::Like, 12).matches(&t));
        assert!(!Condition::new(Field::Tags, Operator::Like, "x").matches(&t));
    }

    #[test]
    fn test_null_equality() {
        let t = task(1, &[]);
        assert!(Condition::new(Field::DueDate, Operator::Eq, Value::Null).matches(&t));
        assert!(Condition::new(Field::CompletedDate, Operator::Eq, Value::Null).matches(&t));
    }

    #[test]
    fn test_groups() {
        let t = task(3, &["work"]);
        let query: Query = serde_json::from_value(json!({
            "and": [
                {"field": "complete", "op": "EQ", "value": false},
                {"or": [
                    {"field": "tags", "op": "INCLUDES", "value": "home"},
                    {"field": "tags", "op": "INCLUDES", "value": "work"}
                ]}
            ]
        }))
        .unwrap();
        assert!(query.matches(&t));
        assert!(Query::All { and: vec![] }.matches(&t));
        assert!(!Query::Any { or: vec![] }.matches(&t));
    }

    #[test]
    fn test_field_aliases() {
        let condition: Condition =
            serde_json::from_value(json!({"field": "due_date", "op": "EQ"})).unwrap();
        assert_eq!(condition.field, Field::DueDate);
        assert_eq!(condition.value, Value::Null);
    }

    #[test]
    fn test_from_json_error() {
        let err = Query::from_json(r#"{"field": "nope", "op": "EQ"}"#).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidQuery);
    }

    #[test]
    fn test_compare_tasks() {
        let now = now_ms();
        let mut a = Task::new(1, "a", now);
        let mut b = Task::new(2, "b", now);
        assert_eq!(compare_tasks(&a, &b, &[SortKey::asc(Field::Created)]), Ordering::Less);

        a.set_complete(true, now);
        b.set_complete(true, now + chrono::Duration::seconds(1));
        assert_eq!(
            compare_tasks(&a, &b, &[SortKey::desc(Field::CompletedDate)]),
            Ordering::Greater
        );

        // missing values last, even descending
        let c = Task::new(3, "c", now);
        assert_eq!(
            compare_tasks(&c, &a, &[SortKey::desc(Field::CompletedDate)]),
            Ordering::Greater
        );
    }
}

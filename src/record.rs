//! Flat key/value records for persisting tasks and instances.
//!
//! Every value is a string or a list of strings, the shape of a front-matter
//! block. Timestamps are RFC 3339 with as many fractional digits as needed,
//! so decoding returns the exact value that was encoded. Optional fields are
//! omitted when unset.

use crate::error::{Result, SyncError};
use crate::types::{Task, TaskId, TaskInstance};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// A single record value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Scalar(String),
    List(Vec<String>),
}

/// A flat record keyed by field name.
pub type Record = BTreeMap<String, RecordValue>;

/// Conversion to and from flat records.
pub trait Recordable: Sized {
    fn to_record(&self) -> Record;
    fn from_record(record: &Record) -> Result<Self>;
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

struct Writer(Record);

impl Writer {
    fn scalar(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.0
            .insert(key.to_string(), RecordValue::Scalar(value.to_string()));
        self
    }

    fn optional(&mut self, key: &str, value: Option<impl ToString>) -> &mut Self {
        if let Some(value) = value {
            self.scalar(key, value);
        }
        self
    }

    fn list<T: ToString>(&mut self, key: &str, values: impl IntoIterator<Item = T>) -> &mut Self {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.0.insert(key.to_string(), RecordValue::List(values));
        self
    }
}

struct Reader<'a>(&'a Record);

impl Reader<'_> {
    fn text(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(RecordValue::Scalar(value)) => Ok(Some(value)),
            Some(RecordValue::List(_)) => Err(SyncError::invalid_record(key, "expected a string")),
        }
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.text(key)?
            .ok_or_else(|| SyncError::invalid_record(key, "missing"))
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.text(key)?
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| SyncError::invalid_record(key, format!("cannot parse {:?}", value)))
            })
            .transpose()
    }

    fn parse_required<T: FromStr>(&self, key: &str) -> Result<T> {
        self.parse(key)?
            .ok_or_else(|| SyncError::invalid_record(key, "missing"))
    }

    fn timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        self.text(key)?
            .map(|value| {
                DateTime::parse_from_rfc3339(value)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| SyncError::invalid_record(key, e.to_string()))
            })
            .transpose()
    }

    fn timestamp_required(&self, key: &str) -> Result<DateTime<Utc>> {
        self.timestamp(key)?
            .ok_or_else(|| SyncError::invalid_record(key, "missing"))
    }

    fn list(&self, key: &str) -> Result<Vec<String>> {
        match self.0.get(key) {
            None => Ok(Vec::new()),
            Some(RecordValue::List(values)) => Ok(values.clone()),
            Some(RecordValue::Scalar(_)) => Err(SyncError::invalid_record(key, "expected a list")),
        }
    }

    fn parsed_list<T: FromStr>(&self, key: &str) -> Result<Vec<T>> {
        self.list(key)?
            .iter()
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| SyncError::invalid_record(key, format!("cannot parse {:?}", value)))
            })
            .collect()
    }
}

impl Recordable for Task {
    fn to_record(&self) -> Record {
        let mut w = Writer(Record::new());
        w.scalar("id", self.id)
            .scalar("name", &self.name)
            .scalar("complete", self.complete)
            .optional("completedDate", self.completed_date.as_ref().map(timestamp))
            .scalar("created", timestamp(&self.created))
            .scalar("updated", timestamp(&self.updated))
            .list("tags", &self.tags)
            .optional("dueDate", self.due_date.as_ref().map(timestamp))
            .optional("recurrence", self.recurrence.as_ref())
            .list("parentIds", &self.parent_ids)
            .list("childIds", &self.child_ids);
        w.0
    }

    fn from_record(record: &Record) -> Result<Self> {
        let r = Reader(record);
        Ok(Task {
            id: r.parse_required("id")?,
            name: r.required("name")?.to_string(),
            complete: r.parse_required("complete")?,
            completed_date: r.timestamp("completedDate")?,
            created: r.timestamp_required("created")?,
            updated: r.timestamp_required("updated")?,
            tags: r.list("tags")?,
            due_date: r.timestamp("dueDate")?,
            recurrence: r.text("recurrence")?.map(str::to_string),
            parent_ids: r.parsed_list::<TaskId>("parentIds")?.into_iter().collect::<BTreeSet<_>>(),
            child_ids: r.parsed_list::<TaskId>("childIds")?.into_iter().collect::<BTreeSet<_>>(),
        })
    }
}

impl Recordable for TaskInstance {
    fn to_record(&self) -> Record {
        let mut w = Writer(Record::new());
        w.optional("taskId", self.task_id)
            .scalar("filePath", &self.file_path)
            .scalar("line", self.line)
            .optional("parentLine", self.parent_line)
            .optional("parentTaskId", self.parent_task_id)
            .scalar("rawText", &self.raw_text)
            .scalar("name", &self.name)
            .list("childLines", &self.child_lines)
            .list("tags", &self.tags)
            .optional("dueDate", self.due_date.as_ref().map(timestamp))
            .optional("recurrence", self.recurrence.as_ref())
            .list("links", &self.links)
            .scalar("complete", self.complete);
        w.0
    }

    fn from_record(record: &Record) -> Result<Self> {
        let r = Reader(record);
        Ok(TaskInstance {
            task_id: r.parse("taskId")?,
            file_path: r.required("filePath")?.to_string(),
            line: r.parse_required("line")?,
            parent_line: r.parse("parentLine")?,
            parent_task_id: r.parse("parentTaskId")?,
            raw_text: r.required("rawText")?.to_string(),
            name: r.required("name")?.to_string(),
            child_lines: r.parsed_list("childLines")?,
            tags: r.list("tags")?,
            due_date: r.timestamp("dueDate")?,
            recurrence: r.text("recurrence")?.map(str::to_string),
            links: r.list("links")?,
            complete: r.parse_required("complete")?,
        })
    }
}

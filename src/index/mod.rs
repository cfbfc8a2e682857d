//! Index documents: derived, read-only views over the task store.

pub mod query;

use crate::render::render_instance_line;
use crate::store::Store;
use crate::types::{Task, TaskId, TaskInstance};
use query::{Query, SortKey, compare_tasks};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Query and sort order of one index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub query: Query,
    #[serde(default)]
    pub sort: Vec<SortKey>,
}

impl IndexSpec {
    pub fn new(query: impl Into<Query>, sort: Vec<SortKey>) -> Self {
        Self {
            query: query.into(),
            sort,
        }
    }
}

struct Materializer<'a> {
    path: &'a str,
    sort: &'a [SortKey],
    matching: BTreeMap<TaskId, &'a Task>,
    emitted: HashSet<TaskId>,
    out: Vec<TaskInstance>,
}

impl<'a> Materializer<'a> {
    fn sorted(&self, ids: impl IntoIterator<Item = TaskId>) -> Vec<&'a Task> {
        let mut tasks: Vec<&'a Task> = ids
            .into_iter()
            .filter(|id| !self.emitted.contains(id))
            .filter_map(|id| self.matching.get(&id).copied())
            .collect();
        tasks.sort_by(|a, b| compare_tasks(a, b, self.sort));
        tasks
    }

    fn emit(&mut self, task: &'a Task, parent: Option<(usize, TaskId)>, depth: usize) {
        if !self.emitted.insert(task.id) {
            return;
        }
        let line = self.out.len();
        let mut instance = TaskInstance {
            task_id: Some(task.id),
            file_path: self.path.to_string(),
            line,
            parent_line: parent.map(|(line, _)| line),
            parent_task_id: parent.map(|(_, id)| id),
            raw_text: String::new(),
            name: task.name.clone(),
            child_lines: Vec::new(),
            tags: task.tags.clone(),
            due_date: task.due_date,
            recurrence: task.recurrence.clone(),
            links: Vec::new(),
            complete: task.complete,
        };
        instance.raw_text = render_instance_line(&instance, depth);
        self.out.push(instance);

        for child in self.sorted(task.child_ids.iter().copied()) {
            let before = self.out.len();
            self.emit(child, Some((line, task.id)), depth + 1);
            if self.out.len() > before {
                self.out[line].child_lines.push(before);
            }
        }
    }
}

/// Produce the instances of an index document at `path`.
///
/// Matching tasks whose parent also matches are nested under that parent instead of
/// appearing as roots. Each task is emitted at most once. Tasks only reachable
/// through a cycle of matching parents are emitted as roots after the rest.
pub fn materialize_index(path: &str, spec: &IndexSpec, store: &Store) -> Vec<TaskInstance> {
    let matching: BTreeMap<TaskId, &Task> = store
        .tasks()
        .filter(|task| spec.query.matches(task))
        .map(|task| (task.id, task))
        .collect();

    let roots: Vec<TaskId> = matching
        .values()
        .filter(|task| !task.parent_ids.iter().any(|p| matching.contains_key(p)))
        .map(|task| task.id)
        .collect();

    let mut materializer = Materializer {
        path,
        sort: &spec.sort,
        matching,
        emitted: HashSet::new(),
        out: Vec::new(),
    };

    for root in materializer.sorted(roots) {
        materializer.emit(root, None, 0);
    }

    let leftover: Vec<TaskId> = materializer.matching.keys().copied().collect();
    for task in materializer.sorted(leftover) {
        materializer.emit(task, None, 0);
    }

    materializer.out
}

/// Nesting depth of each instance, derived from `parent_line`.
pub fn depths(instances: &[TaskInstance]) -> HashMap<usize, usize> {
    let mut depth = HashMap::new();
    for instance in instances {
        let d = instance
            .parent_line
            .and_then(|p| depth.get(&p))
            .map_or(0, |d| d + 1);
        depth.insert(instance.line, d);
    }
    depth
}

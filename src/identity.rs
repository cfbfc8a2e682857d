//! Identity resolution: which task does a checklist line refer to?
//!
//! Rules, in order:
//! 1. a nonzero trailing `^token` id,
//! 2. a link to a task file carrying an id,
//! 3. optionally, the task previously stored at the same `(file, line)` when the
//!    name or the set of child names still matches,
//! 4. otherwise a new task (id minted during reconciliation).

use crate::parser::{FileBatch, LineKind, ParsedTask};
use crate::types::{NO_ID, TaskId, TaskInstance};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How a line's task id was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// `^token` at the end of the line.
    Explicit(TaskId),
    /// The line is a single link to a task file.
    Linked(TaskId),
    /// Matched the task previously stored at this line.
    SameLine(TaskId),
    /// No identity; a task will be minted.
    New,
}

impl Identity {
    pub fn id(&self) -> Option<TaskId> {
        match *self {
            Identity::Explicit(id) | Identity::Linked(id) | Identity::SameLine(id) => Some(id),
            Identity::New => None,
        }
    }

    /// Whether the id is written on the line itself.
    pub fn is_written(&self) -> bool {
        matches!(self, Identity::Explicit(_) | Identity::Linked(_))
    }
}

/// Apply the deterministic rules to one parsed task.
pub fn resolve(task: &ParsedTask) -> Identity {
    if task.id_token != NO_ID {
        return Identity::Explicit(task.id_token);
    }
    match &task.link {
        Some(link) if link.id != NO_ID => Identity::Linked(link.id),
        _ => Identity::New,
    }
}

#[derive(Debug, Clone)]
struct PreviousLine {
    task_id: TaskId,
    name: String,
    child_names: BTreeSet<String>,
}

/// What a file looked like at its previous reconciliation, for the same-line heuristic.
#[derive(Debug, Clone, Default)]
pub struct PreviousLines {
    by_line: HashMap<usize, PreviousLine>,
}

impl PreviousLines {
    /// Index the stored instances of one file.
    pub fn from_instances<'a>(instances: impl IntoIterator<Item = &'a TaskInstance>) -> Self {
        let instances: Vec<&TaskInstance> = instances.into_iter().collect();

        let mut child_names: HashMap<usize, BTreeSet<String>> = HashMap::new();
        for instance in &instances {
            if let (Some(parent), Some(_)) = (instance.parent_line, instance.task_id) {
                child_names
                    .entry(parent)
                    .or_default()
                    .insert(instance.name.clone());
            }
        }

        let by_line = instances
            .iter()
            .filter_map(|instance| {
                let task_id = instance.task_id?;
                Some((
                    instance.line,
                    PreviousLine {
                        task_id,
                        name: instance.name.clone(),
                        child_names: child_names.remove(&instance.line).unwrap_or_default(),
                    },
                ))
            })
            .collect();

        Self { by_line }
    }

    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }

    /// Task previously at `line` if its name, or its non-empty set of child names, matches.
    pub fn matching(
        &self,
        line: usize,
        name: &str,
        child_names: &BTreeSet<String>,
    ) -> Option<TaskId> {
        let previous = self.by_line.get(&line)?;
        let same_name = previous.name == name;
        let same_children = !child_names.is_empty() && previous.child_names == *child_names;
        (same_name || same_children).then_some(previous.task_id)
    }
}

/// Names of the task lines whose nearest enclosing instance is `line`.
fn child_names(batch: &FileBatch, parents: &BTreeMap<usize, Option<usize>>, line: usize) -> BTreeSet<String> {
    batch
        .values()
        .filter(|child| parents.get(&child.line).copied().flatten() == Some(line))
        .filter_map(|child| child.task().map(|task| task.name.clone()))
        .collect()
}

/// Nearest ancestor of each line that is itself an instance (task or placeholder).
pub fn instance_parents(batch: &FileBatch) -> BTreeMap<usize, Option<usize>> {
    batch
        .keys()
        .map(|&line| {
            let mut parent = batch.get(&line).and_then(|parsed| parsed.parent_line);
            let mut steps = 0;
            while let Some(candidate) = parent {
                match batch.get(&candidate) {
                    Some(parsed) if parsed.is_instance() => break,
                    Some(parsed) if steps < batch.len() => {
                        parent = parsed.parent_line;
                        steps += 1;
                    }
                    _ => {
                        parent = None;
                    }
                }
            }
            (line, parent)
        })
        .collect()
}

/// Resolve every task line of a batch. Placeholders and list items are not included.
pub fn resolve_batch(batch: &FileBatch, previous: Option<&PreviousLines>) -> BTreeMap<usize, Identity> {
    let parents = previous
        .filter(|previous| !previous.is_empty())
        .map(|_| instance_parents(batch));

    batch
        .values()
        .filter_map(|parsed| {
            let task = match &parsed.kind {
                LineKind::Task(task) => task,
                _ => return None,
            };
            let mut identity = resolve(task);
            if identity == Identity::New
                && let (Some(previous), Some(parents)) = (previous, parents.as_ref())
            {
                let children = child_names(batch, parents, parsed.line);
                if let Some(id) = previous.matching(parsed.line, &task.name, &children) {
                    identity = Identity::SameLine(id);
                }
            }
            Some((parsed.line, identity))
        })
        .collect()
}

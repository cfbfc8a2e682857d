//! File reconciliation: replace one file's instances with a fresh parse.

use super::{NewTask, Store};
use crate::error::{Result, SyncError};
use crate::identity::{Identity, PreviousLines, instance_parents, resolve_batch};
use crate::parser::{FileBatch, ParsedLine};
use crate::types::{InstanceKey, TaskId, TaskInstance};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};

/// What a call to [`Store::reconcile_file`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The batch matched the previous one for this file; nothing was touched.
    pub unchanged: bool,
    /// Tasks created by this pass, in creation order.
    pub created: Vec<TaskId>,
    /// Lines whose task id is not written on the line itself, with the id they resolved to.
    pub assigned: Vec<(usize, TaskId)>,
    /// Previously stored lines that are no longer instances.
    pub removed_instances: usize,
    /// Existing tasks whose fields changed.
    pub updated_tasks: Vec<TaskId>,
    /// Lines whose task update was skipped because the task could not be found.
    pub skipped: Vec<usize>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.unchanged
            || (self.created.is_empty()
                && self.removed_instances == 0
                && self.updated_tasks.is_empty())
    }
}

fn fingerprint(batch: &FileBatch) -> u64 {
    let mut hasher = DefaultHasher::new();
    batch.hash(&mut hasher);
    hasher.finish()
}

/// Every parent line must exist in the batch and every parent chain must end.
fn validate(file_path: &str, batch: &FileBatch) -> Result<()> {
    for (&line, parsed) in batch {
        if parsed.line != line {
            return Err(SyncError::invalid_record(
                "line",
                format!("{}: batch key {} holds line {}", file_path, line, parsed.line),
            ));
        }

        let mut current = parsed;
        let mut steps = 0;
        while let Some(parent_line) = current.parent_line {
            match batch.get(&parent_line) {
                Some(parent) if steps < batch.len() => {
                    current = parent;
                    steps += 1;
                }
                _ => {
                    return Err(SyncError::DanglingParent {
                        file: file_path.to_string(),
                        line: current.line,
                        parent_line,
                    });
                }
            }
        }
    }
    Ok(())
}

/// A line is complete when it or any ancestor in the batch is checked.
fn effective_completion(batch: &FileBatch) -> BTreeMap<usize, bool> {
    batch
        .iter()
        .map(|(&line, parsed)| {
            let mut complete = parsed.is_complete();
            let mut parent = parsed.parent_line;
            while let (false, Some(parent_line)) = (complete, parent) {
                match batch.get(&parent_line) {
                    Some(ancestor) => {
                        complete = ancestor.is_complete();
                        parent = ancestor.parent_line;
                    }
                    None => break,
                }
            }
            (line, complete)
        })
        .collect()
}

fn new_task_from(parsed: &ParsedLine, complete: bool, id: Option<TaskId>) -> Option<NewTask> {
    let task = parsed.task()?;
    Some(NewTask {
        id,
        name: task.name.clone(),
        complete,
        tags: task.tags.clone(),
        due_date: task.due_date,
        recurrence: task.recurrence.clone(),
    })
}

impl Store {
    /// Merge a freshly parsed file into the store.
    ///
    /// The file's previous instances are replaced wholesale. The batch is validated
    /// before anything is mutated, so a [`SyncError::DanglingParent`] leaves the store
    /// untouched. A batch identical to the last one reconciled for this file is a no-op.
    pub fn reconcile_file(&mut self, file_path: &str, batch: &FileBatch) -> Result<ReconcileReport> {
        let fingerprint = fingerprint(batch);
        if self.file_hashes.get(file_path) == Some(&fingerprint) {
            debug!(file = %file_path, "Batch unchanged");
            return Ok(ReconcileReport {
                unchanged: true,
                ..ReconcileReport::default()
            });
        }

        validate(file_path, batch)?;

        let complete = effective_completion(batch);
        let parents = instance_parents(batch);
        let previous = self
            .match_previous_lines
            .then(|| PreviousLines::from_instances(self.instances_in_file(file_path)));
        let identities = resolve_batch(batch, previous.as_ref());

        let mut report = ReconcileReport::default();

        // Resolve ids. Ids named in the document are created before any are minted.
        let mut task_ids: BTreeMap<usize, TaskId> = BTreeMap::new();
        let mut unresolved: Vec<usize> = Vec::new();
        for (&line, identity) in &identities {
            match *identity {
                Identity::SameLine(id) if !self.tasks.contains_key(&id) => unresolved.push(line),
                Identity::New => unresolved.push(line),
                _ => {
                    if let Some(id) = identity.id() {
                        task_ids.insert(line, id);
                    }
                }
            }
        }

        for (&line, &id) in &task_ids {
            if self.tasks.contains_key(&id) {
                continue;
            }
            if let Some(props) = new_task_from(&batch[&line], complete[&line], Some(id)) {
                self.create_task(props);
                report.created.push(id);
            }
        }

        for line in unresolved {
            if let Some(props) = new_task_from(&batch[&line], complete[&line], None) {
                let id = self.create_task(props).id;
                report.created.push(id);
                task_ids.insert(line, id);
            }
        }

        for (&line, identity) in &identities {
            if !identity.is_written()
                && let Some(&id) = task_ids.get(&line)
            {
                report.assigned.push((line, id));
            }
        }

        // Replace the file's instances.
        let old_lines: Vec<usize> = self
            .by_file
            .get(file_path)
            .map(|lines| lines.iter().copied().collect())
            .unwrap_or_default();

        let mut touched: BTreeSet<TaskId> = task_ids.values().copied().collect();
        for &line in &old_lines {
            let key = InstanceKey::new(file_path, line);
            if let Some(removed) = self.remove_instance(&key) {
                touched.extend(removed.task_id);
                let still_instance = batch.get(&line).is_some_and(ParsedLine::is_instance);
                if !still_instance {
                    report.removed_instances += 1;
                }
            }
        }

        let instance_lines: BTreeSet<usize> = batch
            .values()
            .filter(|parsed| parsed.is_instance())
            .map(|parsed| parsed.line)
            .collect();

        for &line in &instance_lines {
            let parsed = &batch[&line];
            let parent_line = parents.get(&line).copied().flatten();

            let mut ancestor = parent_line;
            let parent_task_id = loop {
                match ancestor {
                    Some(candidate) => match task_ids.get(&candidate) {
                        Some(&id) => break Some(id),
                        None => ancestor = parents.get(&candidate).copied().flatten(),
                    },
                    None => break None,
                }
            };

            let child_lines = instance_lines
                .iter()
                .copied()
                .filter(|child| parents.get(child).copied().flatten() == Some(line))
                .collect();

            let (name, tags, due_date, recurrence, links) = match parsed.task() {
                Some(task) => (
                    task.name.clone(),
                    task.tags.clone(),
                    task.due_date,
                    task.recurrence.clone(),
                    task.links.clone(),
                ),
                None => (String::new(), Vec::new(), None, None, Vec::new()),
            };

            self.insert_instance(TaskInstance {
                task_id: task_ids.get(&line).copied(),
                file_path: file_path.to_string(),
                line,
                parent_line,
                parent_task_id,
                raw_text: parsed.raw_text.clone(),
                name,
                child_lines,
                tags,
                due_date,
                recurrence,
                links,
                complete: complete.get(&line).copied().unwrap_or(false),
            });
        }

        // Update the tasks this file mentions.
        let mut lines_by_task: BTreeMap<TaskId, Vec<usize>> = BTreeMap::new();
        for (&line, &id) in &task_ids {
            lines_by_task.entry(id).or_default().push(line);
        }

        let now = self.now();
        for (id, lines) in lines_by_task {
            let any_complete = self.instances_of(id).iter().any(|instance| instance.complete);
            let Some(task) = self.tasks.get_mut(&id) else {
                warn!(file = %file_path, task_id = id, "Task vanished during reconciliation; skipping update");
                report.skipped.extend(lines);
                continue;
            };

            let parsed: Vec<_> = lines.iter().filter_map(|line| batch[line].task()).collect();
            let mut changed = false;

            if let Some(first) = parsed.first()
                && task.name != first.name
            {
                task.name = first.name.clone();
                changed = true;
            }
            for line_task in &parsed {
                changed |= task.merge_tags(&line_task.tags);
            }
            if let Some(due) = parsed.iter().find_map(|t| t.due_date)
                && task.due_date != Some(due)
            {
                task.due_date = Some(due);
                changed = true;
            }
            if let Some(recurrence) = parsed.iter().find_map(|t| t.recurrence.as_ref())
                && task.recurrence.as_ref() != Some(recurrence)
            {
                task.recurrence = Some(recurrence.clone());
                changed = true;
            }
            // Every instance in this file is incomplete and none elsewhere is complete:
            // that is an explicit report of incompletion.
            changed |= task.set_complete(any_complete, now);

            if changed {
                task.updated = now;
                if !report.created.contains(&id) {
                    report.updated_tasks.push(id);
                }
            }
        }

        // Tasks that lost an instance here but are not on any line of this file.
        let mentioned: BTreeSet<TaskId> = task_ids.values().copied().collect();
        let unmentioned: BTreeSet<TaskId> = touched.difference(&mentioned).copied().collect();
        report
            .updated_tasks
            .extend(self.recheck_completion(&unmentioned, now));

        self.relink(&touched);
        self.file_hashes.insert(file_path.to_string(), fingerprint);

        info!(
            file = %file_path,
            instances = instance_lines.len(),
            created = report.created.len(),
            removed = report.removed_instances,
            updated = report.updated_tasks.len(),
            "Reconciled file"
        );
        Ok(report)
    }
}

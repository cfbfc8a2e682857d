//! In-memory task database.
//!
//! Tasks are keyed by id and instances by `(file_path, line)`. Lookups by file and
//! by task go through derived indices that every mutation keeps current.

mod reconcile;

pub use reconcile::ReconcileReport;

use crate::config::TasksConfig;
use crate::error::{Result, SyncError};
use crate::types::{InstanceKey, NO_ID, Task, TaskId, TaskInstance, now_ms};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Properties of a task to create.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Explicit id; minted when `None` or [`NO_ID`].
    pub id: Option<TaskId>,
    pub name: String,
    pub complete: bool,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurrence: Option<String>,
}

impl NewTask {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Outcome of [`Store::delete_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRemoval {
    pub instances: usize,
    /// Tasks deleted because the file held their last instance.
    pub deleted_tasks: Vec<TaskId>,
}

/// The task database.
#[derive(Debug, Clone)]
pub struct Store {
    tasks: BTreeMap<TaskId, Task>,
    instances: BTreeMap<InstanceKey, TaskInstance>,
    by_file: BTreeMap<String, BTreeSet<usize>>,
    by_task: HashMap<TaskId, BTreeSet<InstanceKey>>,
    /// Fingerprint of the batch each file was last reconciled from.
    file_hashes: HashMap<String, u64>,
    min_id: TaskId,
    delete_subtasks: bool,
    match_previous_lines: bool,
    clock: fn() -> DateTime<Utc>,
}

impl Store {
    /// Create an empty store minting ids from `min_id` upward.
    pub fn new(min_id: TaskId) -> Self {
        Self {
            tasks: BTreeMap::new(),
            instances: BTreeMap::new(),
            by_file: BTreeMap::new(),
            by_task: HashMap::new(),
            file_hashes: HashMap::new(),
            min_id: min_id.max(1),
            delete_subtasks: false,
            match_previous_lines: true,
            clock: now_ms,
        }
    }

    pub fn from_config(config: &TasksConfig) -> Self {
        let mut store = Self::new(config.min_id);
        store.delete_subtasks = config.delete_subtasks;
        store.match_previous_lines = config.match_previous_lines;
        store
    }

    /// Rebuild a store from persisted records. Derived indices are recomputed.
    pub fn from_parts(
        config: &TasksConfig,
        tasks: impl IntoIterator<Item = Task>,
        instances: impl IntoIterator<Item = TaskInstance>,
    ) -> Self {
        let mut store = Self::from_config(config);
        for task in tasks {
            store.tasks.insert(task.id, task);
        }
        for instance in instances {
            store.insert_instance(instance);
        }
        store
    }

    /// Replace the time source used for `created`, `updated` and `completed_date`.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn min_id(&self) -> TaskId {
        self.min_id
    }

    pub fn delete_subtasks(&self) -> bool {
        self.delete_subtasks
    }

    pub fn set_match_previous_lines(&mut self, enabled: bool) {
        self.match_previous_lines = enabled;
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// The id the next minted task receives: one past the highest id, at least `min_id`.
    /// When the highest id is `u64::MAX` the lowest free id from `min_id` up is used.
    pub fn next_id(&self) -> TaskId {
        match self.tasks.keys().next_back() {
            None => self.min_id,
            Some(&max) => match max.checked_add(1) {
                Some(after_max) => after_max.max(self.min_id),
                None => self.lowest_free_id(),
            },
        }
    }

    fn lowest_free_id(&self) -> TaskId {
        let mut candidate = self.min_id;
        for &id in self.tasks.range(self.min_id..).map(|(id, _)| id) {
            if id != candidate {
                break;
            }
            candidate = candidate.saturating_add(1);
        }
        candidate
    }

    /// Create a task. An explicit id that is already in use returns the existing task unchanged.
    pub fn create_task(&mut self, props: NewTask) -> Task {
        let id = match props.id {
            Some(id) if id != NO_ID => id,
            _ => self.next_id(),
        };
        if let Some(existing) = self.tasks.get(&id) {
            return existing.clone();
        }

        let now = self.now();
        let mut task = Task::new(id, props.name, now);
        task.merge_tags(&props.tags);
        task.due_date = props.due_date;
        task.recurrence = props.recurrence;
        task.set_complete(props.complete, now);

        debug!(task_id = id, name = %task.name, "Created task");
        self.tasks.insert(id, task.clone());
        task
    }

    pub fn get_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Every tag used by any task, sorted.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.tasks
            .values()
            .flat_map(|task| task.tags.iter().map(String::as_str))
            .collect()
    }

    /// Delete a task and its instances. Returns the ids of every deleted task.
    ///
    /// Without `cascade`, instances nested under the deleted task's instances become
    /// top-level. With `cascade`, descendant tasks are deleted as well.
    pub fn delete_task(&mut self, id: TaskId, cascade: bool) -> Result<Vec<TaskId>> {
        if !self.tasks.contains_key(&id) {
            return Err(SyncError::TaskNotFound(id));
        }

        let mut doomed = vec![id];
        if cascade {
            let mut seen: HashSet<TaskId> = HashSet::from([id]);
            let mut queue: VecDeque<TaskId> = VecDeque::from([id]);
            while let Some(current) = queue.pop_front() {
                let Some(task) = self.tasks.get(&current) else {
                    continue;
                };
                for &child in &task.child_ids {
                    if seen.insert(child) {
                        doomed.push(child);
                        queue.push_back(child);
                    }
                }
            }
        }

        let doomed_set: HashSet<TaskId> = doomed.iter().copied().collect();
        for &task_id in &doomed {
            self.remove_task(task_id, &doomed_set);
        }

        info!(task_id = id, cascade, deleted = doomed.len(), "Deleted task");
        Ok(doomed)
    }

    fn remove_task(&mut self, id: TaskId, doomed: &HashSet<TaskId>) {
        let keys: Vec<InstanceKey> = self
            .by_task
            .get(&id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();

        for key in keys {
            let Some(removed) = self.remove_instance(&key) else {
                continue;
            };
            self.file_hashes.remove(&key.file_path);

            if let Some(parent_line) = removed.parent_line {
                let parent_key = InstanceKey::new(key.file_path.clone(), parent_line);
                if let Some(parent) = self.instances.get_mut(&parent_key) {
                    parent.child_lines.retain(|&line| line != key.line);
                }
            }

            for child_line in &removed.child_lines {
                let child_key = InstanceKey::new(key.file_path.clone(), *child_line);
                if let Some(child) = self.instances.get_mut(&child_key) {
                    child.parent_line = None;
                    child.parent_task_id = None;
                }
            }
        }

        // instances elsewhere that still point at the deleted task
        let orphaned: Vec<InstanceKey> = self
            .instances
            .values()
            .filter(|instance| instance.parent_task_id == Some(id))
            .map(TaskInstance::key)
            .collect();
        for key in orphaned {
            if let Some(instance) = self.instances.get_mut(&key) {
                instance.parent_task_id = None;
            }
        }

        let Some(task) = self.tasks.remove(&id) else {
            return;
        };
        self.by_task.remove(&id);

        for parent in &task.parent_ids {
            if let Some(parent) = self.tasks.get_mut(parent) {
                parent.child_ids.remove(&id);
            }
        }
        for child in &task.child_ids {
            if doomed.contains(child) {
                continue;
            }
            if let Some(child) = self.tasks.get_mut(child) {
                child.parent_ids.remove(&id);
            }
        }
    }

    /// Explicitly mark a task complete or incomplete. Updates every instance's observed state.
    /// Returns true if the task's state changed.
    pub fn set_task_complete(&mut self, id: TaskId, complete: bool) -> Result<bool> {
        let now = self.now();
        let task = self.tasks.get_mut(&id).ok_or(SyncError::TaskNotFound(id))?;
        let changed = task.set_complete(complete, now);
        if changed {
            task.updated = now;
        }

        if let Some(keys) = self.by_task.get(&id) {
            for key in keys {
                if let Some(instance) = self.instances.get_mut(key) {
                    instance.complete = complete;
                }
            }
        }

        debug!(task_id = id, complete, changed, "Set task completion");
        Ok(changed)
    }

    // =========================================================================
    // Instances
    // =========================================================================

    pub fn get_instance(&self, key: &InstanceKey) -> Option<&TaskInstance> {
        self.instances.get(key)
    }

    pub fn instances(&self) -> impl Iterator<Item = &TaskInstance> {
        self.instances.values()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Instances of a task, ordered by file and line.
    pub fn instances_of(&self, id: TaskId) -> Vec<&TaskInstance> {
        self.by_task
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|key| self.instances.get(key))
            .collect()
    }

    /// Instances of a file, ordered by line.
    pub fn instances_in_file(&self, file_path: &str) -> Vec<&TaskInstance> {
        self.by_file
            .get(file_path)
            .into_iter()
            .flatten()
            .filter_map(|&line| self.instances.get(&InstanceKey::new(file_path, line)))
            .collect()
    }

    /// Files that currently hold instances.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.by_file.keys().map(String::as_str)
    }

    /// Remove every instance of a file.
    ///
    /// With `cascade`, tasks left without any instance are deleted as with
    /// [`Store::delete_task`], honouring the configured subtask cascade.
    /// Recompute completion for `ids` from their remaining instances. Tasks left with no
    /// instance keep their state. Returns the ids whose completion flipped.
    pub(crate) fn recheck_completion(
        &mut self,
        ids: &BTreeSet<TaskId>,
        now: DateTime<Utc>,
    ) -> Vec<TaskId> {
        let mut flipped = Vec::new();
        for &id in ids {
            let remaining = self.instances_of(id);
            if remaining.is_empty() {
                continue;
            }
            let any_complete = remaining.iter().any(|instance| instance.complete);
            if let Some(task) = self.tasks.get_mut(&id)
                && task.set_complete(any_complete, now)
            {
                task.updated = now;
                flipped.push(id);
            }
        }
        flipped
    }

    pub fn delete_file(&mut self, file_path: &str, cascade: bool) -> Result<FileRemoval> {
        let lines: Vec<usize> = self
            .by_file
            .get(file_path)
            .map(|lines| lines.iter().copied().collect())
            .unwrap_or_default();

        let mut touched = BTreeSet::new();
        for line in &lines {
            if let Some(removed) = self.remove_instance(&InstanceKey::new(file_path, *line))
                && let Some(id) = removed.task_id
            {
                touched.insert(id);
            }
        }
        self.file_hashes.remove(file_path);
        let now = self.now();
        self.recheck_completion(&touched, now);
        self.relink(&touched);

        let mut deleted_tasks = Vec::new();
        if cascade {
            for id in &touched {
                let unused = self.by_task.get(id).is_none_or(BTreeSet::is_empty);
                if unused && self.tasks.contains_key(id) {
                    deleted_tasks.extend(self.delete_task(*id, self.delete_subtasks)?);
                }
            }
        }

        info!(file = %file_path, instances = lines.len(), deleted = deleted_tasks.len(), "Removed file");
        Ok(FileRemoval {
            instances: lines.len(),
            deleted_tasks,
        })
    }

    /// Move every instance of `old_path` to `new_path`, leaving all other fields untouched.
    /// Instances already stored under `new_path` are dropped first. Returns the number moved.
    pub fn rename_file(&mut self, old_path: &str, new_path: &str) -> usize {
        if old_path == new_path {
            return 0;
        }
        let Some(lines) = self.by_file.remove(old_path) else {
            return 0;
        };

        if self.by_file.contains_key(new_path) {
            warn!(old = %old_path, new = %new_path, "Rename target already has instances; replacing them");
            let stale: Vec<usize> = self.by_file[new_path].iter().copied().collect();
            let mut touched = BTreeSet::new();
            for line in stale {
                if let Some(removed) = self.remove_instance(&InstanceKey::new(new_path, line))
                    && let Some(id) = removed.task_id
                {
                    touched.insert(id);
                }
            }
            self.relink(&touched);
        }

        for &line in &lines {
            let old_key = InstanceKey::new(old_path, line);
            let Some(mut instance) = self.instances.remove(&old_key) else {
                continue;
            };
            instance.file_path = new_path.to_string();
            let new_key = instance.key();
            if let Some(id) = instance.task_id
                && let Some(keys) = self.by_task.get_mut(&id)
            {
                keys.remove(&old_key);
                keys.insert(new_key.clone());
            }
            self.instances.insert(new_key, instance);
        }
        let moved = lines.len();
        self.by_file.insert(new_path.to_string(), lines);

        self.file_hashes.remove(new_path);
        if let Some(hash) = self.file_hashes.remove(old_path) {
            self.file_hashes.insert(new_path.to_string(), hash);
        }

        info!(old = %old_path, new = %new_path, moved, "Renamed file");
        moved
    }

    fn insert_instance(&mut self, instance: TaskInstance) {
        let key = instance.key();
        self.remove_instance(&key);
        self.by_file
            .entry(instance.file_path.clone())
            .or_default()
            .insert(instance.line);
        if let Some(id) = instance.task_id {
            self.by_task.entry(id).or_default().insert(key.clone());
        }
        self.instances.insert(key, instance);
    }

    fn remove_instance(&mut self, key: &InstanceKey) -> Option<TaskInstance> {
        let removed = self.instances.remove(key)?;
        if let Some(lines) = self.by_file.get_mut(&key.file_path) {
            lines.remove(&key.line);
            if lines.is_empty() {
                self.by_file.remove(&key.file_path);
            }
        }
        if let Some(id) = removed.task_id
            && let Some(keys) = self.by_task.get_mut(&id)
        {
            keys.remove(key);
            if keys.is_empty() {
                self.by_task.remove(&id);
            }
        }
        Some(removed)
    }

    /// Recompute `parent_ids` for the given tasks from their instances and mirror the
    /// change into the parents' `child_ids`.
    pub(crate) fn relink(&mut self, touched: &BTreeSet<TaskId>) {
        for &id in touched {
            let parents: BTreeSet<TaskId> = self
                .instances_of(id)
                .iter()
                .filter_map(|instance| instance.parent_task_id)
                .filter(|&parent| parent != id)
                .collect();

            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            if task.parent_ids == parents {
                continue;
            }
            let old = std::mem::replace(&mut task.parent_ids, parents.clone());

            for gone in old.difference(&parents) {
                if let Some(parent) = self.tasks.get_mut(gone) {
                    parent.child_ids.remove(&id);
                }
            }
            for added in parents.difference(&old) {
                if let Some(parent) = self.tasks.get_mut(added) {
                    parent.child_ids.insert(id);
                }
            }
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id_respects_minimum() {
        let mut store = Store::new(100);
        assert_eq!(store.next_id(), 100);
        assert_eq!(store.create_task(NewTask::named("a")).id, 100);
        assert_eq!(store.create_task(NewTask::named("b")).id, 101);

        // explicit ids above the range move the counter
        store.create_task(NewTask {
            id: Some(500),
            ..NewTask::named("c")
        });
        assert_eq!(store.next_id(), 501);
    }

    #[test]
    fn test_next_id_after_max_id_fills_gap() {
        let mut store = Store::new(1);
        store.create_task(NewTask {
            id: Some(u64::MAX),
            ..NewTask::named("far")
        });
        store.create_task(NewTask {
            id: Some(1),
            ..NewTask::named("one")
        });

        assert_eq!(store.next_id(), 2);
        let minted = store.create_task(NewTask::named("new"));
        assert_eq!(minted.id, 2);
        assert_eq!(minted.name, "new");
        assert_eq!(store.get_task(1).unwrap().name, "one");
        assert_eq!(store.next_id(), 3);
    }

    #[test]
    fn test_next_id_below_minimum_ignored() {
        let mut store = Store::new(50);
        store.create_task(NewTask {
            id: Some(3),
            ..NewTask::named("low")
        });
        assert_eq!(store.next_id(), 50);
    }

    #[test]
    fn test_create_task_existing_id_returns_existing() {
        let mut store = Store::new(1);
        let first = store.create_task(NewTask {
            id: Some(7),
            ..NewTask::named("first")
        });
        let again = store.create_task(NewTask {
            id: Some(7),
            ..NewTask::named("second")
        });
        assert_eq!(again, first);
        assert_eq!(store.task_count(), 1);
    }

    #[test]
    fn test_create_task_complete_sets_date() {
        let mut store = Store::new(1);
        let task = store.create_task(NewTask {
            complete: true,
            tags: vec!["a".to_string(), "a".to_string()],
            ..NewTask::named("done")
        });
        assert!(task.complete);
        assert!(task.completed_date.is_some());
        assert_eq!(task.tags, vec!["a"]);
    }

    #[test]
    fn test_delete_missing_task() {
        let mut store = Store::new(1);
        let err = store.delete_task(9, false).unwrap_err();
        assert!(matches!(err, SyncError::TaskNotFound(9)));
    }

    #[test]
    fn test_set_task_complete_round_trip() {
        let mut store = Store::new(1);
        let id = store.create_task(NewTask::named("a")).id;
        assert!(store.set_task_complete(id, true).unwrap());
        assert!(!store.set_task_complete(id, true).unwrap());
        assert!(store.get_task(id).unwrap().completed_date.is_some());
        assert!(store.set_task_complete(id, false).unwrap());
        assert_eq!(store.get_task(id).unwrap().completed_date, None);
        assert!(store.set_task_complete(99, true).is_err());
    }

    #[test]
    fn test_fixed_clock() {
        fn epoch() -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
        let mut store = Store::new(1).with_clock(epoch);
        let task = store.create_task(NewTask::named("a"));
        assert_eq!(task.created, DateTime::<Utc>::UNIX_EPOCH);
    }
}

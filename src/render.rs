//! Text output: checklist lines, front matter and index documents.

use crate::error::Result;
use crate::index::depths;
use crate::record::Recordable;
use crate::types::{Task, TaskId, TaskInstance, encode_id};

/// Spaces per nesting level in rendered documents.
pub const INDENT: &str = "    ";

/// Render an instance as a checklist line indented `depth` levels.
///
/// Links already present in the name are not repeated. Placeholders render as an
/// empty checkbox.
pub fn render_instance_line(instance: &TaskInstance, depth: usize) -> String {
    let mut line = INDENT.repeat(depth);
    line.push_str(if instance.complete { "- [x]" } else { "- [ ]" });

    let Some(id) = instance.task_id else {
        return line;
    };

    line.push(' ');
    line.push_str(&instance.name);
    for link in &instance.links {
        let token = format!("[[{}]]", link);
        if !instance.name.contains(&token) {
            line.push(' ');
            line.push_str(&token);
        }
    }
    line.push_str(&id_token(id));
    line
}

/// ` ^<id>` as appended to a line.
pub fn id_token(id: TaskId) -> String {
    format!(" ^{}", encode_id(id))
}

/// Append an id token to a source line unless it already ends with one for `id`.
pub fn with_id_token(raw_line: &str, id: TaskId) -> String {
    let token = id_token(id);
    let trimmed = raw_line.trim_end();
    if trimmed.ends_with(&token) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, token)
    }
}

/// Render a task's record as a `---` delimited YAML block.
pub fn render_front_matter(task: &Task) -> Result<String> {
    let yaml = serde_yaml::to_string(&task.to_record())?;
    Ok(format!("---\n{}---\n", yaml))
}

/// Render an index document from materialized instances.
pub fn render_index(instances: &[TaskInstance]) -> String {
    let depth = depths(instances);
    let mut out = String::new();
    for instance in instances {
        let d = depth.get(&instance.line).copied().unwrap_or(0);
        out.push_str(&render_instance_line(instance, d));
        out.push('\n');
    }
    out
}

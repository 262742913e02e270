//! Task template parsing.
//!
//! Templates appear both in the system configuration and in per-commit
//! manifests checked into the tracked repository:
//!
//! ```kdl
//! task "devicelab" "flutter_gallery__start_up" flaky=#true timeout=30 {
//!     requires "has-android-device"
//! }
//! ```

use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use tollgate_core::task::TaskTemplate;

use crate::nodes::{bool_prop, child, string_args};
use crate::{ConfigError, ConfigResult};

/// Parse a manifest containing only `task` nodes.
pub fn parse_task_manifest(kdl: &str) -> ConfigResult<Vec<TaskTemplate>> {
    let doc: KdlDocument = kdl.parse()?;
    let tasks = doc
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "task")
        .map(parse_task)
        .collect::<ConfigResult<Vec<_>>>()?;
    ensure_unique(&tasks)?;
    Ok(tasks)
}

pub(crate) fn parse_task(node: &KdlNode) -> ConfigResult<TaskTemplate> {
    let args = string_args(node);
    let (stage_name, name) = match args.as_slice() {
        [stage, name, ..] => (stage.clone(), name.clone()),
        _ => {
            return Err(ConfigError::MissingField(
                "task requires a stage name and a task name".to_string(),
            ));
        }
    };

    let required_capabilities = child(node, "requires").map(string_args).unwrap_or_default();
    if required_capabilities.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "required capabilities for task '{name}'"
        )));
    }

    let timeout_in_minutes = match node.get("timeout") {
        None => 0,
        Some(value) => value
            .as_integer()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: format!("timeout of task '{name}'"),
                message: "expected minutes as a non-negative integer".to_string(),
            })?,
    };

    Ok(TaskTemplate {
        stage_name,
        name,
        required_capabilities,
        flaky: bool_prop(node, "flaky").unwrap_or(false),
        timeout_in_minutes,
    })
}

pub(crate) fn ensure_unique(tasks: &[TaskTemplate]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert((task.stage_name.as_str(), task.name.as_str())) {
            return Err(ConfigError::Duplicate(format!(
                "task '{}' in stage '{}'",
                task.name, task.stage_name
            )));
        }
    }
    Ok(())
}

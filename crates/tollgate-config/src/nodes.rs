//! Helpers for extracting values from KDL nodes.

use kdl::KdlNode;

use crate::{ConfigError, ConfigResult};

pub(crate) fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

pub(crate) fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

/// Child node by name, e.g. `window 20` inside a block.
pub(crate) fn child<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()
        .and_then(|children| children.nodes().iter().find(|c| c.name().value() == name))
}

pub(crate) fn child_string(node: &KdlNode, name: &str) -> Option<String> {
    child(node, name).and_then(first_string_arg)
}

/// Read a non-negative integer child value, rejecting anything that does not fit.
pub(crate) fn child_u64(node: &KdlNode, name: &str) -> ConfigResult<Option<u64>> {
    let Some(entry) = child(node, name).and_then(|c| c.entries().iter().find(|e| e.name().is_none()))
    else {
        return Ok(None);
    };
    let value = entry
        .value()
        .as_integer()
        .ok_or_else(|| ConfigError::InvalidValue {
            field: name.to_string(),
            message: "expected an integer".to_string(),
        })?;
    u64::try_from(value)
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            message: format!("{value} is out of range"),
        })
}

pub(crate) fn child_bool(node: &KdlNode, name: &str) -> Option<bool> {
    child(node, name)
        .and_then(|c| c.entries().iter().find(|e| e.name().is_none()))
        .and_then(|e| e.value().as_bool())
}

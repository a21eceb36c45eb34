//! Command allow-list
//!
//! Shape: `{"<group>": {"commands": {"<subcommand>": {...}}}}`. The value
//! attached to each subcommand is free-form and only its presence matters.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandGroup {
    #[serde(default)]
    pub commands: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct AllowList {
    groups: HashMap<String, CommandGroup>,
}

impl AllowList {
    /// Whether `subcommand` is listed under `group`, as written or with `_` read as `-`
    pub fn is_allowed(&self, group: &str, subcommand: &str) -> bool {
        let Some(group) = self.groups.get(group) else {
            return false;
        };
        group.commands.contains_key(subcommand)
            || group.commands.contains_key(&subcommand.replace('_', "-"))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Payload returned instead of running a denied command
pub fn denial(subcommand: &str) -> Value {
    json!({
        "ok": false,
        "error": format!("Command '{}' is not allowed by policy.", subcommand)
    })
}

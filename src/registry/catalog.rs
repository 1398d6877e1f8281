#![allow(clippy::needless_pass_by_value)]

use schemars::schema_for;
use serde::Serialize;
use serde_json::Value;

use super::{CapabilityCategory, Registry};
use crate::dispatcher::RUN_SCRIPT;
use crate::registry::params::RunScriptParams;

/// A catalog entry: metadata + JSON schema for the params.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub category: CapabilityCategory,
    pub mutates: bool,
    /// `name(a, b, c?)` form, as called from a script.
    pub signature: String,
    pub param_schema: Value,
}

pub(crate) fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub(crate) fn schema_value<T: schemars::JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or(empty_object_schema())
}

pub const RUN_SCRIPT_DESCRIPTION: &str = "Run a short script that composes the other tools with loops, \
conditionals and arithmetic. Tools are called as functions, positionally or with named arguments. \
BEAT_TIMES, NUM_BALLS and SONG_DURATION are predefined. See help(\"script\") for the language.";

/// Every registered capability, in registration order.
pub fn capability_entries(registry: &Registry) -> Vec<CapabilityEntry> {
    registry
        .iter()
        .map(|c| {
            let info = c.info();
            CapabilityEntry {
                name: info.name,
                description: info.description,
                category: info.category,
                mutates: info.mutates,
                signature: c.signature().display(info.name),
                param_schema: c.param_schema().clone(),
            }
        })
        .collect()
}

/// The `tools` array handed to the model: one tool per capability plus
/// `run_script`.
pub fn to_llm_tools(registry: &Registry) -> Value {
    let mut tools: Vec<Value> = registry
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name(),
                "description": c.info().description,
                "input_schema": tool_schema(c.param_schema()),
            })
        })
        .collect();
    tools.push(serde_json::json!({
        "name": RUN_SCRIPT,
        "description": RUN_SCRIPT_DESCRIPTION,
        "input_schema": tool_schema(&schema_value::<RunScriptParams>()),
    }));
    Value::Array(tools)
}

/// Drop the schemars envelope keys providers reject.
fn tool_schema(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

/// Generate JSON Schema formatted tool list (for the HTTP API).
pub fn to_json_schema(registry: &Registry) -> Value {
    let mut tools: Vec<Value> = capability_entries(registry)
        .iter()
        .map(|e| {
            serde_json::json!({
                "name": e.name,
                "description": e.description,
                "category": e.category.slug(),
                "mutates": e.mutates,
                "signature": e.signature,
                "inputSchema": e.param_schema,
            })
        })
        .collect();
    tools.push(serde_json::json!({
        "name": RUN_SCRIPT,
        "description": RUN_SCRIPT_DESCRIPTION,
        "category": "script",
        "mutates": true,
        "signature": "run_script(code)",
        "inputSchema": schema_value::<RunScriptParams>(),
    }));
    Value::Array(tools)
}

/// Help text for tool discovery.
/// Three tiers: no topic → categories, category → tool list, tool → full schema.
/// The `script` topic returns the script language reference.
pub fn help_text(registry: &Registry, topic: Option<&str>) -> String {
    let entries = capability_entries(registry);

    match topic {
        None => {
            let mut lines = vec!["Available tool categories:".to_string()];
            for cat in CapabilityCategory::all() {
                let count = entries.iter().filter(|e| e.category == *cat).count();
                if count > 0 {
                    lines.push(format!("  {} ({count}): {}", cat.slug(), cat.description()));
                }
            }
            lines.push("  script (1): run_script, compose tools in a small scripting language".to_string());
            lines.push(String::new());
            lines.push("Use help(\"edit\") to list tools in a category.".to_string());
            lines.push("Use help(\"create_segment\") for full parameter details.".to_string());
            lines.join("\n")
        }
        Some("script" | RUN_SCRIPT) => super::reference::script_reference(registry),
        Some(topic) => {
            if let Some(entry) = entries.iter().find(|e| e.name == topic) {
                let schema_str = serde_json::to_string_pretty(&entry.param_schema)
                    .unwrap_or_else(|_| "{}".to_string());
                return format!(
                    "{}: {}\nCategory: {} | Mutates: {}\nScript form: {}\n\nParameters:\n{}",
                    entry.name,
                    entry.description,
                    entry.category.slug(),
                    if entry.mutates { "yes" } else { "no" },
                    entry.signature,
                    schema_str,
                );
            }

            let cat_lower = topic.to_lowercase();
            let matching: Vec<&CapabilityEntry> = entries
                .iter()
                .filter(|e| e.category.slug() == cat_lower)
                .collect();

            if matching.is_empty() {
                format!("Unknown topic: \"{topic}\". Use help() to see categories and tools.")
            } else {
                let mut lines = vec![format!("{topic} tools:")];
                for entry in &matching {
                    lines.push(format!("  - {}: {}", entry.signature, entry.description));
                }
                lines.push(String::new());
                lines.push("Use help(\"tool_name\") for parameter details.".to_string());
                lines.join("\n")
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn llm_tools_include_run_script_last() {
        let registry = Registry::standard();
        let tools = to_llm_tools(&registry);
        let tools = tools.as_array().unwrap();
        assert_eq!(tools.len(), registry.len() + 1);
        let last = tools.last().unwrap();
        assert_eq!(last["name"], RUN_SCRIPT);
        assert_eq!(last["input_schema"]["required"], serde_json::json!(["code"]));
        assert!(last["input_schema"].get("$schema").is_none());
    }

    #[test]
    fn help_tiers() {
        let registry = Registry::standard();
        assert!(help_text(&registry, None).contains("edit ("));
        let edit = help_text(&registry, Some("edit"));
        assert!(edit.contains("clear_timeline(timelineIndex)"));
        let tool = help_text(&registry, Some("create_segment"));
        assert!(tool.contains("Mutates: yes"));
        assert!(tool.contains("\"timelineIndex\""));
        assert!(help_text(&registry, Some("nope")).starts_with("Unknown topic"));
    }
}

//! Session settings synced through `workspace/didChangeConfiguration`.
//!
//! Settings arrive as arbitrary JSON and are deep-merged over the current
//! values, so a client can update a single nested field without resending
//! the whole object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Formatting options forwarded to the engine's code-fix computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatCodeSettings {
    pub tab_size: u32,
    pub indent_size: u32,
    pub new_line_character: String,
    pub convert_tabs_to_spaces: bool,
    pub insert_space_after_comma_delimiter: bool,
    pub insert_space_after_semicolon_in_for_statements: bool,
    pub insert_space_before_and_after_binary_operators: bool,
    pub insert_space_after_keywords_in_control_flow_statements: bool,
    pub insert_space_after_function_keyword_for_anonymous_functions: bool,
    pub insert_space_after_opening_and_before_closing_nonempty_parenthesis: bool,
    pub insert_space_after_opening_and_before_closing_nonempty_brackets: bool,
    pub insert_space_after_opening_and_before_closing_template_string_braces: bool,
    pub insert_space_before_function_parenthesis: bool,
    pub place_open_brace_on_new_line_for_functions: bool,
    pub place_open_brace_on_new_line_for_control_blocks: bool,
}

impl Default for FormatCodeSettings {
    fn default() -> Self {
        FormatCodeSettings {
            tab_size: 4,
            indent_size: 4,
            new_line_character: "\n".to_string(),
            convert_tabs_to_spaces: false,
            insert_space_after_comma_delimiter: true,
            insert_space_after_semicolon_in_for_statements: true,
            insert_space_before_and_after_binary_operators: true,
            insert_space_after_keywords_in_control_flow_statements: true,
            insert_space_after_function_keyword_for_anonymous_functions: true,
            insert_space_after_opening_and_before_closing_nonempty_parenthesis: false,
            insert_space_after_opening_and_before_closing_nonempty_brackets: false,
            insert_space_after_opening_and_before_closing_template_string_braces: false,
            insert_space_before_function_parenthesis: false,
            place_open_brace_on_new_line_for_functions: false,
            place_open_brace_on_new_line_for_control_blocks: false,
        }
    }
}

/// All session settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub format: FormatCodeSettings,
}

/// Deep-merge `update` into `settings`. Unknown fields in the update are
/// ignored; a malformed update leaves the settings untouched.
pub fn merge_settings(settings: &mut Settings, update: &Value) {
    let mut current = match serde_json::to_value(&*settings) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "settings did not serialize; skipping merge");
            return;
        }
    };
    deep_merge(&mut current, update);
    match serde_json::from_value(current) {
        Ok(merged) => *settings = merged,
        Err(err) => warn!(%err, "merged settings did not deserialize; keeping previous values"),
    }
}

fn deep_merge(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, update_value) in update_map {
                match target_map.get_mut(key) {
                    Some(target_value) => deep_merge(target_value, update_value),
                    None => {
                        target_map.insert(key.clone(), update_value.clone());
                    }
                }
            }
        }
        (target, update) => *target = update.clone(),
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_updates_single_nested_field() {
        let mut settings = Settings::default();
        merge_settings(&mut settings, &json!({"format": {"tabSize": 2}}));
        assert_eq!(settings.format.tab_size, 2);
        // Untouched fields keep their values
        assert_eq!(settings.format.indent_size, 4);
        assert!(settings.format.insert_space_after_comma_delimiter);
    }

    #[test]
    fn test_merge_ignores_unknown_fields() {
        let mut settings = Settings::default();
        merge_settings(&mut settings, &json!({"somePluginSetting": true}));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_malformed_update_keeps_previous_values() {
        let mut settings = Settings::default();
        merge_settings(&mut settings, &json!({"format": {"tabSize": "not a number"}}));
        assert_eq!(settings.format.tab_size, 4);
    }
}

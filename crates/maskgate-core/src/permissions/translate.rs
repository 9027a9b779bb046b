//! Message formatting for user-facing permission errors.

use std::collections::HashMap;

/// Token malformed (`%permission%`).
pub const BAD_FORMAT: &str = "maskgate.permissions.badformat";
/// Permission not registered (`%permission%`).
pub const NOT_FOUND: &str = "maskgate.permissions.notfound";
/// Unknown combination mode (`%mode%`).
pub const MODE_NOT_FOUND: &str = "maskgate.permissions.mode.notfound";

/// Formats a message key with `%name%` placeholders.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String;
}

/// Built-in English messages. Additional keys can be layered on top.
#[derive(Debug, Clone)]
pub struct DefaultMessages {
    messages: HashMap<String, String>,
}

impl Default for DefaultMessages {
    fn default() -> Self {
        let messages = [
            (
                BAD_FORMAT,
                "%permission% is not formatted correctly, expected bundle:group:level",
            ),
            (NOT_FOUND, "%permission% is not a recognized permission"),
            (MODE_NOT_FOUND, "%mode% is not a valid permission mode"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { messages }
    }
}

impl DefaultMessages {
    /// Override or add a message template.
    #[must_use]
    pub fn with_message(mut self, key: &str, template: &str) -> Self {
        self.messages.insert(key.to_string(), template.to_string());
        self
    }
}

impl Translator for DefaultMessages {
    fn translate(&self, key: &str, params: &[(&str, &str)]) -> String {
        let Some(template) = self.messages.get(key) else {
            return key.to_string();
        };
        params
            .iter()
            .fold(template.clone(), |message, (name, value)| {
                message.replace(&format!("%{name}%"), value)
            })
    }
}

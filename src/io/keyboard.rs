//! Keyboard state.

use std::collections::HashSet;

use serde::Deserialize;

/// Raw key event from the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    /// Host key identifier ("a", " ", "ArrowLeft", ...).
    pub key: String,
    pub is_down: bool,
}

/// Map a host key identifier to the name blocks use.
pub fn scratch_key_name(key: &str) -> String {
    match key {
        " " | "Space" => "space".to_string(),
        "ArrowLeft" | "Left" => "left arrow".to_string(),
        "ArrowRight" | "Right" => "right arrow".to_string(),
        "ArrowUp" | "Up" => "up arrow".to_string(),
        "ArrowDown" | "Down" => "down arrow".to_string(),
        "Enter" => "enter".to_string(),
        other if other.chars().count() == 1 => other.to_lowercase(),
        other => other.to_string(),
    }
}

/// Currently held keys.
#[derive(Debug, Default)]
pub struct Keyboard {
    pressed: HashSet<String>,
}

impl Keyboard {
    /// Apply an event. Returns the key name when a key goes down.
    pub fn post_data(
        &mut self,
        event: KeyEvent,
    ) -> Option<String> {
        let name = scratch_key_name(&event.key);
        if event.is_down {
            self.pressed.insert(name.clone());
            Some(name)
        } else {
            self.pressed.remove(&name);
            None
        }
    }

    /// Whether `key` is held; "any" matches any key.
    pub fn is_key_pressed(
        &self,
        key: &str,
    ) -> bool {
        if key == "any" {
            return !self.pressed.is_empty();
        }
        self.pressed.contains(&scratch_key_name(key))
    }
}

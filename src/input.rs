use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{Key, NamedKey};

/// Keyboard state for the controlled character: which actions are held, plus remappable bindings.
pub struct Input {
    bindings: InputBindings,
    held: HashMap<InputAction, bool>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        Self::with_bindings(InputBindings::load_or_default(path))
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self { bindings, held: HashMap::new() }
    }

    /// Applies a key event and returns the actions it changed, with their new pressed state.
    /// Keys bound to nothing produce no actions.
    pub fn push(&mut self, ev: &InputEvent) -> Vec<(InputAction, bool)> {
        let InputEvent::Key { key, pressed } = ev else {
            return Vec::new();
        };
        let Some(binding_key) = InputKeyBinding::from_event_key(key) else {
            return Vec::new();
        };
        let actions: Vec<_> = self.bindings.actions_for_key(&binding_key).collect();
        let mut changed = Vec::with_capacity(actions.len());
        for action in actions {
            let previous = self.held.insert(action, *pressed).unwrap_or(false);
            // Key repeat re-sends presses; only forward edges, except for directions which re-apply.
            if previous != *pressed || (*pressed && action.is_direction()) {
                changed.push((action, *pressed));
            }
        }
        changed
    }

    pub fn held(&self, action: InputAction) -> bool {
        self.held.get(&action).copied().unwrap_or(false)
    }

    pub fn movement_held(&self) -> bool {
        InputAction::DIRECTIONS.iter().any(|action| self.held(*action))
    }

    pub fn boost_held(&self) -> bool {
        self.held(InputAction::Boost)
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config, &path.display().to_string()),
                Err(err) => {
                    warn!(target: "input", "Failed to parse {}: {err}. Falling back to default bindings.", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                warn!(target: "input", "Failed to read {}: {err}. Falling back to default bindings.", path.display());
                Self::default()
            }
        }
    }

    fn from_config(config: InputConfigFile, origin: &str) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in config.into_overrides(origin) {
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<InputKeyBinding>> {
        use InputAction::*;
        let mut map = HashMap::new();
        map.insert(MoveForward, vec![InputKeyBinding::character("w")]);
        map.insert(MoveBackward, vec![InputKeyBinding::character("s")]);
        map.insert(MoveLeft, vec![InputKeyBinding::character("a")]);
        map.insert(MoveRight, vec![InputKeyBinding::character("d")]);
        map.insert(Reset, vec![InputKeyBinding::Named(NamedKeyCode::Space)]);
        map.insert(Boost, vec![InputKeyBinding::Named(NamedKeyCode::Shift)]);
        map
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &InputKeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl InputKeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) if !ch.is_empty() => Some(Self::Character(ch.to_lowercase())),
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        (normalized.chars().count() == 1).then_some(Self::Character(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    Space,
    Shift,
    Enter,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Space => Some(Self::Space),
            NamedKey::Shift => Some(Self::Shift),
            NamedKey::Enter => Some(Self::Enter),
            NamedKey::ArrowUp => Some(Self::ArrowUp),
            NamedKey::ArrowDown => Some(Self::ArrowDown),
            NamedKey::ArrowLeft => Some(Self::ArrowLeft),
            NamedKey::ArrowRight => Some(Self::ArrowRight),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "space" => Some(Self::Space),
            "shift" | "left_shift" | "right_shift" => Some(Self::Shift),
            "enter" | "return" => Some(Self::Enter),
            "up" | "arrow_up" => Some(Self::ArrowUp),
            "down" | "arrow_down" => Some(Self::ArrowDown),
            "left" | "arrow_left" => Some(Self::ArrowLeft),
            "right" | "arrow_right" => Some(Self::ArrowRight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    Reset,
    Boost,
}

impl InputAction {
    pub const DIRECTIONS: [InputAction; 4] =
        [InputAction::MoveForward, InputAction::MoveBackward, InputAction::MoveLeft, InputAction::MoveRight];

    pub fn is_direction(self) -> bool {
        Self::DIRECTIONS.contains(&self)
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "move_forward" => Some(Self::MoveForward),
            "move_backward" => Some(Self::MoveBackward),
            "move_left" => Some(Self::MoveLeft),
            "move_right" => Some(Self::MoveRight),
            "reset" => Some(Self::Reset),
            "boost" => Some(Self::Boost),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<InputKeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let Some(action) = InputAction::from_str(&action_name.trim().to_lowercase()) else {
                warn!(target: "input", "{origin}: unknown action '{action_name}', ignoring.");
                continue;
            };
            let mut parsed = Vec::new();
            for key in keys {
                match InputKeyBinding::from_config_value(&key) {
                    Some(binding) => parsed.push(binding),
                    None => warn!(target: "input", "{origin}: unknown key '{key}' for action '{action_name}', ignoring."),
                }
            }
            if parsed.is_empty() {
                warn!(target: "input", "{origin}: action '{action_name}' has no valid keys, keeping defaults.");
                continue;
            }
            overrides.insert(action, parsed);
        }
        overrides
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key { key: Key, pressed: bool },
    Resize { width: u32, height: u32 },
    Other,
}

impl InputEvent {
    pub fn key(key: Key, pressed: bool) -> Self {
        InputEvent::Key { key, pressed }
    }

    pub fn character(ch: &str, pressed: bool) -> Self {
        InputEvent::Key { key: Key::Character(ch.into()), pressed }
    }

    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::KeyboardInput { event, .. } => InputEvent::Key {
                key: event.logical_key.clone(),
                pressed: event.state == ElementState::Pressed,
            },
            WindowEvent::Resized(size) => InputEvent::Resize { width: size.width, height: size.height },
            _ => InputEvent::Other,
        }
    }
}

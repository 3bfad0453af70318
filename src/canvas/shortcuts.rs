use serde::{Deserialize, Serialize};

use crate::domain::task::{Priority, TaskStatus};

/// Keys the canvas reacts to. Anything else arrives as `Other` and is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Digit(u8),
    Delete,
    Backspace,
    Escape,
    Equals,
    Plus,
    Minus,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyModifiers {
    pub shift: bool,
    pub ctrl: bool,
    /// Cmd on macOS.
    pub meta: bool,
    pub alt: bool,
}

impl KeyModifiers {
    pub const NONE: KeyModifiers = KeyModifiers {
        shift: false,
        ctrl: false,
        meta: false,
        alt: false,
    };

    pub fn command() -> Self {
        Self { ctrl: true, ..Self::NONE }
    }

    pub fn shift() -> Self {
        Self { shift: true, ..Self::NONE }
    }

    /// Ctrl on Linux/Windows, Cmd on macOS.
    pub fn is_command(&self) -> bool {
        self.ctrl || self.meta
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShortcutAction {
    Undo,
    Redo,
    ZoomIn,
    ZoomOut,
    FitToView,
    DeleteSelection,
    /// Cancel the active gesture, or clear the selection when idle.
    Cancel,
    SetStatus(TaskStatus),
    SetPriority(Priority),
}

impl ShortcutAction {
    /// Actions that change tasks, connections or history.
    pub fn edits_canvas(self) -> bool {
        !matches!(
            self,
            ShortcutAction::ZoomIn | ShortcutAction::ZoomOut | ShortcutAction::FitToView | ShortcutAction::Cancel
        )
    }
}

fn status_for_digit(digit: u8) -> Option<TaskStatus> {
    TaskStatus::ALL.get(usize::from(digit).checked_sub(1)?).copied()
}

fn priority_for_digit(digit: u8) -> Option<Priority> {
    Priority::ALL.get(usize::from(digit).checked_sub(1)?).copied()
}

/// Map a key press to a canvas action. Task shortcuts (delete, status,
/// priority) only fire when something is selected.
pub fn resolve(key: Key, modifiers: KeyModifiers, has_selection: bool) -> Option<ShortcutAction> {
    let key = match key {
        Key::Char(c) => Key::Char(c.to_ascii_lowercase()),
        other => other,
    };

    match (key, modifiers) {
        (Key::Char('z'), m) if m.is_command() && m.shift => Some(ShortcutAction::Redo),
        (Key::Char('z'), m) if m.is_command() => Some(ShortcutAction::Undo),
        (Key::Char('y'), m) if m.is_command() => Some(ShortcutAction::Redo),
        (Key::Equals | Key::Plus, m) if m.is_command() => Some(ShortcutAction::ZoomIn),
        (Key::Minus, m) if m.is_command() => Some(ShortcutAction::ZoomOut),
        (Key::Digit(0), m) if m.is_command() => Some(ShortcutAction::FitToView),
        (Key::Escape, _) => Some(ShortcutAction::Cancel),
        _ if !has_selection || modifiers.is_command() || modifiers.alt => None,
        (Key::Delete | Key::Backspace, _) => Some(ShortcutAction::DeleteSelection),
        (Key::Digit(d), m) if m.shift => priority_for_digit(d).map(ShortcutAction::SetPriority),
        (Key::Digit(d), _) => status_for_digit(d).map(ShortcutAction::SetStatus),
        _ => None,
    }
}

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::search::natural_cmp;

pub const TIS_TYPE_KEYBOARD_LAYOUT: &str = "TISTypeKeyboardLayout";
pub const TIS_TYPE_KEYBOARD_INPUT_MODE: &str = "TISTypeKeyboardInputMode";

/// A keyboard input source the user can switch to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSource {
    pub id: String,
    pub name: String,
}

impl InputSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    KeyboardLayout,
    KeyboardInputMode,
    Other(String),
}

impl SourceKind {
    pub fn from_tis_type(kind: &str) -> Self {
        match kind {
            TIS_TYPE_KEYBOARD_LAYOUT => SourceKind::KeyboardLayout,
            TIS_TYPE_KEYBOARD_INPUT_MODE => SourceKind::KeyboardInputMode,
            other => SourceKind::Other(other.to_string()),
        }
    }

    pub fn is_keyboard(&self) -> bool {
        matches!(
            self,
            SourceKind::KeyboardLayout | SourceKind::KeyboardInputMode
        )
    }
}

/// Raw properties of one entry returned by Text Input Source Services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProperties {
    pub id: String,
    pub kind: SourceKind,
    pub name: String,
    pub selectable: bool,
    pub enabled: bool,
}

/// Keeps the enabled, select-capable keyboard sources, sorted by name.
pub fn keyboard_sources(properties: impl IntoIterator<Item = SourceProperties>) -> Vec<InputSource> {
    let mut sources: Vec<InputSource> = properties
        .into_iter()
        .filter(|p| p.kind.is_keyboard() && p.selectable && p.enabled)
        .map(|p| InputSource::new(p.id, p.name))
        .collect();
    sources.sort_by(|a, b| natural_cmp(&a.name, &b.name));
    sources
}

/// Access to the platform's text input services and the frontmost application.
pub trait TextInputServices {
    /// Enabled keyboard input sources, sorted by name.
    fn input_sources(&self) -> Result<Vec<InputSource>>;

    fn current_source_id(&self) -> Result<String>;

    fn select_source(&self, id: &str) -> Result<()>;

    /// Bundle identifier of the frontmost application, if it has one.
    fn frontmost_bundle_id(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(id: &str, kind: &str, name: &str, selectable: bool, enabled: bool) -> SourceProperties {
        SourceProperties {
            id: id.to_string(),
            kind: SourceKind::from_tis_type(kind),
            name: name.to_string(),
            selectable,
            enabled,
        }
    }

    #[test]
    fn keeps_only_enabled_selectable_keyboard_sources() {
        let all = vec![
            props("com.apple.keylayout.US", TIS_TYPE_KEYBOARD_LAYOUT, "U.S.", true, true),
            props(
                "com.apple.inputmethod.Kotoeri.RomajiTyping.Japanese",
                TIS_TYPE_KEYBOARD_INPUT_MODE,
                "Hiragana",
                true,
                true,
            ),
            props("com.apple.keylayout.Russian", TIS_TYPE_KEYBOARD_LAYOUT, "Russian", true, false),
            props("com.apple.inputmethod.Kotoeri", "TISTypeKeyboardInputMethodModeEnabled", "Japanese", true, true),
            props("com.apple.CharacterPaletteIM", "TISTypeCharacterPalette", "Emoji", true, true),
            props("com.apple.keylayout.ABC", TIS_TYPE_KEYBOARD_LAYOUT, "ABC", false, true),
        ];

        let sources = keyboard_sources(all);
        assert_eq!(
            sources,
            vec![
                InputSource::new("com.apple.inputmethod.Kotoeri.RomajiTyping.Japanese", "Hiragana"),
                InputSource::new("com.apple.keylayout.US", "U.S."),
            ]
        );
    }

    #[test]
    fn sorts_by_natural_name_order() {
        let all = vec![
            props("b", TIS_TYPE_KEYBOARD_LAYOUT, "layout 10", true, true),
            props("a", TIS_TYPE_KEYBOARD_LAYOUT, "Layout 9", true, true),
            props("c", TIS_TYPE_KEYBOARD_LAYOUT, "ABC", true, true),
        ];
        let ids: Vec<_> = keyboard_sources(all).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn unknown_types_are_not_keyboard_sources() {
        assert!(!SourceKind::from_tis_type("TISTypeInk").is_keyboard());
        assert!(SourceKind::from_tis_type(TIS_TYPE_KEYBOARD_INPUT_MODE).is_keyboard());
    }
}

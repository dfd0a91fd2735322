//! Rendering-neutral control surfaces.
//!
//! The provider turns a [`SurfaceContent`] into whatever its transport
//! shows (an embed with buttons, a select menu). Styling and localization are
//! the provider's business; this module only decides which components exist,
//! what they mean, and whether they are enabled.

use crate::models::{RoomSettings, Toggle};
use serde::{Deserialize, Serialize};

/// Every owner action the control panel offers.
///
/// Closed on purpose: adding an action means adding a variant here, and the
/// exhaustive dispatch in [`crate::flows::step_for`] then refuses to compile
/// until the new action has a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Rename,
    ToggleSoundboard,
    ToggleStreams,
    ToggleActivities,
    TogglePrivacy,
    EditAccess,
    SetRetainedMessages,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Rename,
        ActionKind::ToggleSoundboard,
        ActionKind::ToggleStreams,
        ActionKind::ToggleActivities,
        ActionKind::TogglePrivacy,
        ActionKind::EditAccess,
        ActionKind::SetRetainedMessages,
    ];

    /// The toggle this action flips, if it is a toggle.
    #[must_use]
    pub fn toggle(self) -> Option<Toggle> {
        match self {
            ActionKind::ToggleSoundboard => Some(Toggle::Soundboard),
            ActionKind::ToggleStreams => Some(Toggle::Streams),
            ActionKind::ToggleActivities => Some(Toggle::Activities),
            ActionKind::TogglePrivacy => Some(Toggle::Privacy),
            ActionKind::Rename | ActionKind::EditAccess | ActionKind::SetRetainedMessages => None,
        }
    }
}

/// Identifies a component across the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ComponentId {
    Action(ActionKind),
    /// Two-button confirmation: `true` is "yes".
    Confirm(bool),
    MemberSelect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentKind {
    Button,
    MemberSelect { max_values: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub label: String,
    pub kind: ComponentKind,
    pub disabled: bool,
}

impl Component {
    fn button(id: ComponentId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            kind: ComponentKind::Button,
            disabled: false,
        }
    }
}

/// What a surface shows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SurfaceContent {
    pub title: String,
    pub lines: Vec<String>,
    pub components: Vec<Component>,
}

impl SurfaceContent {
    /// Plain text with no components.
    #[must_use]
    pub fn notice(title: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: vec![line.into()],
            components: Vec::new(),
        }
    }

    /// Copy with every component disabled.
    #[must_use]
    pub fn disabled(&self) -> Self {
        let mut content = self.clone();
        for component in &mut content.components {
            component.disabled = true;
        }
        content
    }

    #[must_use]
    pub fn has_enabled_components(&self) -> bool {
        self.components.iter().any(|c| !c.disabled)
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// The room's control panel.
#[must_use]
pub fn control_panel(room_name: &str, settings: &RoomSettings, retained: u32) -> SurfaceContent {
    let mut lines = vec![format!("Room: {room_name}")];
    for toggle in Toggle::ALL {
        lines.push(format!("{}: {}", toggle.label(), on_off(settings.get(toggle))));
    }
    lines.push(format!("Retained messages: {retained}"));

    let components = ActionKind::ALL
        .iter()
        .map(|action| {
            let label = match action {
                ActionKind::Rename => "Rename",
                ActionKind::ToggleSoundboard => "Soundboard",
                ActionKind::ToggleStreams => "Streams",
                ActionKind::ToggleActivities => "Activities",
                ActionKind::TogglePrivacy => {
                    if settings.is_private {
                        "Make public"
                    } else {
                        "Make private"
                    }
                }
                ActionKind::EditAccess => {
                    if settings.is_private {
                        "Edit whitelist"
                    } else {
                        "Edit blacklist"
                    }
                }
                ActionKind::SetRetainedMessages => "Retained messages",
            };
            Component::button(ComponentId::Action(*action), label)
        })
        .collect();

    SurfaceContent {
        title: "Room controls".to_string(),
        lines,
        components,
    }
}

/// "Keep this as your default?" with yes/no buttons.
#[must_use]
pub fn save_default_prompt(change: &str) -> SurfaceContent {
    SurfaceContent {
        title: "Save as default?".to_string(),
        lines: vec![
            change.to_string(),
            "Keep this for your future rooms too?".to_string(),
        ],
        components: vec![
            Component::button(ComponentId::Confirm(true), "Yes"),
            Component::button(ComponentId::Confirm(false), "Only this room"),
        ],
    }
}

/// Member picker for access-list editing.
#[must_use]
pub fn member_select_prompt(is_private: bool, max_values: usize) -> SurfaceContent {
    let line = if is_private {
        "Pick members to add to or remove from the whitelist."
    } else {
        "Pick members to add to or remove from the blacklist."
    };
    SurfaceContent {
        title: "Edit access".to_string(),
        lines: vec![line.to_string()],
        components: vec![Component {
            id: ComponentId::MemberSelect,
            label: "Members".to_string(),
            kind: ComponentKind::MemberSelect { max_values },
            disabled: false,
        }],
    }
}

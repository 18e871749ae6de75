use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    ContactPicker,
    TimePicker,
    InviteEditor,
    MeetingConfirmed,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactPicker => "contact_picker",
            Self::TimePicker => "time_picker",
            Self::InviteEditor => "invite_editor",
            Self::MeetingConfirmed => "meeting_confirmed",
        }
    }

    /// Whether the widget waits for a user action when shown.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, Self::MeetingConfirmed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetState {
    Pending,
    Locked,
    Terminal,
}

impl WidgetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Locked => "locked",
            Self::Terminal => "terminal",
        }
    }
}

/// A renderable payload attached to a thread item. The payload is opaque to
/// the orchestration layer; only kind and state drive transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub kind: WidgetKind,
    pub state: WidgetState,
    pub payload: Value,
}

impl Widget {
    pub fn pending(kind: WidgetKind, payload: Value) -> Self {
        Self { kind, state: WidgetState::Pending, payload }
    }

    pub fn awaits_action(&self) -> bool {
        self.kind.is_interactive() && self.state == WidgetState::Pending
    }
}

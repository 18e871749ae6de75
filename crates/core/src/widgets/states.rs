use serde::{Deserialize, Serialize};

use crate::domain::widget::{WidgetKind, WidgetState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WidgetEvent {
    /// An action arrived for the widget; it becomes read-only.
    Lock,
    /// A booking was committed from the widget; it becomes a confirmation.
    Finalize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub kind: WidgetKind,
    pub from: WidgetState,
    pub to: WidgetState,
    pub event: WidgetEvent,
    /// Kind of the replacement widget. Only finalization changes it.
    pub next_kind: WidgetKind,
}

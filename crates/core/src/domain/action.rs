use serde::{Deserialize, Serialize};

use crate::domain::booking::InviteFields;
use crate::domain::contact::ContactId;
use crate::domain::widget::WidgetKind;
use crate::errors::DomainError;

/// The closed set of UI actions the scheduler understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    ConfirmContacts,
    PickSlot,
    RequestRevision,
    SendInvite,
}

impl ActionType {
    pub const ALL: [ActionType; 4] =
        [Self::ConfirmContacts, Self::PickSlot, Self::RequestRevision, Self::SendInvite];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmContacts => "contacts.confirm",
            Self::PickSlot => "schedule.pick_slot",
            Self::RequestRevision => "invite.request_revision",
            Self::SendInvite => "invite.send",
        }
    }

    /// Whether a widget of `kind` can originate this action.
    pub fn accepts_sender(&self, kind: WidgetKind) -> bool {
        match self {
            Self::ConfirmContacts => kind == WidgetKind::ContactPicker,
            Self::PickSlot => kind == WidgetKind::TimePicker,
            Self::RequestRevision => kind == WidgetKind::InviteEditor,
            Self::SendInvite => {
                matches!(kind, WidgetKind::InviteEditor | WidgetKind::MeetingConfirmed)
            }
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action_type| action_type.as_str() == value)
            .ok_or_else(|| DomainError::UnsupportedAction(value.to_owned()))
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded action in canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    ConfirmContacts { contact_ids: Vec<ContactId> },
    PickSlot { slot_id: String, label: Option<String> },
    RequestRevision,
    SendInvite(InviteFields),
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::ConfirmContacts { .. } => ActionType::ConfirmContacts,
            Self::PickSlot { .. } => ActionType::PickSlot,
            Self::RequestRevision => ActionType::RequestRevision,
            Self::SendInvite(_) => ActionType::SendInvite,
        }
    }
}

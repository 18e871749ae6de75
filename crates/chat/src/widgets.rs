use meetbook_core::{
    AvailabilitySlot, BookedEvent, Contact, ContactId, DraftInvite, Widget, WidgetKind,
    WidgetState,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const AVATAR_FALLBACK_BASE: &str = "https://i.pravatar.cc/162?u=";

#[derive(Debug, Error)]
pub enum WidgetPayloadError {
    #[error("failed to encode {kind} payload: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} payload is not a JSON object")]
    NotAnObject { kind: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactCard {
    pub id: String,
    pub name: String,
    pub role: String,
    pub avatar_url: String,
}

impl From<&Contact> for ContactCard {
    fn from(contact: &Contact) -> Self {
        let avatar_url = contact
            .avatar_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| format!("{AVATAR_FALLBACK_BASE}{}", contact.id));
        Self {
            id: contact.id.0.clone(),
            name: contact.name.clone(),
            role: contact.role.clone(),
            avatar_url,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPickerPayload {
    pub contacts: Vec<ContactCard>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePickerPayload {
    pub slots: Vec<AvailabilitySlot>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_slot_id: Option<String>,
}

impl TimePickerPayload {
    pub fn from_widget(widget: &Widget) -> Option<Self> {
        if widget.kind != WidgetKind::TimePicker {
            return None;
        }
        serde_json::from_value(widget.payload.clone()).ok()
    }

    pub fn label_for(&self, slot_id: &str) -> Option<&str> {
        self.slots.iter().find(|slot| slot.id == slot_id).map(|slot| slot.label.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteEditorPayload {
    pub subject: String,
    pub agenda: String,
    pub location: String,
    pub attendees: String,
    pub time_str: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
}

impl From<&DraftInvite> for InviteEditorPayload {
    fn from(draft: &DraftInvite) -> Self {
        Self {
            subject: draft.subject.clone(),
            agenda: draft.agenda.clone(),
            location: draft.location.clone(),
            attendees: draft.attendees.clone(),
            time_str: draft.time.clone(),
            locked: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingConfirmedPayload {
    pub booking_id: String,
    pub subject: String,
    pub time_str: String,
    pub location: String,
    pub attendees: String,
}

/// What the user picked on a widget, recorded on the locked payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection<'a> {
    Contacts(&'a [ContactId]),
    Slot(&'a str),
    Nothing,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn encode<T: Serialize>(kind: WidgetKind, payload: &T) -> Result<Value, WidgetPayloadError> {
    serde_json::to_value(payload)
        .map_err(|source| WidgetPayloadError::Encode { kind: kind.as_str(), source })
}

pub fn contact_picker(contacts: &[Contact]) -> Result<Widget, WidgetPayloadError> {
    let payload = ContactPickerPayload {
        contacts: contacts.iter().map(ContactCard::from).collect(),
        ..ContactPickerPayload::default()
    };
    Ok(Widget::pending(WidgetKind::ContactPicker, encode(WidgetKind::ContactPicker, &payload)?))
}

pub fn time_picker(slots: &[AvailabilitySlot]) -> Result<Widget, WidgetPayloadError> {
    let payload = TimePickerPayload { slots: slots.to_vec(), ..TimePickerPayload::default() };
    Ok(Widget::pending(WidgetKind::TimePicker, encode(WidgetKind::TimePicker, &payload)?))
}

pub fn invite_editor(draft: &DraftInvite) -> Result<Widget, WidgetPayloadError> {
    let payload = InviteEditorPayload::from(draft);
    Ok(Widget::pending(WidgetKind::InviteEditor, encode(WidgetKind::InviteEditor, &payload)?))
}

pub fn meeting_confirmed(booking: &BookedEvent) -> Result<Widget, WidgetPayloadError> {
    let payload = MeetingConfirmedPayload {
        booking_id: booking.id.0.clone(),
        subject: booking.subject.clone(),
        time_str: booking.start_time.clone(),
        location: booking.location.clone(),
        attendees: booking.attendees.clone(),
    };
    Ok(Widget {
        kind: WidgetKind::MeetingConfirmed,
        state: WidgetState::Terminal,
        payload: encode(WidgetKind::MeetingConfirmed, &payload)?,
    })
}

/// Read-only copy of `widget`: same kind and payload, flagged locked, with the
/// user's selection folded in.
pub fn locked(widget: &Widget, selection: Selection<'_>) -> Result<Widget, WidgetPayloadError> {
    let mut payload = widget.payload.clone();
    let fields = payload
        .as_object_mut()
        .ok_or(WidgetPayloadError::NotAnObject { kind: widget.kind.as_str() })?;

    fields.insert("locked".to_owned(), Value::Bool(true));
    match selection {
        Selection::Contacts(ids) => {
            fields.insert(
                "selected_ids".to_owned(),
                Value::Array(ids.iter().map(|id| Value::String(id.0.clone())).collect()),
            );
        }
        Selection::Slot(slot_id) => {
            fields.insert("selected_slot_id".to_owned(), Value::String(slot_id.to_owned()));
        }
        Selection::Nothing => {}
    }

    Ok(Widget { kind: widget.kind, state: WidgetState::Locked, payload })
}

/// One-line account of a widget for the decision policy's transcript.
pub fn describe(widget: &Widget) -> String {
    let state = widget.state.as_str();
    match widget.kind {
        WidgetKind::ContactPicker => {
            let payload: ContactPickerPayload =
                serde_json::from_value(widget.payload.clone()).unwrap_or_default();
            let names = payload
                .contacts
                .iter()
                .map(|card| format!("{} ({})", card.name, card.id))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[Displayed contact picker ({state}) with: {names}]")
        }
        WidgetKind::TimePicker => {
            let payload: TimePickerPayload =
                serde_json::from_value(widget.payload.clone()).unwrap_or_default();
            let slots = payload
                .slots
                .iter()
                .map(|slot| format!("{} = {}", slot.id, slot.label))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[Displayed time picker ({state}) with slots: {slots}]")
        }
        WidgetKind::InviteEditor => {
            let subject = widget.payload.get("subject").and_then(Value::as_str).unwrap_or("");
            let time = widget.payload.get("time_str").and_then(Value::as_str).unwrap_or("");
            format!("[Displayed invite editor ({state}) for '{subject}' at {time}]")
        }
        WidgetKind::MeetingConfirmed => {
            let subject = widget.payload.get("subject").and_then(Value::as_str).unwrap_or("");
            let time = widget.payload.get("time_str").and_then(Value::as_str).unwrap_or("");
            format!("[Meeting confirmed: '{subject}' at {time}]")
        }
    }
}

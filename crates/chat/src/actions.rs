use std::collections::BTreeSet;

use meetbook_core::{Action, ActionType, ContactId, DomainError, InviteFields, ItemId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound action as received from the chat surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl ActionEnvelope {
    pub fn new(action_type: impl Into<String>, payload: Value, sender: Option<&ItemId>) -> Self {
        let payload = match payload {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        Self {
            action_type: action_type.into(),
            payload,
            sender: sender.map(|id| id.0.clone()),
        }
    }
}

/// A decoded envelope: canonical action, resolved sender, normalized payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionRequest {
    pub action: Action,
    pub sender: Option<ItemId>,
    pub payload: Map<String, Value>,
}

impl ActionRequest {
    pub fn action_type(&self) -> ActionType {
        self.action.action_type()
    }
}

pub fn decode(envelope: &ActionEnvelope) -> Result<ActionRequest, DomainError> {
    let action_type = envelope.action_type.trim().parse::<ActionType>()?;
    let payload = normalize_payload(&envelope.payload);

    let action = match action_type {
        ActionType::ConfirmContacts => {
            Action::ConfirmContacts { contact_ids: selected_contact_ids(&payload) }
        }
        ActionType::PickSlot => {
            let slot_id = text_field(&payload, &["slot_id"]).ok_or_else(|| {
                DomainError::Validation("schedule.pick_slot requires a slot_id".to_owned())
            })?;
            Action::PickSlot { slot_id, label: text_field(&payload, &["time_label", "label"]) }
        }
        ActionType::RequestRevision => Action::RequestRevision,
        ActionType::SendInvite => Action::SendInvite(InviteFields {
            subject: text_field(&payload, &["subject"]),
            agenda: text_field(&payload, &["agenda"]),
            location: text_field(&payload, &["location"]),
            attendees: attendees_field(&payload),
            time: text_field(&payload, &["time", "time_str"]),
        }),
    };

    let sender = envelope
        .sender
        .as_deref()
        .map(str::trim)
        .filter(|sender| !sender.is_empty())
        .map(|sender| ItemId(sender.to_owned()));

    Ok(ActionRequest { action, sender, payload })
}

/// Expands flat dotted keys (`selected.c1`) into nested maps so both form
/// encodings reach the handlers in one shape. Dotted entries merge into an
/// existing nested map of the same name.
pub fn normalize_payload(payload: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized = Map::new();
    let (dotted, plain): (Vec<_>, Vec<_>) =
        payload.iter().partition(|(key, _)| key.contains('.'));

    for (key, value) in plain {
        normalized.insert(key.clone(), value.clone());
    }
    for (key, value) in dotted {
        let segments: Vec<&str> = key.split('.').filter(|segment| !segment.is_empty()).collect();
        insert_path(&mut normalized, &segments, value.clone());
    }
    normalized
}

fn insert_path(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert((*last).to_owned(), value);
        }
        [head, rest @ ..] => {
            let entry = target.entry((*head).to_owned()).or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Selected contact ids, sorted and de-duplicated. `selected` may be a map of
/// id to flag or a list of ids.
pub fn selected_contact_ids(payload: &Map<String, Value>) -> Vec<ContactId> {
    let ids: BTreeSet<String> = match payload.get("selected") {
        Some(Value::Object(selection)) => selection
            .iter()
            .filter(|(_, flag)| is_truthy(flag))
            .map(|(id, _)| id.trim().to_owned())
            .collect(),
        Some(Value::Array(ids)) => {
            ids.iter().filter_map(Value::as_str).map(|id| id.trim().to_owned()).collect()
        }
        _ => BTreeSet::new(),
    };
    ids.into_iter().filter(|id| !id.is_empty()).map(ContactId).collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "on")
        }
        _ => false,
    }
}

fn text_field(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_owned)
}

fn attendees_field(payload: &Map<String, Value>) -> Option<String> {
    match payload.get("attendees") {
        Some(Value::Array(names)) => {
            let joined = names
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => text_field(payload, &["attendees"]),
    }
}

#[cfg(test)]
mod tests {
    use meetbook_core::{Action, ContactId, DomainError, ItemId};
    use serde_json::{json, Map, Value};

    use super::{decode, normalize_payload, ActionEnvelope};

    fn envelope(action_type: &str, payload: Value, sender: Option<&str>) -> ActionEnvelope {
        ActionEnvelope::new(
            action_type,
            payload,
            sender.map(|id| ItemId(id.to_owned())).as_ref(),
        )
    }

    fn ids(values: &[&str]) -> Vec<ContactId> {
        values.iter().map(|id| ContactId((*id).to_owned())).collect()
    }

    #[test]
    fn nested_and_flat_selection_resolve_identically() {
        let nested = envelope(
            "contacts.confirm",
            json!({ "selected": { "c1": true, "c2": false, "c3": true } }),
            Some("wdg_1"),
        );
        let flat = envelope(
            "contacts.confirm",
            json!({ "selected.c1": true, "selected.c2": false, "selected.c3": true }),
            Some("wdg_1"),
        );

        for candidate in [nested, flat] {
            let request = decode(&candidate).expect("decode");
            assert_eq!(request.action, Action::ConfirmContacts { contact_ids: ids(&["c1", "c3"]) });
            assert_eq!(request.sender, Some(ItemId("wdg_1".to_owned())));
        }
    }

    #[test]
    fn form_style_flags_and_id_lists_are_accepted() {
        let form = envelope("contacts.confirm", json!({ "selected.c2": "on", "selected.c1": "off" }), None);
        let list = envelope("contacts.confirm", json!({ "selected": ["c3", "c1", "c3"] }), None);

        assert_eq!(
            decode(&form).expect("decode form").action,
            Action::ConfirmContacts { contact_ids: ids(&["c2"]) }
        );
        assert_eq!(
            decode(&list).expect("decode list").action,
            Action::ConfirmContacts { contact_ids: ids(&["c1", "c3"]) }
        );
    }

    #[test]
    fn all_false_selection_decodes_to_empty() {
        let request = decode(&envelope(
            "contacts.confirm",
            json!({ "selected": { "c1": false } }),
            Some("wdg_1"),
        ))
        .expect("decode");
        assert_eq!(request.action, Action::ConfirmContacts { contact_ids: Vec::new() });

        let missing = decode(&envelope("contacts.confirm", json!({}), None)).expect("decode");
        assert_eq!(missing.action, Action::ConfirmContacts { contact_ids: Vec::new() });
    }

    #[test]
    fn flat_keys_merge_into_existing_nested_map() {
        let mut payload = Map::new();
        payload.insert("selected".to_owned(), json!({ "c1": true }));
        payload.insert("selected.c3".to_owned(), json!(true));

        let normalized = normalize_payload(&payload);
        assert_eq!(normalized.get("selected"), Some(&json!({ "c1": true, "c3": true })));
    }

    #[test]
    fn pick_slot_requires_slot_id() {
        let error = decode(&envelope("schedule.pick_slot", json!({ "slot_id": "  " }), Some("wdg_2")))
            .expect_err("blank slot id");
        assert!(matches!(error, DomainError::Validation(_)));

        let request = decode(&envelope(
            "schedule.pick_slot",
            json!({ "slot_id": "slot_2", "time_label": "Today, 4:30 PM" }),
            Some("wdg_2"),
        ))
        .expect("decode");
        assert_eq!(
            request.action,
            Action::PickSlot {
                slot_id: "slot_2".to_owned(),
                label: Some("Today, 4:30 PM".to_owned())
            }
        );
    }

    #[test]
    fn send_invite_treats_blank_fields_as_missing() {
        let request = decode(&envelope(
            "invite.send",
            json!({ "subject": "Sync", "location": "  ", "time_str": "Today, 4:30 PM", "attendees": ["Bob Manager", "Dana Engineer"] }),
            Some("wdg_3"),
        ))
        .expect("decode");

        let Action::SendInvite(fields) = request.action else {
            panic!("expected send invite");
        };
        assert_eq!(fields.subject.as_deref(), Some("Sync"));
        assert_eq!(fields.location, None);
        assert_eq!(fields.agenda, None);
        assert_eq!(fields.time.as_deref(), Some("Today, 4:30 PM"));
        assert_eq!(fields.attendees.as_deref(), Some("Bob Manager, Dana Engineer"));
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let error = decode(&envelope("calendar.delete_all", json!({}), None)).expect_err("unknown");
        assert_eq!(error, DomainError::UnsupportedAction("calendar.delete_all".to_owned()));
    }

    #[test]
    fn blank_sender_is_treated_as_absent() {
        let raw = json!({ "type": "invite.request_revision", "sender": "   " });
        let envelope: ActionEnvelope = serde_json::from_value(raw).expect("deserialize");
        let request = decode(&envelope).expect("decode");
        assert_eq!(request.action, Action::RequestRevision);
        assert_eq!(request.sender, None);
    }
}

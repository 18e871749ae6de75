use meetbook_chat::widgets;
use meetbook_core::{ItemContent, ThreadItem};

use crate::policy::PolicyMessage;

pub const USER_ACTION_OPEN: &str = "<USER_ACTION>";
pub const USER_ACTION_CLOSE: &str = "</USER_ACTION>";

/// Wraps a UI-originated fact so the policy can tell it apart from typed text.
pub fn user_action(text: &str) -> String {
    format!("{USER_ACTION_OPEN}{text}{USER_ACTION_CLOSE}")
}

/// Converts chronological thread items into the policy transcript.
pub fn to_policy_messages(items: &[ThreadItem]) -> Vec<PolicyMessage> {
    items
        .iter()
        .map(|item| match &item.content {
            ItemContent::UserMessage { text } => PolicyMessage::user(text.clone()),
            ItemContent::HiddenContext { text } => PolicyMessage::user(user_action(text)),
            ItemContent::AssistantMessage { text } => PolicyMessage::assistant(text.clone()),
            ItemContent::Widget { widget } => PolicyMessage::assistant(widgets::describe(widget)),
        })
        .collect()
}

pub fn confirmed_contacts_context(entries: &[(String, String)]) -> String {
    let listed = entries
        .iter()
        .map(|(id, name)| format!("{name} (id: {id})"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("User confirmed the following contacts: {listed}. Continue with find_availability.")
}

pub fn picked_slot_context(slot_id: &str, label: &str) -> String {
    format!("User selected time slot '{label}' (slot id: {slot_id}). Continue with draft_invite.")
}

#[cfg(test)]
mod tests {
    use meetbook_chat::widgets;
    use meetbook_core::{AvailabilitySlot, ThreadId, ThreadItem};

    use super::{confirmed_contacts_context, to_policy_messages, user_action};
    use crate::policy::PolicyMessage;

    #[test]
    fn hidden_context_becomes_tagged_user_turn() {
        let thread_id = ThreadId("thr_1".to_owned());
        let items = vec![
            ThreadItem::user_message(&thread_id, "book a meeting with Bob"),
            ThreadItem::assistant_message(&thread_id, "I found 1 contacts."),
            ThreadItem::hidden_context(
                &thread_id,
                confirmed_contacts_context(&[("c1".to_owned(), "Bob Manager".to_owned())]),
            ),
        ];

        let messages = to_policy_messages(&items);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], PolicyMessage::user("book a meeting with Bob"));
        assert_eq!(messages[1], PolicyMessage::assistant("I found 1 contacts."));
        let PolicyMessage::User { text } = &messages[2] else {
            panic!("hidden context should be a user turn");
        };
        assert!(text.starts_with("<USER_ACTION>"));
        assert!(text.ends_with("</USER_ACTION>"));
        assert!(text.contains("Bob Manager (id: c1)"));
    }

    #[test]
    fn widgets_become_assistant_descriptions() {
        let thread_id = ThreadId("thr_1".to_owned());
        let picker = widgets::time_picker(&[AvailabilitySlot::new(
            "slot_1",
            "Today, 2:00 PM",
            "1 hour",
            false,
        )])
        .expect("picker");
        let messages = to_policy_messages(&[ThreadItem::widget(&thread_id, picker)]);

        let PolicyMessage::Assistant { text, calls } = &messages[0] else {
            panic!("widget should be an assistant turn");
        };
        assert!(calls.is_empty());
        assert!(text.contains("time picker (pending)"));
        assert!(text.contains("slot_1 = Today, 2:00 PM"));
    }

    #[test]
    fn user_action_wraps_text() {
        assert_eq!(user_action("x"), "<USER_ACTION>x</USER_ACTION>");
    }
}

use std::sync::Arc;

use meetbook_agent::policy::{OperationCall, PolicyMessage, PolicyTurn};
use meetbook_agent::{ActionOutcome, FixedSlotProvider, Scheduler, ScriptedPolicy, TurnOutcome};
use meetbook_chat::widgets;
use meetbook_chat::{ActionEnvelope, CollectingEventSink};
use meetbook_core::audit::InMemoryAuditSink;
use meetbook_core::config::AppConfig;
use meetbook_core::{ItemContent, ItemId, ItemOrder, OwnerId, ThreadItem, WidgetKind, WidgetState};
use meetbook_db::connection::connect_with_settings;
use meetbook_db::{
    demo_contacts, migrations, ConversationStore, RecordStore, SeedDataset, SqlConversationStore,
    SqlRecordStore,
};
use serde_json::json;

struct Fixture {
    scheduler: Scheduler,
    conversations: Arc<SqlConversationStore>,
    records: Arc<SqlRecordStore>,
    policy: Arc<ScriptedPolicy>,
    audit: InMemoryAuditSink,
}

async fn fixture() -> Fixture {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    SeedDataset::load(&pool).await.expect("seed");

    let conversations = Arc::new(SqlConversationStore::new(pool.clone()));
    let records = Arc::new(SqlRecordStore::new(pool));
    let policy = Arc::new(ScriptedPolicy::default());
    let audit = InMemoryAuditSink::default();
    let scheduler = Scheduler::new(
        &AppConfig::default(),
        conversations.clone(),
        records.clone(),
        Arc::new(FixedSlotProvider),
        policy.clone(),
        Arc::new(audit.clone()),
    );
    Fixture { scheduler, conversations, records, policy, audit }
}

fn suspended_widget(outcome: &TurnOutcome, expected_operation: &str) -> ItemId {
    match outcome {
        TurnOutcome::Suspended { operation, widget_item: Some(item), .. }
            if operation == expected_operation =>
        {
            item.clone()
        }
        other => panic!("expected suspension at {expected_operation}, got {other:?}"),
    }
}

fn last_user_text(transcript: &[PolicyMessage]) -> &str {
    match transcript.last() {
        Some(PolicyMessage::User { text }) => text,
        other => panic!("expected a user turn last, got {other:?}"),
    }
}

#[tokio::test]
async fn booking_a_meeting_with_bob_end_to_end() {
    let f = fixture().await;
    let alice = OwnerId("alice".to_owned());
    let thread = f.scheduler.start_thread(alice.clone()).await.expect("thread");

    f.policy.push(Ok(PolicyTurn::call(OperationCall::new(
        "call_1",
        "search_contacts",
        json!({ "query": "Bob" }),
    ))));
    f.policy.push(Ok(PolicyTurn::call(OperationCall::new(
        "call_2",
        "find_availability",
        json!({ "attendee_ids": ["c1"] }),
    ))));
    f.policy.push(Ok(PolicyTurn::call(OperationCall::new(
        "call_3",
        "draft_invite",
        json!({
            "subject": "Sync",
            "agenda": "Weekly sync",
            "slot_time_str": "Today, 4:30 PM",
            "attendee_names": ["Bob Manager"]
        }),
    ))));

    let sink = CollectingEventSink::default();
    let outcome = f
        .scheduler
        .send_message(&thread.id, &alice, "book a meeting with Bob", "req-1", &sink)
        .await
        .expect("first turn");
    let picker_id = suspended_widget(&outcome, "search_contacts");
    assert!(sink.event_types().contains(&"widget.shown"));

    let picker = f.conversations.load_item(&thread.id, &picker_id).await.expect("load").expect("picker");
    let picker_widget = picker.as_widget().expect("widget");
    assert_eq!(picker_widget.kind, WidgetKind::ContactPicker);
    assert_eq!(picker_widget.payload["contacts"].as_array().map(Vec::len), Some(1));
    assert_eq!(picker_widget.payload["contacts"][0]["id"], json!("c1"));

    let outcome = f
        .scheduler
        .handle_action(
            &thread.id,
            &alice,
            &ActionEnvelope::new("contacts.confirm", json!({ "selected": { "c1": true } }), Some(&picker_id)),
            "req-2",
            &CollectingEventSink::default(),
        )
        .await
        .expect("confirm contacts");
    let ActionOutcome::Resumed(turn) = outcome else {
        panic!("confirm should resume the orchestrator");
    };
    let time_picker_id = suspended_widget(&turn, "find_availability");
    assert!(last_user_text(&f.policy.requests()[1]).contains("Bob Manager (id: c1)"));

    let outcome = f
        .scheduler
        .handle_action(
            &thread.id,
            &alice,
            &ActionEnvelope::new("schedule.pick_slot", json!({ "slot_id": "slot_2" }), Some(&time_picker_id)),
            "req-3",
            &CollectingEventSink::default(),
        )
        .await
        .expect("pick slot");
    let ActionOutcome::Resumed(turn) = outcome else {
        panic!("pick_slot should resume the orchestrator");
    };
    let editor_id = suspended_widget(&turn, "draft_invite");
    assert!(last_user_text(&f.policy.requests()[2]).contains("'Today, 4:30 PM' (slot id: slot_2)"));

    let sink = CollectingEventSink::default();
    let outcome = f
        .scheduler
        .handle_action(
            &thread.id,
            &alice,
            &ActionEnvelope::new(
                "invite.send",
                json!({
                    "subject": "Sync",
                    "agenda": "Weekly sync",
                    "location": "Zoom",
                    "attendees": "Bob Manager",
                    "time_str": "Today, 4:30 PM"
                }),
                Some(&editor_id),
            ),
            "req-4",
            &sink,
        )
        .await
        .expect("send invite");
    let ActionOutcome::Booked { booking, confirmation_item } = outcome else {
        panic!("send should book");
    };
    assert_eq!(confirmation_item, editor_id);
    assert_eq!(booking.subject, "Sync");
    assert_eq!(booking.start_time, "Today, 4:30 PM");
    assert_eq!(sink.event_types(), vec!["widget.replaced", "message.done"]);

    let bookings = f.records.list_bookings(&alice).await.expect("bookings");
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].subject, "Sync");

    let items = f.conversations.load_items(&thread.id, 100, ItemOrder::Asc).await.expect("items");
    let widgets = items.iter().filter_map(ThreadItem::as_widget).collect::<Vec<_>>();
    assert_eq!(widgets.len(), 3);
    assert!(widgets[..2].iter().all(|widget| widget.state == WidgetState::Locked));
    assert_eq!(widgets[2].kind, WidgetKind::MeetingConfirmed);
    assert_eq!(widgets[2].state, WidgetState::Terminal);
    assert!(widgets.iter().all(|widget| !widget.awaits_action()));

    assert_eq!(f.policy.remaining(), 0);
    assert_eq!(f.policy.requests().len(), 3);
    assert!(f.audit.event_types().contains(&"booking.confirmed".to_owned()));
}

#[tokio::test]
async fn flat_and_nested_selections_confirm_the_same_contacts() {
    let f = fixture().await;
    let alice = OwnerId("alice".to_owned());
    let payloads = [
        json!({ "selected.c1": true, "selected.c2": false, "selected.c3": true }),
        json!({ "selected": { "c1": true, "c2": false, "c3": true } }),
    ];

    let mut injected = Vec::new();
    for payload in payloads {
        let thread = f.scheduler.start_thread(alice.clone()).await.expect("thread");
        let picker = ThreadItem::widget(&thread.id, widgets::contact_picker(&demo_contacts()).expect("picker"));
        f.conversations.append(picker.clone()).await.expect("append");

        let outcome = f
            .scheduler
            .handle_action(
                &thread.id,
                &alice,
                &ActionEnvelope::new("contacts.confirm", payload, Some(&picker.id)),
                "req-sel",
                &CollectingEventSink::default(),
            )
            .await
            .expect("confirm");
        assert_eq!(outcome, ActionOutcome::Resumed(TurnOutcome::Completed { steps: 1 }));

        let items = f.conversations.load_items(&thread.id, 100, ItemOrder::Asc).await.expect("items");
        let locked = items[0].as_widget().expect("picker");
        assert_eq!(locked.payload["selected_ids"], json!(["c1", "c3"]));
        let hidden = items
            .iter()
            .find_map(|item| match &item.content {
                ItemContent::HiddenContext { text } => Some(text.clone()),
                _ => None,
            })
            .expect("hidden context");
        injected.push(hidden);
    }

    assert_eq!(injected[0], injected[1]);
    assert!(injected[0].contains("Bob Manager (id: c1)"));
    assert!(injected[0].contains("Dana Engineer (id: c3)"));
    assert!(!injected[0].contains("c2"));
}

#[tokio::test]
async fn empty_schedule_is_reported_not_failed() {
    let f = fixture().await;
    let alice = OwnerId("alice".to_owned());
    let thread = f.scheduler.start_thread(alice.clone()).await.expect("thread");
    f.policy.push(Ok(PolicyTurn::call(OperationCall::new("call_1", "check_schedule", json!({})))));
    f.policy.push(Ok(PolicyTurn::text(&["Your calendar is clear."])));

    let outcome = f
        .scheduler
        .send_message(&thread.id, &alice, "what's on my calendar?", "req-1", &CollectingEventSink::default())
        .await
        .expect("turn");
    assert_eq!(outcome, TurnOutcome::Completed { steps: 2 });

    let feedback = f.policy.requests()[1]
        .iter()
        .find_map(|message| match message {
            PolicyMessage::OperationResult { content, is_error, .. } => Some((content.clone(), *is_error)),
            _ => None,
        })
        .expect("operation result");
    assert_eq!(feedback.0, "Your calendar is currently empty. No meetings are scheduled.");
    assert!(!feedback.1);
}

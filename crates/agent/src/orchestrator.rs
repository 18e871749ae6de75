use std::sync::Arc;

use meetbook_chat::widgets::{self, Selection};
use meetbook_chat::{EventSink, ThreadStreamEvent};
use meetbook_core::config::OrchestratorConfig;
use meetbook_core::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, ItemId, ItemOrder, OwnerId,
    Thread, ThreadId, ThreadItem, WidgetEvent, WidgetLifecycle,
};
use meetbook_db::ConversationStore;
use tracing::{info, warn};

use crate::catalog::{OperationCatalog, OperationStatus};
use crate::conversation::to_policy_messages;
use crate::error::SchedulerError;
use crate::policy::{DecisionPolicy, PolicyConfig, PolicyMessage, PolicyRequest};

const ACTOR: &str = "orchestrator";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRequest {
    pub thread_id: ThreadId,
    pub owner: OwnerId,
    pub user_message: Option<String>,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The policy stopped on its own.
    Completed { steps: u32 },
    /// A forced-stop operation ran; only an action or a new message resumes.
    Suspended { operation: String, widget_item: Option<ItemId>, discarded_calls: usize },
    StepLimitReached { steps: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub history_limit: usize,
    pub max_policy_steps: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { history_limit: 20, max_policy_steps: 8 }
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            history_limit: config.history_limit as usize,
            max_policy_steps: config.max_policy_steps,
        }
    }
}

pub struct Orchestrator {
    conversations: Arc<dyn ConversationStore>,
    catalog: Arc<OperationCatalog>,
    policy: Arc<dyn DecisionPolicy>,
    policy_config: PolicyConfig,
    settings: OrchestratorSettings,
    audit: Arc<dyn AuditSink>,
    lifecycle: WidgetLifecycle,
}

impl Orchestrator {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        catalog: Arc<OperationCatalog>,
        policy: Arc<dyn DecisionPolicy>,
        settings: OrchestratorSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let policy_config = catalog.policy_config();
        Self {
            conversations,
            catalog,
            policy,
            policy_config,
            settings,
            audit,
            lifecycle: WidgetLifecycle::new(),
        }
    }

    pub fn policy_config(&self) -> &PolicyConfig {
        &self.policy_config
    }

    pub async fn run_turn(
        &self,
        request: &TurnRequest,
        sink: &dyn EventSink,
    ) -> Result<TurnOutcome, SchedulerError> {
        let thread =
            load_owned_thread(self.conversations.as_ref(), &request.thread_id, &request.owner)
                .await?;

        info!(
            event_name = "scheduler.orchestrator.turn_started",
            thread_id = %thread.id,
            correlation_id = %request.correlation_id,
            has_user_message = request.user_message.is_some(),
            "orchestrator turn started"
        );

        if let Some(text) = &request.user_message {
            let item = ThreadItem::user_message(&thread.id, text.clone());
            self.conversations.append(item.clone()).await?;
            sink.emit(ThreadStreamEvent::MessageDone { item }).await;
        }

        let mut window = self
            .conversations
            .load_items(&thread.id, self.settings.history_limit, ItemOrder::Desc)
            .await?;
        window.reverse();
        let mut transcript = to_policy_messages(&window);

        for step in 1..=self.settings.max_policy_steps {
            let turn = self
                .policy
                .decide(PolicyRequest {
                    instructions: &self.policy_config.instructions,
                    operations: &self.policy_config.operations,
                    messages: &transcript,
                })
                .await?;

            let text = turn.joined_text();
            if !text.is_empty() {
                let item = ThreadItem::assistant_message(&thread.id, text.clone());
                for fragment in turn.fragments.iter().filter(|fragment| !fragment.is_empty()) {
                    sink.emit(ThreadStreamEvent::MessageDelta {
                        thread_id: thread.id.clone(),
                        item_id: item.id.clone(),
                        delta: fragment.clone(),
                    })
                    .await;
                }
                self.conversations.append(item.clone()).await?;
                sink.emit(ThreadStreamEvent::MessageDone { item: item.clone() }).await;
                window.push(item);
            }
            transcript.push(PolicyMessage::Assistant { text, calls: turn.calls.clone() });

            if turn.is_stop() {
                info!(
                    event_name = "scheduler.orchestrator.turn_completed",
                    thread_id = %thread.id,
                    correlation_id = %request.correlation_id,
                    steps = step,
                    "policy stopped"
                );
                return Ok(TurnOutcome::Completed { steps: step });
            }

            for (index, call) in turn.calls.iter().enumerate() {
                let output = self.catalog.execute(&request.owner, call).await?;
                info!(
                    event_name = "scheduler.orchestrator.operation_executed",
                    thread_id = %thread.id,
                    correlation_id = %request.correlation_id,
                    operation = %call.name,
                    status = ?output.status,
                    "operation executed"
                );

                if let Some(message) = &output.message {
                    let item = ThreadItem::assistant_message(&thread.id, message.clone());
                    self.conversations.append(item.clone()).await?;
                    sink.emit(ThreadStreamEvent::MessageDone { item: item.clone() }).await;
                    window.push(item);
                }

                let mut widget_item = None;
                if let Some(widget) = output.widget.clone() {
                    if widget.awaits_action() {
                        self.supersede_pending(&mut window, request, sink).await?;
                    }
                    let item = ThreadItem::widget(&thread.id, widget);
                    self.conversations.append(item.clone()).await?;
                    sink.emit(ThreadStreamEvent::WidgetShown { item: item.clone() }).await;
                    widget_item = Some(item.id.clone());
                    window.push(item);
                }

                transcript.push(PolicyMessage::OperationResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: output.result.clone(),
                    is_error: output.is_error(),
                });

                if self.policy_config.is_forced_stop(&call.name)
                    && output.status != OperationStatus::Rejected
                {
                    let discarded_calls = turn.calls.len() - index - 1;
                    if discarded_calls > 0 {
                        warn!(
                            event_name = "scheduler.orchestrator.calls_discarded",
                            thread_id = %thread.id,
                            correlation_id = %request.correlation_id,
                            operation = %call.name,
                            discarded_calls,
                            "discarding invocations queued after a forced stop"
                        );
                    }
                    self.audit.emit(
                        AuditEvent::new(
                            Some(thread.id.clone()),
                            request.correlation_id.clone(),
                            "policy.suspended",
                            AuditCategory::Policy,
                            ACTOR,
                            AuditOutcome::Success,
                        )
                        .with_metadata("operation", call.name.clone())
                        .with_metadata("discarded_calls", discarded_calls.to_string()),
                    );
                    info!(
                        event_name = "scheduler.orchestrator.turn_suspended",
                        thread_id = %thread.id,
                        correlation_id = %request.correlation_id,
                        operation = %call.name,
                        steps = step,
                        "turn suspended awaiting user action"
                    );
                    return Ok(TurnOutcome::Suspended {
                        operation: call.name.clone(),
                        widget_item,
                        discarded_calls,
                    });
                }
            }
        }

        warn!(
            event_name = "scheduler.orchestrator.step_limit_reached",
            thread_id = %thread.id,
            correlation_id = %request.correlation_id,
            max_policy_steps = self.settings.max_policy_steps,
            "policy step limit reached"
        );
        Ok(TurnOutcome::StepLimitReached { steps: self.settings.max_policy_steps })
    }

    /// Locks every interactive widget in `window` still awaiting an action.
    async fn supersede_pending(
        &self,
        window: &mut [ThreadItem],
        request: &TurnRequest,
        sink: &dyn EventSink,
    ) -> Result<(), SchedulerError> {
        let audit = AuditContext::new(
            Some(request.thread_id.clone()),
            request.correlation_id.clone(),
            ACTOR,
        );

        for slot in window.iter_mut() {
            let Some(widget) = slot.as_widget().filter(|widget| widget.awaits_action()) else {
                continue;
            };
            self.lifecycle.apply_with_audit(widget, WidgetEvent::Lock, self.audit.as_ref(), &audit)?;
            let replaced = slot.with_widget(widgets::locked(widget, Selection::Nothing)?)?;
            self.conversations.replace(replaced.clone()).await?;

            self.audit.emit(
                AuditEvent::new(
                    Some(request.thread_id.clone()),
                    request.correlation_id.clone(),
                    "widget.superseded",
                    AuditCategory::Widget,
                    ACTOR,
                    AuditOutcome::Success,
                )
                .with_metadata("item_id", replaced.id.0.clone()),
            );
            sink.emit(ThreadStreamEvent::WidgetReplaced { item: replaced.clone() }).await;
            *slot = replaced;
        }
        Ok(())
    }
}

/// Loads a thread, treating threads of other owners as missing.
pub(crate) async fn load_owned_thread(
    conversations: &dyn ConversationStore,
    thread_id: &ThreadId,
    owner: &OwnerId,
) -> Result<Thread, SchedulerError> {
    conversations
        .load_thread(thread_id)
        .await?
        .filter(|thread| thread.is_owned_by(owner))
        .ok_or_else(|| SchedulerError::not_found("thread", thread_id.0.clone()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use meetbook_chat::{CollectingEventSink, ThreadStreamEvent};
    use meetbook_core::audit::InMemoryAuditSink;
    use meetbook_core::{
        DomainError, InviteDefaults, ItemContent, ItemOrder, OwnerId, Thread, ThreadId,
        WidgetKind, WidgetState,
    };
    use meetbook_db::{demo_contacts, ConversationStore, InMemoryConversationStore, InMemoryRecordStore};
    use serde_json::json;

    use super::{Orchestrator, OrchestratorSettings, TurnOutcome, TurnRequest};
    use crate::catalog::{FixedSlotProvider, OperationCatalog};
    use crate::error::SchedulerError;
    use crate::policy::{OperationCall, PolicyError, PolicyMessage, PolicyTurn};
    use crate::scripted::ScriptedPolicy;

    struct Harness {
        conversations: Arc<InMemoryConversationStore>,
        policy: Arc<ScriptedPolicy>,
        audit: InMemoryAuditSink,
        orchestrator: Orchestrator,
        thread: Thread,
    }

    async fn harness(settings: OrchestratorSettings) -> Harness {
        let conversations = Arc::new(InMemoryConversationStore::default());
        let records = Arc::new(InMemoryRecordStore::with_contacts(demo_contacts()));
        let policy = Arc::new(ScriptedPolicy::default());
        let audit = InMemoryAuditSink::default();
        let catalog = Arc::new(OperationCatalog::new(
            records,
            Arc::new(FixedSlotProvider),
            InviteDefaults::default(),
        ));
        let orchestrator = Orchestrator::new(
            conversations.clone(),
            catalog,
            policy.clone(),
            settings,
            Arc::new(audit.clone()),
        );
        let thread = Thread::new(OwnerId("alice".to_owned()));
        conversations.create_thread(thread.clone()).await.expect("create thread");
        Harness { conversations, policy, audit, orchestrator, thread }
    }

    fn request(thread: &Thread, message: Option<&str>) -> TurnRequest {
        TurnRequest {
            thread_id: thread.id.clone(),
            owner: thread.owner.clone(),
            user_message: message.map(str::to_owned),
            correlation_id: "req-test".to_owned(),
        }
    }

    fn search(query: &str) -> PolicyTurn {
        PolicyTurn::call(OperationCall::new("call_search", "search_contacts", json!({ "query": query })))
    }

    #[tokio::test]
    async fn text_answer_streams_deltas_then_done() {
        let h = harness(OrchestratorSettings::default()).await;
        h.policy.push(Ok(PolicyTurn::text(&["Hello", ", how can I help?"])));
        let sink = CollectingEventSink::default();

        let outcome = h
            .orchestrator
            .run_turn(&request(&h.thread, Some("hi")), &sink)
            .await
            .expect("turn");

        assert_eq!(outcome, TurnOutcome::Completed { steps: 1 });
        assert_eq!(
            sink.event_types(),
            vec!["message.done", "message.delta", "message.delta", "message.done"]
        );
        let items = h.conversations.load_items(&h.thread.id, 10, ItemOrder::Asc).await.expect("items");
        assert_eq!(items.len(), 2);
        assert!(matches!(
            &items[1].content,
            ItemContent::AssistantMessage { text } if text == "Hello, how can I help?"
        ));
    }

    #[tokio::test]
    async fn forced_stop_suspends_and_discards_remaining_calls() {
        let h = harness(OrchestratorSettings::default()).await;
        h.policy.push(Ok(PolicyTurn {
            fragments: Vec::new(),
            calls: vec![
                OperationCall::new("call_1", "search_contacts", json!({ "query": "Bob" })),
                OperationCall::new("call_2", "find_availability", json!({ "attendee_ids": ["c1"] })),
            ],
        }));
        let sink = CollectingEventSink::default();

        let outcome = h
            .orchestrator
            .run_turn(&request(&h.thread, Some("book a meeting with Bob")), &sink)
            .await
            .expect("turn");

        let TurnOutcome::Suspended { operation, widget_item, discarded_calls } = outcome else {
            panic!("expected suspension");
        };
        assert_eq!(operation, "search_contacts");
        assert_eq!(discarded_calls, 1);
        assert!(widget_item.is_some());
        assert_eq!(h.policy.requests().len(), 1);
        assert_eq!(sink.event_types(), vec!["message.done", "message.done", "widget.shown"]);

        let items = h.conversations.load_items(&h.thread.id, 10, ItemOrder::Asc).await.expect("items");
        let widgets = items.iter().filter_map(|item| item.as_widget()).collect::<Vec<_>>();
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0].kind, WidgetKind::ContactPicker);
        assert!(h.audit.event_types().contains(&"policy.suspended".to_owned()));
    }

    #[tokio::test]
    async fn check_schedule_feeds_result_back_to_policy() {
        let h = harness(OrchestratorSettings::default()).await;
        h.policy.push(Ok(PolicyTurn::call(OperationCall::new("call_1", "check_schedule", json!({})))));
        h.policy.push(Ok(PolicyTurn::text(&["You have no meetings yet."])));
        let sink = CollectingEventSink::default();

        let outcome = h
            .orchestrator
            .run_turn(&request(&h.thread, Some("what's on my calendar?")), &sink)
            .await
            .expect("turn");

        assert_eq!(outcome, TurnOutcome::Completed { steps: 2 });
        let second = &h.policy.requests()[1];
        assert!(matches!(
            second.last(),
            Some(PolicyMessage::OperationResult { content, is_error: false, .. })
                if content == "Your calendar is currently empty. No meetings are scheduled."
        ));
    }

    #[tokio::test]
    async fn unknown_operation_is_reported_back_not_shown() {
        let h = harness(OrchestratorSettings::default()).await;
        h.policy.push(Ok(PolicyTurn::call(OperationCall::new("call_1", "delete_calendar", json!({})))));
        h.policy.push(Ok(PolicyTurn::text(&["Sorry, I can't do that."])));
        let sink = CollectingEventSink::default();

        let outcome = h
            .orchestrator
            .run_turn(&request(&h.thread, Some("wipe it")), &sink)
            .await
            .expect("turn");

        assert_eq!(outcome, TurnOutcome::Completed { steps: 2 });
        assert!(!sink.event_types().contains(&"widget.shown"));
        assert!(matches!(
            h.policy.requests()[1].last(),
            Some(PolicyMessage::OperationResult { is_error: true, .. })
        ));
    }

    #[tokio::test]
    async fn step_limit_ends_the_turn() {
        let h = harness(OrchestratorSettings { history_limit: 20, max_policy_steps: 2 }).await;
        for _ in 0..3 {
            h.policy.push(Ok(PolicyTurn::call(OperationCall::new("call", "check_schedule", json!({})))));
        }
        let sink = CollectingEventSink::default();

        let outcome = h
            .orchestrator
            .run_turn(&request(&h.thread, Some("loop")), &sink)
            .await
            .expect("turn");

        assert_eq!(outcome, TurnOutcome::StepLimitReached { steps: 2 });
        assert_eq!(h.policy.remaining(), 1);
    }

    #[tokio::test]
    async fn new_picker_locks_the_stale_one() {
        let h = harness(OrchestratorSettings::default()).await;
        h.policy.push(Ok(search("Bob")));
        h.policy.push(Ok(search("Dana")));

        let first_sink = CollectingEventSink::default();
        let first = h
            .orchestrator
            .run_turn(&request(&h.thread, Some("meet Bob")), &first_sink)
            .await
            .expect("first turn");
        let TurnOutcome::Suspended { widget_item: Some(stale_id), .. } = first else {
            panic!("expected picker");
        };

        let second_sink = CollectingEventSink::default();
        h.orchestrator
            .run_turn(&request(&h.thread, Some("actually Dana")), &second_sink)
            .await
            .expect("second turn");

        assert!(second_sink.event_types().contains(&"widget.replaced"));
        let stale = h
            .conversations
            .load_item(&h.thread.id, &stale_id)
            .await
            .expect("load")
            .expect("stale picker still present");
        assert_eq!(stale.as_widget().map(|widget| widget.state), Some(WidgetState::Locked));

        let items = h.conversations.load_items(&h.thread.id, 20, ItemOrder::Asc).await.expect("items");
        let pending = items
            .iter()
            .filter_map(|item| item.as_widget())
            .filter(|widget| widget.awaits_action())
            .count();
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn history_window_is_chronological_and_bounded() {
        let h = harness(OrchestratorSettings { history_limit: 3, max_policy_steps: 8 }).await;
        for text in ["one", "two", "three"] {
            h.policy.push(Ok(PolicyTurn::text(&["ok"])));
            h.orchestrator
                .run_turn(&request(&h.thread, Some(text)), &CollectingEventSink::default())
                .await
                .expect("turn");
        }

        let last = h.policy.requests().pop().expect("requests");
        assert_eq!(
            last,
            vec![
                PolicyMessage::user("two"),
                PolicyMessage::assistant("ok"),
                PolicyMessage::user("three"),
            ]
        );
    }

    #[tokio::test]
    async fn foreign_or_missing_threads_are_not_found() {
        let h = harness(OrchestratorSettings::default()).await;
        let mut foreign = request(&h.thread, Some("hi"));
        foreign.owner = OwnerId("mallory".to_owned());

        let error = h
            .orchestrator
            .run_turn(&foreign, &CollectingEventSink::default())
            .await
            .expect_err("foreign thread");
        assert!(matches!(error, SchedulerError::Domain(DomainError::NotFound { .. })));

        let mut missing = request(&h.thread, None);
        missing.thread_id = ThreadId("thr_missing".to_owned());
        assert!(h.orchestrator.run_turn(&missing, &CollectingEventSink::default()).await.is_err());
    }

    #[tokio::test]
    async fn policy_failure_keeps_already_persisted_items() {
        let h = harness(OrchestratorSettings::default()).await;
        h.policy.push(Err(PolicyError::server("upstream down")));
        let sink = CollectingEventSink::default();

        let error = h
            .orchestrator
            .run_turn(&request(&h.thread, Some("hello?")), &sink)
            .await
            .expect_err("policy failure");

        assert!(matches!(error, SchedulerError::Policy(_)));
        let items = h.conversations.load_items(&h.thread.id, 10, ItemOrder::Asc).await.expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(sink.events().len(), 1);
        assert!(matches!(sink.events()[0], ThreadStreamEvent::MessageDone { .. }));
    }
}

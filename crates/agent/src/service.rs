use std::sync::Arc;

use meetbook_chat::{ActionEnvelope, EventSink};
use meetbook_core::config::{AppConfig, PolicyClientConfig};
use meetbook_core::{AuditSink, OwnerId, Thread, ThreadId};
use meetbook_db::{ConversationStore, RecordStore};
use tracing::info;

use crate::actions::{ActionContext, ActionHandler, ActionOutcome};
use crate::catalog::{OperationCatalog, SlotProvider};
use crate::error::SchedulerError;
use crate::openai::OpenAiPolicyClient;
use crate::orchestrator::{Orchestrator, OrchestratorSettings, TurnOutcome, TurnRequest};
use crate::policy::{DecisionPolicy, LoggingPolicy, PolicyError, RetryingPolicy};

/// Builds the HTTP policy client with retries and logging layered on top.
pub fn build_policy(config: &PolicyClientConfig) -> Result<Arc<dyn DecisionPolicy>, PolicyError> {
    let client: Arc<dyn DecisionPolicy> = Arc::new(OpenAiPolicyClient::from_config(config)?);
    let retrying: Arc<dyn DecisionPolicy> = Arc::new(RetryingPolicy::new(client, config.max_retries));
    Ok(Arc::new(LoggingPolicy::new(retrying)))
}

/// Entry point for a chat surface: typed messages and widget actions.
pub struct Scheduler {
    conversations: Arc<dyn ConversationStore>,
    orchestrator: Arc<Orchestrator>,
    actions: ActionHandler,
}

impl Scheduler {
    pub fn new(
        config: &AppConfig,
        conversations: Arc<dyn ConversationStore>,
        records: Arc<dyn RecordStore>,
        slots: Arc<dyn SlotProvider>,
        policy: Arc<dyn DecisionPolicy>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let defaults = config.booking.invite_defaults();
        let catalog = Arc::new(OperationCatalog::new(records.clone(), slots, defaults.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            conversations.clone(),
            catalog,
            policy,
            OrchestratorSettings::from(&config.orchestrator),
            audit.clone(),
        ));
        let actions =
            ActionHandler::new(conversations.clone(), records, orchestrator.clone(), defaults, audit);
        Self { conversations, orchestrator, actions }
    }

    pub async fn start_thread(&self, owner: OwnerId) -> Result<Thread, SchedulerError> {
        let thread = Thread::new(owner);
        self.conversations.create_thread(thread.clone()).await?;
        info!(
            event_name = "scheduler.thread.created",
            thread_id = %thread.id,
            owner = %thread.owner,
            "thread created"
        );
        Ok(thread)
    }

    pub async fn send_message(
        &self,
        thread_id: &ThreadId,
        owner: &OwnerId,
        text: &str,
        correlation_id: &str,
        sink: &dyn EventSink,
    ) -> Result<TurnOutcome, SchedulerError> {
        let request = TurnRequest {
            thread_id: thread_id.clone(),
            owner: owner.clone(),
            user_message: Some(text.to_owned()),
            correlation_id: correlation_id.to_owned(),
        };
        self.orchestrator.run_turn(&request, sink).await
    }

    pub async fn handle_action(
        &self,
        thread_id: &ThreadId,
        owner: &OwnerId,
        envelope: &ActionEnvelope,
        correlation_id: &str,
        sink: &dyn EventSink,
    ) -> Result<ActionOutcome, SchedulerError> {
        let ctx = ActionContext {
            thread_id: thread_id.clone(),
            owner: owner.clone(),
            correlation_id: correlation_id.to_owned(),
        };
        self.actions.handle(envelope, &ctx, sink).await
    }
}

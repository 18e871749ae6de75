use std::sync::Arc;

use meetbook_chat::actions::{decode, ActionEnvelope, ActionRequest};
use meetbook_chat::widgets::{self, Selection, TimePickerPayload};
use meetbook_chat::{EventSink, ThreadStreamEvent};
use meetbook_core::{
    Action, AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, BookedEvent,
    ContactId, InviteDefaults, InviteFields, ItemId, OwnerId, Thread, ThreadId, ThreadItem,
    Widget, WidgetEvent, WidgetLifecycle, WidgetTransitionError,
};
use meetbook_db::{ConversationStore, RecordStore};
use tracing::{info, warn};

use crate::booking::BookingFinalizer;
use crate::conversation::{confirmed_contacts_context, picked_slot_context};
use crate::error::SchedulerError;
use crate::orchestrator::{load_owned_thread, Orchestrator, TurnOutcome, TurnRequest};

const ACTOR: &str = "action-handler";

pub const EMPTY_SELECTION_MESSAGE: &str =
    "Please select at least one contact before confirming.";
pub const UNKNOWN_CONTACTS_MESSAGE: &str =
    "I couldn't find the selected contacts. Please pick them again from the list.";
pub const REVISION_QUESTION: &str = "What would you like to change about the invite?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionContext {
    pub thread_id: ThreadId,
    pub owner: OwnerId,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Context was injected and the orchestrator ran again.
    Resumed(TurnOutcome),
    /// Waiting for a typed follow-up from the user.
    AwaitingInput,
    Booked { booking: BookedEvent, confirmation_item: ItemId },
    /// Recovered locally; nothing was changed.
    Rejected { reason: String },
}

pub struct ActionHandler {
    conversations: Arc<dyn ConversationStore>,
    records: Arc<dyn RecordStore>,
    orchestrator: Arc<Orchestrator>,
    finalizer: BookingFinalizer,
    defaults: InviteDefaults,
    audit: Arc<dyn AuditSink>,
    lifecycle: WidgetLifecycle,
}

impl ActionHandler {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        records: Arc<dyn RecordStore>,
        orchestrator: Arc<Orchestrator>,
        defaults: InviteDefaults,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            conversations,
            finalizer: BookingFinalizer::new(records.clone()),
            records,
            orchestrator,
            defaults,
            audit,
            lifecycle: WidgetLifecycle::new(),
        }
    }

    pub async fn handle(
        &self,
        envelope: &ActionEnvelope,
        ctx: &ActionContext,
        sink: &dyn EventSink,
    ) -> Result<ActionOutcome, SchedulerError> {
        info!(
            event_name = "scheduler.action.received",
            thread_id = %ctx.thread_id,
            correlation_id = %ctx.correlation_id,
            action_type = %envelope.action_type,
            payload = %serde_json::Value::Object(envelope.payload.clone()),
            sender = ?envelope.sender,
            "action received"
        );
        self.audit(ctx, "action.received", AuditCategory::Ingress, AuditOutcome::Success, |event| {
            event.with_metadata("action_type", envelope.action_type.clone())
        });

        let request = match decode(envelope) {
            Ok(request) => request,
            Err(error) => {
                self.reject(ctx, &envelope.action_type, &error.to_string());
                return Err(error.into());
            }
        };

        let thread = load_owned_thread(self.conversations.as_ref(), &ctx.thread_id, &ctx.owner).await?;
        let sender = match self.resolve_sender(&thread, &request).await {
            Ok(sender) => sender,
            Err(error) => {
                self.reject(ctx, &envelope.action_type, &error.to_string());
                return Err(error);
            }
        };

        match request.action {
            Action::ConfirmContacts { contact_ids } => {
                self.confirm_contacts(&thread, ctx, sender, contact_ids, sink).await
            }
            Action::PickSlot { slot_id, label } => {
                self.pick_slot(&thread, ctx, sender, slot_id, label, sink).await
            }
            Action::RequestRevision => self.request_revision(&thread, ctx, sender, sink).await,
            Action::SendInvite(fields) => self.send_invite(&thread, ctx, sender, fields, sink).await,
        }
    }

    /// Loads the originating widget item and checks it may emit this action.
    async fn resolve_sender(
        &self,
        thread: &Thread,
        request: &ActionRequest,
    ) -> Result<Option<ThreadItem>, SchedulerError> {
        let Some(sender_id) = &request.sender else {
            return Ok(None);
        };
        let item = self
            .conversations
            .load_item(&thread.id, sender_id)
            .await?
            .ok_or_else(|| SchedulerError::not_found("thread item", sender_id.0.clone()))?;

        let action_type = request.action_type();
        match item.as_widget() {
            Some(widget) if action_type.accepts_sender(widget.kind) => Ok(Some(item)),
            _ => Err(WidgetTransitionError::InvalidSender {
                item_id: sender_id.0.clone(),
                action: action_type.as_str().to_owned(),
            }
            .into()),
        }
    }

    async fn confirm_contacts(
        &self,
        thread: &Thread,
        ctx: &ActionContext,
        sender: Option<ThreadItem>,
        contact_ids: Vec<ContactId>,
        sink: &dyn EventSink,
    ) -> Result<ActionOutcome, SchedulerError> {
        if contact_ids.is_empty() {
            return Ok(self.reject_locally(thread, ctx, "contacts.confirm", EMPTY_SELECTION_MESSAGE, sink).await);
        }

        let contacts = self.records.find_contacts_by_ids(&contact_ids).await?;
        let (resolved_ids, owned): (Vec<ContactId>, Vec<(String, String)>) = contacts
            .into_iter()
            .filter(|contact| contact.owner == ctx.owner)
            .map(|contact| (contact.id.clone(), (contact.id.0, contact.name)))
            .unzip();
        if owned.is_empty() {
            return Ok(self.reject_locally(thread, ctx, "contacts.confirm", UNKNOWN_CONTACTS_MESSAGE, sink).await);
        }

        if let Some(item) = sender {
            self.lock(ctx, &item, Selection::Contacts(&resolved_ids), sink).await?;
        }
        self.inject_context(thread, ctx, confirmed_contacts_context(&owned)).await?;
        self.resume(ctx, sink).await
    }

    async fn pick_slot(
        &self,
        thread: &Thread,
        ctx: &ActionContext,
        sender: Option<ThreadItem>,
        slot_id: String,
        label: Option<String>,
        sink: &dyn EventSink,
    ) -> Result<ActionOutcome, SchedulerError> {
        let label = label
            .or_else(|| {
                sender
                    .as_ref()
                    .and_then(ThreadItem::as_widget)
                    .and_then(TimePickerPayload::from_widget)
                    .and_then(|payload| payload.label_for(&slot_id).map(str::to_owned))
            })
            .unwrap_or_else(|| slot_id.clone());

        if let Some(item) = sender {
            self.lock(ctx, &item, Selection::Slot(&slot_id), sink).await?;
        }
        self.inject_context(thread, ctx, picked_slot_context(&slot_id, &label)).await?;
        self.resume(ctx, sink).await
    }

    async fn request_revision(
        &self,
        thread: &Thread,
        ctx: &ActionContext,
        sender: Option<ThreadItem>,
        sink: &dyn EventSink,
    ) -> Result<ActionOutcome, SchedulerError> {
        if let Some(item) = sender {
            self.lock(ctx, &item, Selection::Nothing, sink).await?;
        }
        let question = ThreadItem::assistant_message(&thread.id, REVISION_QUESTION);
        self.conversations.append(question.clone()).await?;
        sink.emit(ThreadStreamEvent::MessageDone { item: question }).await;
        Ok(ActionOutcome::AwaitingInput)
    }

    async fn send_invite(
        &self,
        thread: &Thread,
        ctx: &ActionContext,
        sender: Option<ThreadItem>,
        fields: InviteFields,
        sink: &dyn EventSink,
    ) -> Result<ActionOutcome, SchedulerError> {
        let draft = fields.into_draft(&self.defaults);
        let booking = self.finalizer.finalize(&ctx.owner, draft).await?;
        self.audit(ctx, "booking.confirmed", AuditCategory::Booking, AuditOutcome::Success, |event| {
            event
                .with_metadata("booking_id", booking.id.0.clone())
                .with_metadata("subject", booking.subject.clone())
        });

        let confirmation = widgets::meeting_confirmed(&booking)?;
        let confirmation_item = match sender {
            Some(item) => {
                let widget = item.as_widget().ok_or_else(|| {
                    SchedulerError::not_found("widget item", item.id.0.clone())
                })?;
                let outcome = self.lifecycle.apply_with_audit(
                    widget,
                    WidgetEvent::Finalize,
                    self.audit.as_ref(),
                    &self.audit_context(ctx),
                )?;
                let replaced = item.with_widget(Widget {
                    kind: outcome.next_kind,
                    state: outcome.to,
                    ..confirmation
                })?;
                self.conversations.replace(replaced.clone()).await?;
                sink.emit(ThreadStreamEvent::WidgetReplaced { item: replaced.clone() }).await;
                replaced.id
            }
            None => {
                let item = ThreadItem::widget(&thread.id, confirmation);
                self.conversations.append(item.clone()).await?;
                sink.emit(ThreadStreamEvent::WidgetShown { item: item.clone() }).await;
                item.id
            }
        };

        let message = ThreadItem::assistant_message(
            &thread.id,
            format!("Your meeting '{}' is booked for {}.", booking.subject, booking.start_time),
        );
        self.conversations.append(message.clone()).await?;
        sink.emit(ThreadStreamEvent::MessageDone { item: message }).await;

        info!(
            event_name = "scheduler.action.invite_sent",
            thread_id = %thread.id,
            correlation_id = %ctx.correlation_id,
            booking_id = %booking.id.0,
            "invite sent"
        );
        Ok(ActionOutcome::Booked { booking, confirmation_item })
    }

    /// Replaces the sender with its read-only form.
    async fn lock(
        &self,
        ctx: &ActionContext,
        item: &ThreadItem,
        selection: Selection<'_>,
        sink: &dyn EventSink,
    ) -> Result<(), SchedulerError> {
        let Some(widget) = item.as_widget() else {
            return Err(SchedulerError::not_found("widget item", item.id.0.clone()));
        };
        self.lifecycle.apply_with_audit(
            widget,
            WidgetEvent::Lock,
            self.audit.as_ref(),
            &self.audit_context(ctx),
        )?;
        let replaced = item.with_widget(widgets::locked(widget, selection)?)?;
        self.conversations.replace(replaced.clone()).await?;
        self.audit(ctx, "widget.locked", AuditCategory::Widget, AuditOutcome::Success, |event| {
            event
                .with_metadata("item_id", replaced.id.0.clone())
                .with_metadata("kind", widget.kind.as_str())
        });
        sink.emit(ThreadStreamEvent::WidgetReplaced { item: replaced }).await;
        Ok(())
    }

    async fn inject_context(
        &self,
        thread: &Thread,
        ctx: &ActionContext,
        text: String,
    ) -> Result<(), SchedulerError> {
        let item = ThreadItem::hidden_context(&thread.id, text);
        let item_id = item.id.0.clone();
        self.conversations.append(item).await?;
        self.audit(ctx, "context.injected", AuditCategory::Context, AuditOutcome::Success, |event| {
            event.with_metadata("item_id", item_id)
        });
        Ok(())
    }

    async fn resume(
        &self,
        ctx: &ActionContext,
        sink: &dyn EventSink,
    ) -> Result<ActionOutcome, SchedulerError> {
        let turn = TurnRequest {
            thread_id: ctx.thread_id.clone(),
            owner: ctx.owner.clone(),
            user_message: None,
            correlation_id: ctx.correlation_id.clone(),
        };
        Ok(ActionOutcome::Resumed(self.orchestrator.run_turn(&turn, sink).await?))
    }

    /// Tells the user what is wrong without touching the thread.
    async fn reject_locally(
        &self,
        thread: &Thread,
        ctx: &ActionContext,
        action_type: &str,
        message: &str,
        sink: &dyn EventSink,
    ) -> ActionOutcome {
        self.reject(ctx, action_type, message);
        let notice = ThreadItem::assistant_message(&thread.id, message);
        sink.emit(ThreadStreamEvent::MessageDone { item: notice }).await;
        ActionOutcome::Rejected { reason: message.to_owned() }
    }

    fn reject(&self, ctx: &ActionContext, action_type: &str, reason: &str) {
        warn!(
            event_name = "scheduler.action.rejected",
            thread_id = %ctx.thread_id,
            correlation_id = %ctx.correlation_id,
            action_type,
            reason,
            "action rejected"
        );
        self.audit(ctx, "action.rejected", AuditCategory::Ingress, AuditOutcome::Rejected, |event| {
            event
                .with_metadata("action_type", action_type.to_owned())
                .with_metadata("reason", reason.to_owned())
        });
    }

    fn audit_context(&self, ctx: &ActionContext) -> AuditContext {
        AuditContext::new(Some(ctx.thread_id.clone()), ctx.correlation_id.clone(), ACTOR)
    }

    fn audit<F>(
        &self,
        ctx: &ActionContext,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        decorate: F,
    ) where
        F: FnOnce(AuditEvent) -> AuditEvent,
    {
        self.audit.emit(decorate(AuditEvent::new(
            Some(ctx.thread_id.clone()),
            ctx.correlation_id.clone(),
            event_type,
            category,
            ACTOR,
            outcome,
        )));
    }
}

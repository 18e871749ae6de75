use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::widget::{Widget, WidgetKind, WidgetState};
use crate::widgets::states::{TransitionOutcome, WidgetEvent};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WidgetTransitionError {
    #[error("invalid widget transition for {kind:?} from {state:?} using event {event:?}")]
    InvalidTransition { kind: WidgetKind, state: WidgetState, event: WidgetEvent },
    #[error("item `{item_id}` cannot originate action `{action}`")]
    InvalidSender { item_id: String, action: String },
}

/// Deterministic transition table for widget items.
///
/// `pending -> locked` on any action, `pending|locked -> terminal` when an
/// invite editor is finalized. Repeated locks and repeated finalizations are
/// accepted so a client can resubmit against the same sender.
#[derive(Clone, Debug, Default)]
pub struct WidgetLifecycle;

impl WidgetLifecycle {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(
        &self,
        widget: &Widget,
        event: WidgetEvent,
    ) -> Result<TransitionOutcome, WidgetTransitionError> {
        transition_widget(widget.kind, widget.state, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        widget: &Widget,
        event: WidgetEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WidgetTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(widget, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.thread_id.clone(),
                        audit.correlation_id.clone(),
                        "widget.transition_applied",
                        AuditCategory::Widget,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("kind", outcome.kind.as_str())
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.thread_id.clone(),
                        audit.correlation_id.clone(),
                        "widget.transition_rejected",
                        AuditCategory::Widget,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn transition_widget(
    kind: WidgetKind,
    state: WidgetState,
    event: WidgetEvent,
) -> Result<TransitionOutcome, WidgetTransitionError> {
    use WidgetEvent::{Finalize, Lock};
    use WidgetKind::{ContactPicker, InviteEditor, MeetingConfirmed, TimePicker};
    use WidgetState::{Locked, Pending, Terminal};

    let (to, next_kind) = match (kind, state, event) {
        (ContactPicker | TimePicker | InviteEditor, Pending | Locked, Lock) => (Locked, kind),
        (InviteEditor, Pending | Locked, Finalize) => (Terminal, MeetingConfirmed),
        (MeetingConfirmed, Terminal, Finalize) => (Terminal, MeetingConfirmed),
        _ => return Err(WidgetTransitionError::InvalidTransition { kind, state, event }),
    };

    Ok(TransitionOutcome { kind, from: state, to, event, next_kind })
}

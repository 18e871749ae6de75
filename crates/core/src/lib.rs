pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod widgets;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::action::{Action, ActionType};
pub use domain::availability::AvailabilitySlot;
pub use domain::booking::{
    BookedEvent, BookingId, BookingStatus, DraftInvite, InviteDefaults, InviteFields, NewBooking,
};
pub use domain::contact::{Contact, ContactId};
pub use domain::thread::{ItemContent, ItemId, ItemOrder, OwnerId, Thread, ThreadId, ThreadItem};
pub use domain::widget::{Widget, WidgetKind, WidgetState};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use widgets::{TransitionOutcome, WidgetEvent, WidgetLifecycle, WidgetTransitionError};

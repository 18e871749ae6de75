use std::sync::Arc;

use chrono::Utc;
use meetbook_core::{BookedEvent, BookingId, BookingStatus, DraftInvite, NewBooking, OwnerId};
use meetbook_db::RecordStore;
use tracing::info;

use crate::error::SchedulerError;

/// Commits drafted invites as confirmed bookings.
///
/// The time is free text and is stored as both start and end. Every call
/// creates a new booking; repeated sends are not deduplicated.
pub struct BookingFinalizer {
    records: Arc<dyn RecordStore>,
}

impl BookingFinalizer {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn finalize(
        &self,
        organizer: &OwnerId,
        draft: DraftInvite,
    ) -> Result<BookedEvent, SchedulerError> {
        let booking = NewBooking {
            id: BookingId::generate(),
            organizer: organizer.clone(),
            subject: draft.subject,
            agenda: draft.agenda,
            start_time: draft.time.clone(),
            end_time: draft.time,
            attendees: draft.attendees,
            location: draft.location,
            status: BookingStatus::Confirmed,
        };
        let id = self.records.create_booking(booking.clone()).await?;

        info!(
            event_name = "scheduler.booking.created",
            booking_id = %id.0,
            organizer = %organizer,
            "booking confirmed"
        );

        Ok(BookedEvent {
            id,
            organizer: booking.organizer,
            subject: booking.subject,
            agenda: booking.agenda,
            start_time: booking.start_time,
            end_time: booking.end_time,
            attendees: booking.attendees,
            location: booking.location,
            status: booking.status,
            created_at: Utc::now(),
        })
    }
}

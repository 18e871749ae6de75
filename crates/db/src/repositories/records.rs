use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use meetbook_core::domain::booking::{BookedEvent, BookingId, BookingStatus, NewBooking};
use meetbook_core::domain::contact::{Contact, ContactId};
use meetbook_core::domain::thread::OwnerId;

use super::{decode_error, parse_timestamp, RecordStore, RepositoryError};
use crate::DbPool;

pub struct SqlRecordStore {
    pool: DbPool,
}

impl SqlRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_contact(row: &SqliteRow) -> Result<Contact, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let email: String = row.try_get("email").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    let avatar_url: Option<String> = row.try_get("avatar_url").map_err(decode_error)?;

    Ok(Contact { id: ContactId(id), owner: OwnerId(owner_id), name, email, role, avatar_url })
}

fn row_to_booking(row: &SqliteRow) -> Result<BookedEvent, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let organizer_id: String = row.try_get("organizer_id").map_err(decode_error)?;
    let subject: String = row.try_get("subject").map_err(decode_error)?;
    let agenda: String = row.try_get("agenda").map_err(decode_error)?;
    let start_time: String = row.try_get("start_time").map_err(decode_error)?;
    let end_time: String = row.try_get("end_time").map_err(decode_error)?;
    let attendees: String = row.try_get("attendees").map_err(decode_error)?;
    let location: String = row.try_get("location").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    Ok(BookedEvent {
        id: BookingId(id),
        organizer: OwnerId(organizer_id),
        subject,
        agenda,
        start_time,
        end_time,
        attendees,
        location,
        status: status.parse::<BookingStatus>().map_err(decode_error)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl RecordStore for SqlRecordStore {
    async fn create_booking(&self, booking: NewBooking) -> Result<BookingId, RepositoryError> {
        sqlx::query(
            "INSERT INTO events (id, organizer_id, subject, agenda, start_time, end_time,
                                 attendees, location, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&booking.id.0)
        .bind(&booking.organizer.0)
        .bind(&booking.subject)
        .bind(&booking.agenda)
        .bind(&booking.start_time)
        .bind(&booking.end_time)
        .bind(&booking.attendees)
        .bind(&booking.location)
        .bind(booking.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(booking.id)
    }

    async fn list_bookings(&self, owner: &OwnerId) -> Result<Vec<BookedEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, organizer_id, subject, agenda, start_time, end_time,
                    attendees, location, status, created_at
             FROM events
             WHERE organizer_id = ?
             ORDER BY rowid ASC",
        )
        .bind(&owner.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn find_contacts(
        &self,
        owner: &OwnerId,
        query: &str,
    ) -> Result<Vec<Contact>, RepositoryError> {
        // SQLite LOWER/LIKE only fold ASCII, so matching runs on the Rust side.
        let rows = sqlx::query(
            "SELECT id, owner_id, name, email, role, avatar_url
             FROM contacts
             WHERE owner_id = ?
             ORDER BY name ASC",
        )
        .bind(&owner.0)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::new();
        for row in &rows {
            let contact = row_to_contact(row)?;
            if contact.matches(query) {
                matches.push(contact);
            }
        }
        Ok(matches)
    }

    async fn find_contacts_by_ids(
        &self,
        ids: &[ContactId],
    ) -> Result<Vec<Contact>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, owner_id, name, email, role, avatar_url FROM contacts WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.0.clone());
        }
        separated.push_unseparated(") ORDER BY id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_contact).collect()
    }
}

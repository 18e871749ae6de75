use async_trait::async_trait;
use thiserror::Error;

use meetbook_core::domain::booking::{BookedEvent, BookingId, NewBooking};
use meetbook_core::domain::contact::{Contact, ContactId};
use meetbook_core::domain::thread::{ItemId, ItemOrder, OwnerId, Thread, ThreadId, ThreadItem};

pub mod conversation;
pub mod memory;
pub mod records;

pub use conversation::SqlConversationStore;
pub use memory::{InMemoryConversationStore, InMemoryRecordStore};
pub use records::SqlRecordStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
}

/// Threads and their ordered items.
///
/// Item order is the order of `append` calls. Timestamps are informational and
/// never used for ordering.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_thread(&self, thread: Thread) -> Result<(), RepositoryError>;

    async fn load_thread(&self, id: &ThreadId) -> Result<Option<Thread>, RepositoryError>;

    async fn list_threads(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<Thread>, RepositoryError>;

    async fn delete_thread(&self, id: &ThreadId) -> Result<(), RepositoryError>;

    /// Returns the `limit` most recent items, presented in `order`.
    async fn load_items(
        &self,
        thread_id: &ThreadId,
        limit: usize,
        order: ItemOrder,
    ) -> Result<Vec<ThreadItem>, RepositoryError>;

    async fn load_item(
        &self,
        thread_id: &ThreadId,
        item_id: &ItemId,
    ) -> Result<Option<ThreadItem>, RepositoryError>;

    async fn append(&self, item: ThreadItem) -> Result<(), RepositoryError>;

    /// Swaps the content of an existing item. Its id, thread, timestamp and
    /// position are kept.
    async fn replace(&self, item: ThreadItem) -> Result<(), RepositoryError>;
}

/// Address book and calendar records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_booking(&self, booking: NewBooking) -> Result<BookingId, RepositoryError>;

    async fn list_bookings(&self, owner: &OwnerId) -> Result<Vec<BookedEvent>, RepositoryError>;

    async fn find_contacts(
        &self,
        owner: &OwnerId,
        query: &str,
    ) -> Result<Vec<Contact>, RepositoryError>;

    async fn find_contacts_by_ids(
        &self,
        ids: &[ContactId],
    ) -> Result<Vec<Contact>, RepositoryError>;
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(
    value: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&chrono::Utc))
        .map_err(decode_error)
}

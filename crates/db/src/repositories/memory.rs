use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use meetbook_core::domain::booking::{BookedEvent, BookingId, NewBooking};
use meetbook_core::domain::contact::{Contact, ContactId};
use meetbook_core::domain::thread::{ItemId, ItemOrder, OwnerId, Thread, ThreadId, ThreadItem};

use super::{ConversationStore, RecordStore, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationStore {
    threads: RwLock<HashMap<String, Thread>>,
    items: RwLock<HashMap<String, Vec<ThreadItem>>>,
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_thread(&self, thread: Thread) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        threads.insert(thread.id.0.clone(), thread);
        Ok(())
    }

    async fn load_thread(&self, id: &ThreadId) -> Result<Option<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        Ok(threads.get(&id.0).cloned())
    }

    async fn list_threads(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let threads = self.threads.read().await;
        let mut owned =
            threads.values().filter(|thread| thread.is_owned_by(owner)).cloned().collect::<Vec<_>>();
        owned.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn delete_thread(&self, id: &ThreadId) -> Result<(), RepositoryError> {
        self.threads.write().await.remove(&id.0);
        self.items.write().await.remove(&id.0);
        Ok(())
    }

    async fn load_items(
        &self,
        thread_id: &ThreadId,
        limit: usize,
        order: ItemOrder,
    ) -> Result<Vec<ThreadItem>, RepositoryError> {
        let items = self.items.read().await;
        let Some(thread_items) = items.get(&thread_id.0) else {
            return Ok(Vec::new());
        };

        let mut recent = thread_items.iter().rev().take(limit).cloned().collect::<Vec<_>>();
        if order == ItemOrder::Asc {
            recent.reverse();
        }
        Ok(recent)
    }

    async fn load_item(
        &self,
        thread_id: &ThreadId,
        item_id: &ItemId,
    ) -> Result<Option<ThreadItem>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items
            .get(&thread_id.0)
            .and_then(|thread_items| thread_items.iter().find(|item| &item.id == item_id))
            .cloned())
    }

    async fn append(&self, item: ThreadItem) -> Result<(), RepositoryError> {
        if !self.threads.read().await.contains_key(&item.thread_id.0) {
            return Err(RepositoryError::NotFound { entity: "thread", id: item.thread_id.0 });
        }

        let mut items = self.items.write().await;
        items.entry(item.thread_id.0.clone()).or_default().push(item);
        Ok(())
    }

    async fn replace(&self, item: ThreadItem) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        let slot = items
            .get_mut(&item.thread_id.0)
            .and_then(|thread_items| thread_items.iter_mut().find(|existing| existing.id == item.id));

        match slot {
            Some(existing) => {
                existing.content = item.content;
                Ok(())
            }
            None => Err(RepositoryError::NotFound { entity: "thread item", id: item.id.0 }),
        }
    }
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    contacts: RwLock<Vec<Contact>>,
    bookings: RwLock<Vec<BookedEvent>>,
}

impl InMemoryRecordStore {
    pub fn with_contacts(contacts: Vec<Contact>) -> Self {
        Self { contacts: RwLock::new(contacts), bookings: RwLock::default() }
    }

    pub async fn add_contact(&self, contact: Contact) {
        let mut contacts = self.contacts.write().await;
        contacts.retain(|existing| existing.id != contact.id);
        contacts.push(contact);
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_booking(&self, booking: NewBooking) -> Result<BookingId, RepositoryError> {
        let id = booking.id.clone();
        let event = BookedEvent {
            id: booking.id,
            organizer: booking.organizer,
            subject: booking.subject,
            agenda: booking.agenda,
            start_time: booking.start_time,
            end_time: booking.end_time,
            attendees: booking.attendees,
            location: booking.location,
            status: booking.status,
            created_at: Utc::now(),
        };
        self.bookings.write().await.push(event);
        Ok(id)
    }

    async fn list_bookings(&self, owner: &OwnerId) -> Result<Vec<BookedEvent>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.iter().filter(|booking| &booking.organizer == owner).cloned().collect())
    }

    async fn find_contacts(
        &self,
        owner: &OwnerId,
        query: &str,
    ) -> Result<Vec<Contact>, RepositoryError> {
        let contacts = self.contacts.read().await;
        let mut matches = contacts
            .iter()
            .filter(|contact| &contact.owner == owner && contact.matches(query))
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(matches)
    }

    async fn find_contacts_by_ids(
        &self,
        ids: &[ContactId],
    ) -> Result<Vec<Contact>, RepositoryError> {
        let contacts = self.contacts.read().await;
        let mut found =
            contacts.iter().filter(|contact| ids.contains(&contact.id)).cloned().collect::<Vec<_>>();
        found.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(found)
    }
}

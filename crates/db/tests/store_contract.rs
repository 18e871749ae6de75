use std::sync::Arc;

use serde_json::json;

use meetbook_core::domain::booking::{BookingId, BookingStatus, NewBooking};
use meetbook_core::domain::contact::{Contact, ContactId};
use meetbook_core::domain::thread::{ItemOrder, OwnerId, Thread, ThreadItem};
use meetbook_core::domain::widget::{Widget, WidgetKind, WidgetState};
use meetbook_db::{
    connect_with_settings, demo_contacts, migrations, ConversationStore,
    InMemoryConversationStore, InMemoryRecordStore, RecordStore, SeedDataset,
    SqlConversationStore, SqlRecordStore,
};

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

fn extra_contacts() -> Vec<Contact> {
    let contact = |id: &str, owner: &str, name: &str, email: &str| Contact {
        id: ContactId(id.to_string()),
        owner: OwnerId(owner.to_string()),
        name: name.to_string(),
        email: email.to_string(),
        role: "Guest".to_string(),
        avatar_url: None,
    };
    vec![
        contact("c8", "bob", "Élodie Dupont", "elodie.dupont@example.com"),
        contact("c9", "alice", "Élodie Martin", "Elodie.Martin@Example.com"),
        contact("c10", "alice", "Ops_Team", "ops_team@example.com"),
    ]
}

async fn sql_stores() -> ContractResult<(Arc<dyn ConversationStore>, Arc<dyn RecordStore>)> {
    let pool =
        connect_with_settings("sqlite::memory:", 1, 30).await.map_err(|err| err.to_string())?;
    migrations::run_pending(&pool).await.map_err(|err| err.to_string())?;
    SeedDataset::load(&pool).await.map_err(|err| err.to_string())?;
    for contact in extra_contacts() {
        sqlx::query(
            "INSERT INTO contacts (id, owner_id, name, email, role, avatar_url)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&contact.id.0)
        .bind(&contact.owner.0)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.role)
        .bind(&contact.avatar_url)
        .execute(&pool)
        .await
        .map_err(|err| err.to_string())?;
    }
    Ok((Arc::new(SqlConversationStore::new(pool.clone())), Arc::new(SqlRecordStore::new(pool))))
}

fn memory_stores() -> (Arc<dyn ConversationStore>, Arc<dyn RecordStore>) {
    let mut contacts = demo_contacts();
    contacts.extend(extra_contacts());
    (
        Arc::new(InMemoryConversationStore::default()),
        Arc::new(InMemoryRecordStore::with_contacts(contacts)),
    )
}

async fn ordering_contract(store: &dyn ConversationStore) -> ContractResult {
    let thread = Thread::new(OwnerId("alice".to_string()));
    store.create_thread(thread.clone()).await.map_err(|err| err.to_string())?;

    let picker = ThreadItem::widget(
        &thread.id,
        Widget::pending(WidgetKind::ContactPicker, json!({ "contacts": [] })),
    );
    let mut appended = vec![
        ThreadItem::user_message(&thread.id, "book a meeting with Bob"),
        ThreadItem::assistant_message(&thread.id, "I found 1 contacts."),
        picker.clone(),
        ThreadItem::hidden_context(&thread.id, "<USER_ACTION>confirmed</USER_ACTION>"),
    ];
    // Later items get older timestamps; order must still follow appends.
    let base = chrono::Utc::now();
    for (offset, item) in appended.iter_mut().enumerate() {
        item.created_at = base - chrono::Duration::minutes(offset as i64);
    }
    for item in &appended {
        store.append(item.clone()).await.map_err(|err| err.to_string())?;
    }

    let locked = picker
        .with_widget(Widget {
            kind: WidgetKind::ContactPicker,
            state: WidgetState::Locked,
            payload: json!({ "contacts": [], "selected": ["c1"] }),
        })
        .map_err(|err| err.to_string())?;
    store.replace(locked.clone()).await.map_err(|err| err.to_string())?;

    let loaded =
        store.load_items(&thread.id, 20, ItemOrder::Asc).await.map_err(|err| err.to_string())?;
    let loaded_ids = loaded.iter().map(|item| item.id.0.clone()).collect::<Vec<_>>();
    let appended_ids = appended.iter().map(|item| item.id.0.clone()).collect::<Vec<_>>();
    require_eq!(loaded_ids, appended_ids);

    let replaced = loaded
        .iter()
        .find(|item| item.id == picker.id)
        .ok_or_else(|| "replaced picker should still be present".to_string())?;
    require!(replaced.created_at == picker.created_at, "replace must keep created_at");
    require!(
        replaced.as_widget().map(|widget| widget.state) == Some(WidgetState::Locked),
        "replace must swap the widget state"
    );

    let newest_first =
        store.load_items(&thread.id, 2, ItemOrder::Desc).await.map_err(|err| err.to_string())?;
    require_eq!(newest_first.len(), 2);
    require_eq!(newest_first[0].id, appended[3].id);
    require_eq!(newest_first[1].id, appended[2].id);
    Ok(())
}

async fn booking_contract(store: &dyn RecordStore) -> ContractResult {
    let alice = OwnerId("alice".to_string());
    let empty = store.list_bookings(&alice).await.map_err(|err| err.to_string())?;
    require!(empty.is_empty(), "fresh calendar should be empty");

    for _ in 0..2 {
        store
            .create_booking(NewBooking {
                id: BookingId::generate(),
                organizer: alice.clone(),
                subject: "Sync".to_string(),
                agenda: String::new(),
                start_time: "TBD".to_string(),
                end_time: "TBD".to_string(),
                attendees: String::new(),
                location: "Zoom".to_string(),
                status: BookingStatus::Confirmed,
            })
            .await
            .map_err(|err| err.to_string())?;
    }

    let bookings = store.list_bookings(&alice).await.map_err(|err| err.to_string())?;
    require_eq!(bookings.len(), 2);
    require!(bookings[0].id != bookings[1].id, "duplicate sends must create distinct records");
    Ok(())
}

async fn search_ids(store: &dyn RecordStore, owner: &str, query: &str) -> ContractResult<Vec<String>> {
    let found = store
        .find_contacts(&OwnerId(owner.to_string()), query)
        .await
        .map_err(|err| err.to_string())?;
    Ok(found.into_iter().map(|contact| contact.id.0).collect())
}

async fn contact_search_contract(store: &dyn RecordStore) -> ContractResult {
    require_eq!(search_ids(store, "alice", "bob").await?, vec!["c1".to_string()]);
    require_eq!(search_ids(store, "alice", "BOB").await?, vec!["c1".to_string()]);
    require_eq!(search_ids(store, "alice", "  Charlie ").await?, vec!["c2".to_string()]);

    for query in ["Élodie", "élodie", "ÉLODIE"] {
        require_eq!(search_ids(store, "alice", query).await?, vec!["c9".to_string()]);
    }
    require_eq!(search_ids(store, "bob", "élodie").await?, vec!["c8".to_string()]);

    require_eq!(search_ids(store, "alice", "martin@example").await?, vec!["c9".to_string()]);
    require_eq!(search_ids(store, "alice", "DANA@").await?, vec!["c3".to_string()]);

    require_eq!(search_ids(store, "alice", "_").await?, vec!["c10".to_string()]);
    require!(search_ids(store, "alice", "%").await?.is_empty(), "% must match literally");
    require!(search_ids(store, "alice", "o_s").await?.is_empty(), "_ must match literally");
    require!(search_ids(store, "alice", "zed").await?.is_empty(), "unknown query must be empty");

    let by_ids = store
        .find_contacts_by_ids(&[
            ContactId("c9".to_string()),
            ContactId("c1".to_string()),
            ContactId("missing".to_string()),
        ])
        .await
        .map_err(|err| err.to_string())?;
    let by_ids = by_ids.into_iter().map(|contact| contact.id.0).collect::<Vec<_>>();
    require_eq!(by_ids, vec!["c1".to_string(), "c9".to_string()]);
    Ok(())
}

#[tokio::test]
async fn sql_stores_satisfy_contract() -> ContractResult {
    let (conversations, records) = sql_stores().await?;
    ordering_contract(conversations.as_ref()).await?;
    booking_contract(records.as_ref()).await?;
    contact_search_contract(records.as_ref()).await
}

#[tokio::test]
async fn in_memory_stores_satisfy_contract() -> ContractResult {
    let (conversations, records) = memory_stores();
    ordering_contract(conversations.as_ref()).await?;
    booking_contract(records.as_ref()).await?;
    contact_search_contract(records.as_ref()).await
}

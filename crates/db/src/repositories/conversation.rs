use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use meetbook_core::domain::thread::{
    ItemContent, ItemId, ItemOrder, OwnerId, Thread, ThreadId, ThreadItem,
};

use super::{decode_error, parse_timestamp, ConversationStore, RepositoryError};
use crate::DbPool;

pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn item_type(content: &ItemContent) -> &'static str {
    match content {
        ItemContent::UserMessage { .. } => "user_message",
        ItemContent::AssistantMessage { .. } => "assistant_message",
        ItemContent::HiddenContext { .. } => "hidden_context",
        ItemContent::Widget { .. } => "widget",
    }
}

fn row_to_thread(row: &SqliteRow) -> Result<Thread, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode_error)?;
    let title: Option<String> = row.try_get("title").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    Ok(Thread {
        id: ThreadId(id),
        owner: OwnerId(owner_id),
        title,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_item(row: &SqliteRow) -> Result<ThreadItem, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let thread_id: String = row.try_get("thread_id").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let content_json: String = row.try_get("content_json").map_err(decode_error)?;

    let content: ItemContent = serde_json::from_str(&content_json).map_err(decode_error)?;

    Ok(ThreadItem {
        id: ItemId(id),
        thread_id: ThreadId(thread_id),
        created_at: parse_timestamp(&created_at)?,
        content,
    })
}

fn bind_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl ConversationStore for SqlConversationStore {
    async fn create_thread(&self, thread: Thread) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO threads (id, owner_id, title, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title",
        )
        .bind(&thread.id.0)
        .bind(&thread.owner.0)
        .bind(&thread.title)
        .bind(thread.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_thread(&self, id: &ThreadId) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query("SELECT id, owner_id, title, created_at FROM threads WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_thread).transpose()
    }

    async fn list_threads(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, owner_id, title, created_at
             FROM threads
             WHERE owner_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&owner.0)
        .bind(bind_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_thread).collect()
    }

    async fn delete_thread(&self, id: &ThreadId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM threads WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(())
    }

    async fn load_items(
        &self,
        thread_id: &ThreadId,
        limit: usize,
        order: ItemOrder,
    ) -> Result<Vec<ThreadItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, thread_id, created_at, content_json
             FROM thread_items
             WHERE thread_id = ?
             ORDER BY seq DESC
             LIMIT ?",
        )
        .bind(&thread_id.0)
        .bind(bind_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut items = rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()?;
        if order == ItemOrder::Asc {
            items.reverse();
        }
        Ok(items)
    }

    async fn load_item(
        &self,
        thread_id: &ThreadId,
        item_id: &ItemId,
    ) -> Result<Option<ThreadItem>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, thread_id, created_at, content_json
             FROM thread_items
             WHERE id = ? AND thread_id = ?",
        )
        .bind(&item_id.0)
        .bind(&thread_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_item).transpose()
    }

    async fn append(&self, item: ThreadItem) -> Result<(), RepositoryError> {
        let content_json = serde_json::to_string(&item.content).map_err(decode_error)?;

        sqlx::query(
            "INSERT INTO thread_items (id, thread_id, item_type, created_at, content_json)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&item.id.0)
        .bind(&item.thread_id.0)
        .bind(item_type(&item.content))
        .bind(item.created_at.to_rfc3339())
        .bind(content_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace(&self, item: ThreadItem) -> Result<(), RepositoryError> {
        let content_json = serde_json::to_string(&item.content).map_err(decode_error)?;

        let result = sqlx::query(
            "UPDATE thread_items
             SET item_type = ?, content_json = ?
             WHERE id = ? AND thread_id = ?",
        )
        .bind(item_type(&item.content))
        .bind(content_json)
        .bind(&item.id.0)
        .bind(&item.thread_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "thread item", id: item.id.0 });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use meetbook_core::domain::thread::{ItemOrder, OwnerId, Thread, ThreadItem};
    use meetbook_core::domain::widget::{Widget, WidgetKind, WidgetState};

    use super::SqlConversationStore;
    use crate::repositories::{ConversationStore, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlConversationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversationStore::new(pool)
    }

    async fn thread(store: &SqlConversationStore) -> Thread {
        let thread = Thread::new(OwnerId("alice".to_string()));
        store.create_thread(thread.clone()).await.expect("create thread");
        thread
    }

    #[tokio::test]
    async fn load_thread_round_trip() {
        let store = setup().await;
        let created = thread(&store).await;

        let found = store.load_thread(&created.id).await.expect("load").expect("should exist");
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn items_come_back_in_insertion_order_not_timestamp_order() {
        let store = setup().await;
        let thread = thread(&store).await;

        let mut first = ThreadItem::user_message(&thread.id, "first");
        first.created_at = Utc::now();
        let mut second = ThreadItem::assistant_message(&thread.id, "second");
        second.created_at = first.created_at - Duration::hours(2);
        let mut third = ThreadItem::hidden_context(&thread.id, "third");
        third.created_at = first.created_at - Duration::hours(1);

        for item in [first.clone(), second.clone(), third.clone()] {
            store.append(item).await.expect("append");
        }

        let ascending = store.load_items(&thread.id, 20, ItemOrder::Asc).await.expect("load asc");
        let ids = ascending.iter().map(|item| item.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![first.id.clone(), second.id.clone(), third.id.clone()]);

        let descending =
            store.load_items(&thread.id, 2, ItemOrder::Desc).await.expect("load desc");
        let ids = descending.iter().map(|item| item.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![third.id, second.id]);
    }

    #[tokio::test]
    async fn replace_keeps_identity_and_position() {
        let store = setup().await;
        let thread = thread(&store).await;

        let picker = ThreadItem::widget(
            &thread.id,
            Widget::pending(WidgetKind::ContactPicker, json!({ "contacts": [] })),
        );
        let follow_up = ThreadItem::assistant_message(&thread.id, "after picker");
        store.append(picker.clone()).await.expect("append picker");
        store.append(follow_up.clone()).await.expect("append follow up");

        let locked = picker
            .with_widget(Widget {
                kind: WidgetKind::ContactPicker,
                state: WidgetState::Locked,
                payload: json!({ "contacts": [], "locked": true }),
            })
            .expect("locked widget");
        store.replace(locked.clone()).await.expect("replace");

        let items = store.load_items(&thread.id, 20, ItemOrder::Asc).await.expect("load");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], locked);
        assert_eq!(items[0].created_at, picker.created_at);
        assert_eq!(items[1].id, follow_up.id);
    }

    #[tokio::test]
    async fn replace_of_unknown_item_is_not_found() {
        let store = setup().await;
        let thread = thread(&store).await;

        let ghost = ThreadItem::widget(&thread.id, Widget::pending(WidgetKind::TimePicker, json!({})));
        let error = store.replace(ghost).await.expect_err("missing item");
        assert!(matches!(error, RepositoryError::NotFound { entity: "thread item", .. }));
    }

    #[tokio::test]
    async fn load_item_is_scoped_to_thread() {
        let store = setup().await;
        let first = thread(&store).await;
        let second = thread(&store).await;

        let item = ThreadItem::user_message(&first.id, "hello");
        store.append(item.clone()).await.expect("append");

        assert!(store.load_item(&first.id, &item.id).await.expect("load").is_some());
        assert!(store.load_item(&second.id, &item.id).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn deleting_a_thread_removes_its_items() {
        let store = setup().await;
        let thread = thread(&store).await;
        store.append(ThreadItem::user_message(&thread.id, "hello")).await.expect("append");

        store.delete_thread(&thread.id).await.expect("delete");

        assert!(store.load_thread(&thread.id).await.expect("load").is_none());
        let items = store.load_items(&thread.id, 20, ItemOrder::Asc).await.expect("load items");
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn list_threads_filters_by_owner() {
        let store = setup().await;
        thread(&store).await;
        thread(&store).await;
        store.create_thread(Thread::new(OwnerId("bob".to_string()))).await.expect("create bob");

        let threads =
            store.list_threads(&OwnerId("alice".to_string()), 10).await.expect("list threads");
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|thread| thread.owner.0 == "alice"));
    }
}

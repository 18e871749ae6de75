use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::widget::Widget;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

/// The user a thread, its contacts and its bookings belong to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl ThreadId {
    pub fn generate() -> Self {
        Self(format!("thr_{}", Uuid::new_v4().simple()))
    }
}

impl ItemId {
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}_{}", Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub owner: OwnerId,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(owner: OwnerId) -> Self {
        Self { id: ThreadId::generate(), owner, title: None, created_at: Utc::now() }
    }

    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner == owner
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrder {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemContent {
    UserMessage { text: String },
    AssistantMessage { text: String },
    /// Relayed to the decision policy, never rendered.
    HiddenContext { text: String },
    Widget { widget: Widget },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadItem {
    pub id: ItemId,
    pub thread_id: ThreadId,
    pub created_at: DateTime<Utc>,
    pub content: ItemContent,
}

impl ThreadItem {
    fn new(thread_id: &ThreadId, prefix: &str, content: ItemContent) -> Self {
        Self {
            id: ItemId::generate(prefix),
            thread_id: thread_id.clone(),
            created_at: Utc::now(),
            content,
        }
    }

    pub fn user_message(thread_id: &ThreadId, text: impl Into<String>) -> Self {
        Self::new(thread_id, "msg", ItemContent::UserMessage { text: text.into() })
    }

    pub fn assistant_message(thread_id: &ThreadId, text: impl Into<String>) -> Self {
        Self::new(thread_id, "msg", ItemContent::AssistantMessage { text: text.into() })
    }

    pub fn hidden_context(thread_id: &ThreadId, text: impl Into<String>) -> Self {
        Self::new(thread_id, "ctx", ItemContent::HiddenContext { text: text.into() })
    }

    pub fn widget(thread_id: &ThreadId, widget: Widget) -> Self {
        Self::new(thread_id, "wdg", ItemContent::Widget { widget })
    }

    pub fn as_widget(&self) -> Option<&Widget> {
        match &self.content {
            ItemContent::Widget { widget } => Some(widget),
            _ => None,
        }
    }

    /// Swaps the widget carried by this item, keeping id, thread and timestamp.
    pub fn with_widget(&self, widget: Widget) -> Result<Self, DomainError> {
        if self.as_widget().is_none() {
            return Err(DomainError::InvariantViolation(format!(
                "item `{}` is not a widget item and cannot be replaced with one",
                self.id
            )));
        }

        Ok(Self {
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            created_at: self.created_at,
            content: ItemContent::Widget { widget },
        })
    }
}

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meetbook_core::{ItemId, ThreadId, ThreadItem};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound events for one thread, in the order they were produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadStreamEvent {
    #[serde(rename = "message.delta")]
    MessageDelta { thread_id: ThreadId, item_id: ItemId, delta: String },
    #[serde(rename = "message.done")]
    MessageDone { item: ThreadItem },
    #[serde(rename = "widget.shown")]
    WidgetShown { item: ThreadItem },
    #[serde(rename = "widget.replaced")]
    WidgetReplaced { item: ThreadItem },
}

impl ThreadStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageDelta { .. } => "message.delta",
            Self::MessageDone { .. } => "message.done",
            Self::WidgetShown { .. } => "widget.shown",
            Self::WidgetReplaced { .. } => "widget.replaced",
        }
    }

    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::MessageDelta { item_id, .. } => item_id,
            Self::MessageDone { item } | Self::WidgetShown { item } | Self::WidgetReplaced { item } => {
                &item.id
            }
        }
    }
}

/// Destination for stream events. Delivery is best effort: a client that went
/// away must not fail the turn that is already persisting its items.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: ThreadStreamEvent);
}

#[derive(Clone, Debug)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<ThreadStreamEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ThreadStreamEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: ThreadStreamEvent) {
        let event_type = event.event_type();
        if self.sender.send(event).is_err() {
            debug!(
                event_name = "chat.stream.receiver_dropped",
                event_type, "stream receiver dropped; event discarded"
            );
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CollectingEventSink {
    events: Arc<Mutex<Vec<ThreadStreamEvent>>>,
}

impl CollectingEventSink {
    pub fn events(&self) -> Vec<ThreadStreamEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(ThreadStreamEvent::event_type).collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: ThreadStreamEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

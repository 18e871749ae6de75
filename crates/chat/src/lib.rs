//! Chat surface vocabulary for meetbook
//!
//! - **Widgets** (`widgets`) - payload builders for pickers, the invite editor and confirmations
//! - **Events** (`events`) - outbound stream events and sinks
//! - **Actions** (`actions`) - inbound action envelopes and payload normalization
//!
//! # Architecture
//!
//! ```text
//! UI action → ActionEnvelope → decode → ActionRequest → Action Handler
//!                                                            ↓
//!                      client ← EventSink ← ThreadStreamEvent
//! ```

pub mod actions;
pub mod events;
pub mod widgets;

pub use actions::{decode, ActionEnvelope, ActionRequest};
pub use events::{ChannelEventSink, CollectingEventSink, EventSink, ThreadStreamEvent};
pub use widgets::{Selection, WidgetPayloadError};
